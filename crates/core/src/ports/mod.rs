mod block_source;
mod chain_state;
mod processor;
mod registry;
mod repository;

pub use block_source::*;
pub use chain_state::*;
pub use processor::*;
pub use registry::*;
pub use repository::*;
