//! Processor bundles for the chronicle indexer.
//!
//! Processors are grouped into bundles by pallet family. Each bundle lists
//! its processors together with the item key they run for; the
//! [`BundleRegistry`] turns the bundles into the core
//! [`ProcessorRegistry`](chronicle_core::ports::ProcessorRegistry) the
//! pipeline dispatches with.
//!
//! # Creating a Custom Bundle
//!
//! ```ignore
//! use chronicle_processors::{ProcessorBundle, Registration};
//!
//! pub struct MyPalletBundle;
//!
//! impl ProcessorBundle for MyPalletBundle {
//!     fn name(&self) -> &'static str {
//!         "my_pallet"
//!     }
//!
//!     fn processors(&self) -> Vec<Registration> {
//!         vec![Registration::event("mypallet", "Thing", Arc::new(ThingProcessor))]
//!     }
//! }
//! ```
//!
//! # Registering Bundles
//!
//! ```ignore
//! let mut registry = default_bundles(config.balance_snapshots);
//! registry.register(Box::new(MyPalletBundle));
//!
//! let processors = registry.into_processor_registry();
//! ```

pub mod balances;
pub mod contracts;
pub mod governance;
pub mod identity;
pub mod indices;
pub mod roles;
pub mod search;
pub mod staking;
pub mod system;

mod bundle;
mod registry;
mod utils;

pub use bundle::{ProcessorBundle, Registration};
pub use registry::BundleRegistry;

pub use balances::BalancesBundle;
pub use contracts::ContractsBundle;
pub use governance::GovernanceBundle;
pub use identity::IdentityBundle;
pub use indices::IndicesBundle;
pub use staking::StakingBundle;
pub use system::SystemBundle;

/// Every bundle shipped with the indexer.
pub fn default_bundles(balance_snapshots: bool) -> BundleRegistry {
    let mut registry = BundleRegistry::new();
    registry.register(Box::new(SystemBundle::new(balance_snapshots)));
    registry.register(Box::new(BalancesBundle));
    registry.register(Box::new(IndicesBundle));
    registry.register(Box::new(IdentityBundle));
    registry.register(Box::new(StakingBundle));
    registry.register(Box::new(ContractsBundle));
    registry.register(Box::new(GovernanceBundle));
    registry
}
