use serde::{Deserialize, Serialize};

use super::{AccountId, CodeHash};

/// Stored contract code.
///
/// The first block that stores a given code hash owns the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub code_hash: CodeHash,
    /// Hex-encoded wasm from the `put_code` call, when available.
    pub bytecode: Option<String>,
    pub created_at_block: u64,
    pub created_at_extrinsic: Option<u32>,
    pub created_at_event: u32,
}

/// Instantiated contract account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInstance {
    pub address: AccountId,
    pub owner: AccountId,
    pub code_hash: Option<CodeHash>,
    pub created_at_block: u64,
    pub created_at_extrinsic: Option<u32>,
    pub created_at_event: u32,
}
