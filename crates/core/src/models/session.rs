use serde::{Deserialize, Serialize};

use super::AccountId;

/// One validator-set epoch, opened by a session-rotation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: u64,
    /// First block of the session (the block after the rotation event).
    pub start_at_block: u64,
    pub era: Option<u32>,
    pub count_validators: u32,
    /// Distinct nominators across all validators.
    pub count_nominators: u32,
    pub created_at_block: u64,
    pub created_at_extrinsic: Option<u32>,
    pub created_at_event: u32,
}

/// Validator of a session; `rank_validator` is its position in the on-chain list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionValidator {
    pub session_id: u64,
    pub rank_validator: u32,
    pub validator_stash: AccountId,
    pub validator_controller: Option<AccountId>,
    pub validator_session: Option<String>,
    pub bonded_total: Option<u128>,
    pub bonded_own: Option<u128>,
    pub bonded_nominators: Option<u128>,
    pub count_nominators: u32,
    /// Commission in perbill.
    pub commission: Option<u32>,
}

/// Nominator backing one validator in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionNominator {
    pub session_id: u64,
    pub rank_validator: u32,
    pub rank_nominator: u32,
    pub nominator_stash: AccountId,
    pub nominator_controller: Option<AccountId>,
    pub bonded: Option<u128>,
}

/// Closing summary of a session, written when the next one opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTotal {
    pub id: u64,
    pub end_at_block: u64,
    pub count_blocks: u64,
}

/// Everything captured when a session opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: Session,
    pub validators: Vec<SessionValidator>,
    pub nominators: Vec<SessionNominator>,
}
