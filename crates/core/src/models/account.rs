use serde::{Deserialize, Serialize};

use super::{AccountId, BlockHash};

// =============================================================================
// Roles
// =============================================================================

/// Roles tracked with a current (`is_*`) and a sticky (`was_*`) flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Validator,
    Nominator,
    CouncilMember,
    TechCommMember,
    Registrar,
    Sudo,
}

impl AccountRole {
    pub const ALL: [AccountRole; 6] = [
        Self::Validator,
        Self::Nominator,
        Self::CouncilMember,
        Self::TechCommMember,
        Self::Registrar,
        Self::Sudo,
    ];

    /// `(is, was)` column names in relational storage.
    pub fn columns(&self) -> (&'static str, &'static str) {
        match self {
            Self::Validator => ("is_validator", "was_validator"),
            Self::Nominator => ("is_nominator", "was_nominator"),
            Self::CouncilMember => ("is_council_member", "was_council_member"),
            Self::TechCommMember => ("is_tech_comm_member", "was_tech_comm_member"),
            Self::Registrar => ("is_registrar", "was_registrar"),
            Self::Sudo => ("is_sudo", "was_sudo"),
        }
    }
}

/// Current and historical role flags of an account.
///
/// A `was_*` flag is sticky: it goes from false to true and never back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFlags {
    pub is_validator: bool,
    pub was_validator: bool,
    pub is_nominator: bool,
    pub was_nominator: bool,
    pub is_council_member: bool,
    pub was_council_member: bool,
    pub is_tech_comm_member: bool,
    pub was_tech_comm_member: bool,
    pub is_registrar: bool,
    pub was_registrar: bool,
    pub is_sudo: bool,
    pub was_sudo: bool,
}

impl RoleFlags {
    fn slots(&mut self, role: AccountRole) -> (&mut bool, &mut bool) {
        match role {
            AccountRole::Validator => (&mut self.is_validator, &mut self.was_validator),
            AccountRole::Nominator => (&mut self.is_nominator, &mut self.was_nominator),
            AccountRole::CouncilMember => {
                (&mut self.is_council_member, &mut self.was_council_member)
            }
            AccountRole::TechCommMember => {
                (&mut self.is_tech_comm_member, &mut self.was_tech_comm_member)
            }
            AccountRole::Registrar => (&mut self.is_registrar, &mut self.was_registrar),
            AccountRole::Sudo => (&mut self.is_sudo, &mut self.was_sudo),
        }
    }

    /// Current membership.
    pub fn is(&self, role: AccountRole) -> bool {
        match role {
            AccountRole::Validator => self.is_validator,
            AccountRole::Nominator => self.is_nominator,
            AccountRole::CouncilMember => self.is_council_member,
            AccountRole::TechCommMember => self.is_tech_comm_member,
            AccountRole::Registrar => self.is_registrar,
            AccountRole::Sudo => self.is_sudo,
        }
    }

    /// Historical membership.
    pub fn was(&self, role: AccountRole) -> bool {
        match role {
            AccountRole::Validator => self.was_validator,
            AccountRole::Nominator => self.was_nominator,
            AccountRole::CouncilMember => self.was_council_member,
            AccountRole::TechCommMember => self.was_tech_comm_member,
            AccountRole::Registrar => self.was_registrar,
            AccountRole::Sudo => self.was_sudo,
        }
    }

    /// Set current membership; membership also raises the sticky flag.
    pub fn set_current(&mut self, role: AccountRole, member: bool) {
        let (is, was) = self.slots(role);
        *is = member;
        if member {
            *was = true;
        }
    }

    /// Raise the sticky flag only.
    pub fn mark_was(&mut self, role: AccountRole) {
        *self.slots(role).1 = true;
    }
}

/// Full membership of a role read from chain state at a block.
///
/// Captured during accumulation, applied with the three-pass membership
/// update while sequencing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMembership {
    pub role: AccountRole,
    pub members: Vec<AccountId>,
}

// =============================================================================
// Identity
// =============================================================================

/// On-chain identity fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityFields {
    pub display: Option<String>,
    pub email: Option<String>,
    pub legal: Option<String>,
    pub riot: Option<String>,
    pub web: Option<String>,
    pub twitter: Option<String>,
}

/// Registrar verdict on an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Judgement {
    Unknown,
    FeePaid,
    Reasonable,
    KnownGood,
    OutOfDate,
    LowQuality,
    Erroneous,
}

impl Judgement {
    /// Parse the variant name used on chain.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Unknown" => Self::Unknown,
            "FeePaid" => Self::FeePaid,
            "Reasonable" => Self::Reasonable,
            "KnownGood" => Self::KnownGood,
            "OutOfDate" => Self::OutOfDate,
            "LowQuality" => Self::LowQuality,
            "Erroneous" => Self::Erroneous,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::FeePaid => "FeePaid",
            Self::Reasonable => "Reasonable",
            Self::KnownGood => "KnownGood",
            Self::OutOfDate => "OutOfDate",
            Self::LowQuality => "LowQuality",
            Self::Erroneous => "Erroneous",
        }
    }

    pub fn is_good(&self) -> bool {
        matches!(self, Self::Reasonable | Self::KnownGood)
    }

    pub fn is_bad(&self) -> bool {
        matches!(self, Self::LowQuality | Self::Erroneous)
    }
}

/// Latest judgement a registrar gave an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityJudgement {
    pub account_id: AccountId,
    pub registrar_index: u32,
    pub judgement: Judgement,
    pub created_at_block: u64,
    pub updated_at_block: u64,
}

/// One entry of a `set_subs` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubIdentity {
    pub account_id: AccountId,
    pub name: Option<String>,
}

// =============================================================================
// Accounts
// =============================================================================

/// Highest audit ordinal applied to an account for one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedAudit {
    pub block_number: u64,
    pub block_hash: BlockHash,
    pub ordinal: u32,
}

impl AppliedAudit {
    /// Whether the record at `(block_number, block_hash, ordinal)` was already applied.
    pub fn covers(&self, block_number: u64, block_hash: &BlockHash, ordinal: u32) -> bool {
        self.block_number == block_number && &self.block_hash == block_hash && ordinal <= self.ordinal
    }
}

/// Blocks whose audit records were applied to an account.
///
/// Reverting a block leaves derived state untouched, so a block replayed
/// with the same hash must not apply its records twice, whatever else was
/// reverted above it. A replacement block with another hash is applied.
/// Entries older than the retention window are dropped on the next write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppliedAuditLog(Vec<AppliedAudit>);

impl AppliedAuditLog {
    pub fn covers(&self, block_number: u64, block_hash: &BlockHash, ordinal: u32) -> bool {
        self.0
            .iter()
            .any(|a| a.covers(block_number, block_hash, ordinal))
    }

    /// Record an applied ordinal, keeping blocks within `retain` of `block_number`.
    pub fn record(&mut self, block_number: u64, block_hash: &BlockHash, ordinal: u32, retain: u64) {
        let oldest = block_number.saturating_sub(retain);
        self.0.retain(|a| a.block_number >= oldest);

        match self
            .0
            .iter_mut()
            .find(|a| a.block_number == block_number && &a.block_hash == block_hash)
        {
            Some(entry) => entry.ordinal = entry.ordinal.max(ordinal),
            None => self.0.push(AppliedAudit {
                block_number,
                block_hash: block_hash.clone(),
                ordinal,
            }),
        }
    }

    pub fn entries(&self) -> &[AppliedAudit] {
        &self.0
    }
}

/// Derived account state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Raw account identifier.
    pub id: AccountId,
    /// SS58 rendering in the configured address format.
    pub address: String,
    /// SS58 short address of the linked account index.
    pub index_address: Option<String>,
    pub is_reaped: bool,
    pub count_reaped: u32,
    pub roles: RoleFlags,
    pub is_treasury: bool,
    pub balance_free: Option<u128>,
    pub balance_reserved: Option<u128>,
    pub balance_total: Option<u128>,
    pub nonce: Option<u32>,
    pub identity: IdentityFields,
    pub has_identity: bool,
    pub has_subidentity: bool,
    /// Forest edge to the parent identity (one level deep).
    pub parent_identity: Option<AccountId>,
    /// Name given to this account by its parent's `set_subs`.
    pub subidentity_display: Option<String>,
    pub identity_judgement_good: u32,
    pub identity_judgement_bad: u32,
    pub created_at_block: u64,
    pub updated_at_block: u64,
    pub applied_audits: AppliedAuditLog,
}

impl Account {
    /// Fresh account first seen at `block_number`.
    pub fn new(id: AccountId, address: String, block_number: u64) -> Self {
        Self {
            id,
            address,
            index_address: None,
            is_reaped: false,
            count_reaped: 0,
            roles: RoleFlags::default(),
            is_treasury: false,
            balance_free: None,
            balance_reserved: None,
            balance_total: None,
            nonce: None,
            identity: IdentityFields::default(),
            has_identity: false,
            has_subidentity: false,
            parent_identity: None,
            subidentity_display: None,
            identity_judgement_good: 0,
            identity_judgement_bad: 0,
            created_at_block: block_number,
            updated_at_block: block_number,
            applied_audits: AppliedAuditLog::default(),
        }
    }

    /// Null identity fields and judgement counters.
    pub fn clear_identity(&mut self) {
        self.identity = IdentityFields::default();
        self.has_identity = false;
        self.identity_judgement_good = 0;
        self.identity_judgement_bad = 0;
    }

    /// Turn this account back into a standalone one.
    pub fn detach_from_parent(&mut self) {
        self.clear_identity();
        self.parent_identity = None;
        self.subidentity_display = None;
    }

    /// Copy identity fields and judgement counters from the parent.
    pub fn inherit_identity(&mut self, parent: &Account) {
        self.identity = parent.identity.clone();
        self.has_identity = true;
        self.identity_judgement_good = parent.identity_judgement_good;
        self.identity_judgement_bad = parent.identity_judgement_bad;
    }
}

/// Short numeric alias of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIndex {
    pub id: u64,
    /// Linked account; `None` once freed.
    pub account_id: Option<AccountId>,
    pub short_address: String,
    pub is_reclaimable: bool,
    pub created_at_block: u64,
    pub updated_at_block: u64,
}

/// `System.Account` read at a block hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfoSnapshot {
    pub block_number: u64,
    pub account_id: AccountId,
    pub balance_free: u128,
    pub balance_reserved: u128,
    pub nonce: u32,
}

impl AccountInfoSnapshot {
    pub fn balance_total(&self) -> u128 {
        self.balance_free.saturating_add(self.balance_reserved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test critique: la loi du flag collant
    #[test]
    fn test_sticky_flag_never_reverts() {
        let mut flags = RoleFlags::default();
        flags.set_current(AccountRole::Validator, true);
        flags.set_current(AccountRole::Validator, false);

        assert!(!flags.is(AccountRole::Validator));
        assert!(flags.was(AccountRole::Validator));
    }

    #[test]
    fn test_mark_was_leaves_current_alone() {
        let mut flags = RoleFlags::default();
        flags.mark_was(AccountRole::Sudo);
        assert!(flags.was(AccountRole::Sudo));
        assert!(!flags.is(AccountRole::Sudo));
    }

    #[test]
    fn test_judgement_classification() {
        assert!(Judgement::Reasonable.is_good());
        assert!(Judgement::KnownGood.is_good());
        assert!(Judgement::LowQuality.is_bad());
        assert!(Judgement::Erroneous.is_bad());
        assert!(!Judgement::FeePaid.is_good() && !Judgement::FeePaid.is_bad());
        assert_eq!(Judgement::from_name("KnownGood"), Some(Judgement::KnownGood));
        assert_eq!(Judgement::from_name("Great"), None);
    }

    // Test critique: un rejeu du même bloc est couvert, un fork ne l'est pas
    #[test]
    fn test_applied_audit_covers_only_same_block() {
        let applied = AppliedAudit {
            block_number: 10,
            block_hash: BlockHash([1; 32]),
            ordinal: 3,
        };
        assert!(applied.covers(10, &BlockHash([1; 32]), 3));
        assert!(applied.covers(10, &BlockHash([1; 32]), 0));
        assert!(!applied.covers(10, &BlockHash([1; 32]), 4));
        assert!(!applied.covers(10, &BlockHash([2; 32]), 0));
        assert!(!applied.covers(11, &BlockHash([1; 32]), 0));
    }

    // Test critique: un bloc plus ancien reste couvert après l'application d'un bloc suivant
    #[test]
    fn test_applied_log_remembers_earlier_blocks() {
        let mut log = AppliedAuditLog::default();
        log.record(10, &BlockHash([1; 32]), 2, 64);
        log.record(11, &BlockHash([2; 32]), 0, 64);
        log.record(11, &BlockHash([2; 32]), 4, 64);

        assert_eq!(log.entries().len(), 2);
        assert!(log.covers(10, &BlockHash([1; 32]), 2));
        assert!(log.covers(11, &BlockHash([2; 32]), 4));
        assert!(!log.covers(10, &BlockHash([1; 32]), 3));
        assert!(!log.covers(11, &BlockHash([9; 32]), 0));
    }

    #[test]
    fn test_applied_log_drops_blocks_outside_retention() {
        let mut log = AppliedAuditLog::default();
        log.record(10, &BlockHash([1; 32]), 0, 4);
        log.record(14, &BlockHash([2; 32]), 0, 4);
        assert!(log.covers(10, &BlockHash([1; 32]), 0));

        log.record(15, &BlockHash([3; 32]), 0, 4);
        assert!(!log.covers(10, &BlockHash([1; 32]), 0));
        assert_eq!(log.entries().len(), 2);
    }

    #[test]
    fn test_detach_clears_identity_and_edge() {
        let mut sub = Account::new(AccountId([2; 32]), "sub".into(), 1);
        sub.identity.display = Some("alice".into());
        sub.has_identity = true;
        sub.identity_judgement_good = 2;
        sub.parent_identity = Some(AccountId([1; 32]));

        sub.detach_from_parent();
        assert_eq!(sub.identity, IdentityFields::default());
        assert!(!sub.has_identity);
        assert_eq!(sub.identity_judgement_good, 0);
        assert!(sub.parent_identity.is_none());
    }
}
