use serde::{Deserialize, Serialize};

use super::{AccountId, IdentityFields, Judgement, SubIdentity};

/// Ledger domain of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDomain {
    Account,
    AccountIndex,
    Identity,
    IdentityJudgement,
}

impl AuditDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::AccountIndex => "account_index",
            Self::Identity => "identity",
            Self::IdentityJudgement => "identity_judgement",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountAction {
    New,
    Reaped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountIndexAction {
    New,
    Reaped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityAction {
    Set(IdentityFields),
    Cleared,
    Killed,
    SetSubs(Vec<SubIdentity>),
}

/// Immutable fact recorded during accumulation.
///
/// Records are never mutated; revert deletes a block's records wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum AuditRecord {
    Account {
        event_idx: u32,
        extrinsic_idx: Option<u32>,
        account_id: AccountId,
        action: AccountAction,
    },
    AccountIndex {
        event_idx: u32,
        extrinsic_idx: Option<u32>,
        /// Freed indices are addressed by id, reaped accounts by account.
        index_id: Option<u64>,
        account_id: Option<AccountId>,
        action: AccountIndexAction,
    },
    Identity {
        event_idx: u32,
        extrinsic_idx: Option<u32>,
        account_id: AccountId,
        action: IdentityAction,
    },
    IdentityJudgement {
        event_idx: u32,
        extrinsic_idx: Option<u32>,
        account_id: AccountId,
        registrar_index: u32,
        judgement: Judgement,
    },
}

impl AuditRecord {
    pub fn domain(&self) -> AuditDomain {
        match self {
            Self::Account { .. } => AuditDomain::Account,
            Self::AccountIndex { .. } => AuditDomain::AccountIndex,
            Self::Identity { .. } => AuditDomain::Identity,
            Self::IdentityJudgement { .. } => AuditDomain::IdentityJudgement,
        }
    }

    pub fn event_idx(&self) -> u32 {
        match self {
            Self::Account { event_idx, .. }
            | Self::AccountIndex { event_idx, .. }
            | Self::Identity { event_idx, .. }
            | Self::IdentityJudgement { event_idx, .. } => *event_idx,
        }
    }

    pub fn extrinsic_idx(&self) -> Option<u32> {
        match self {
            Self::Account { extrinsic_idx, .. }
            | Self::AccountIndex { extrinsic_idx, .. }
            | Self::Identity { extrinsic_idx, .. }
            | Self::IdentityJudgement { extrinsic_idx, .. } => *extrinsic_idx,
        }
    }
}

/// An audit record placed in the ledger of one block.
///
/// `ordinal` is the application order within the block: entries sorted by
/// `(event_idx, domain)` and numbered from zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub block_number: u64,
    pub ordinal: u32,
    pub record: AuditRecord,
}

impl AuditEntry {
    /// Number a block's records in ledger order.
    ///
    /// The sort is stable, so records sharing `(event_idx, domain)` keep
    /// their emission order.
    pub fn sequence(block_number: u64, mut records: Vec<AuditRecord>) -> Vec<AuditEntry> {
        records.sort_by_key(|r| (r.event_idx(), r.domain()));
        records
            .into_iter()
            .enumerate()
            .map(|(ordinal, record)| AuditEntry {
                block_number,
                ordinal: ordinal as u32,
                record,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(event_idx: u32, byte: u8, action: AccountAction) -> AuditRecord {
        AuditRecord::Account {
            event_idx,
            extrinsic_idx: None,
            account_id: AccountId([byte; 32]),
            action,
        }
    }

    // Test critique: ordre du ledger = (event_idx, domaine), stable sinon
    #[test]
    fn test_sequence_orders_by_event_then_domain() {
        let index_reap = AuditRecord::AccountIndex {
            event_idx: 4,
            extrinsic_idx: None,
            index_id: None,
            account_id: Some(AccountId([1; 32])),
            action: AccountIndexAction::Reaped,
        };
        let records = vec![
            index_reap.clone(),
            account(4, 1, AccountAction::Reaped),
            account(2, 2, AccountAction::New),
            account(2, 3, AccountAction::New),
        ];

        let entries = AuditEntry::sequence(7, records);
        let ordinals: Vec<u32> = entries.iter().map(|e| e.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3]);
        assert_eq!(entries[0].record, account(2, 2, AccountAction::New));
        assert_eq!(entries[1].record, account(2, 3, AccountAction::New));
        assert_eq!(entries[2].record, account(4, 1, AccountAction::Reaped));
        assert_eq!(entries[3].record, index_reap);
        assert!(entries.iter().all(|e| e.block_number == 7));
    }

    #[test]
    fn test_record_json_is_domain_tagged() {
        let json = serde_json::to_value(account(1, 9, AccountAction::New)).unwrap();
        assert_eq!(json["domain"], "account");
        assert_eq!(json["action"], "new");
    }
}
