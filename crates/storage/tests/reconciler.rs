//! Reconciler transitions applied over the in-memory store.

use chronicle_core::address::Ss58Codec;
use chronicle_core::models::{
    AccountAction, AccountId, AccountIndexAction, AuditEntry, AuditRecord, Block, BlockCounters,
    BlockHash, IdentityAction, IdentityFields, Judgement, SubIdentity,
};
use chronicle_core::ports::Repositories;
use chronicle_core::services::Reconciler;
use chronicle_storage::{MemoryRepositories, MemoryState};

const FORMAT: u16 = 42;

fn block_on(number: u64, fork: u8) -> Block {
    let mut hash = [fork; 32];
    hash[..8].copy_from_slice(&number.to_be_bytes());
    Block {
        number,
        hash: BlockHash(hash),
        parent_hash: BlockHash([0; 32]),
        spec_version: 1,
        datetime: None,
        slot_number: None,
        authority_index: None,
        counters: BlockCounters::default(),
        indexed_at: chrono::Utc::now(),
    }
}

fn block(number: u64) -> Block {
    block_on(number, 0)
}

fn id(byte: u8) -> AccountId {
    AccountId([byte; 32])
}

fn account_record(event_idx: u32, byte: u8, action: AccountAction) -> AuditRecord {
    AuditRecord::Account {
        event_idx,
        extrinsic_idx: None,
        account_id: id(byte),
        action,
    }
}

fn identity_record(event_idx: u32, byte: u8, action: IdentityAction) -> AuditRecord {
    AuditRecord::Identity {
        event_idx,
        extrinsic_idx: Some(1),
        account_id: id(byte),
        action,
    }
}

fn judgement_record(event_idx: u32, byte: u8, registrar: u32, judgement: Judgement) -> AuditRecord {
    AuditRecord::IdentityJudgement {
        event_idx,
        extrinsic_idx: Some(1),
        account_id: id(byte),
        registrar_index: registrar,
        judgement,
    }
}

fn index_record(
    event_idx: u32,
    index_id: Option<u64>,
    byte: Option<u8>,
    action: AccountIndexAction,
) -> AuditRecord {
    AuditRecord::AccountIndex {
        event_idx,
        extrinsic_idx: None,
        index_id,
        account_id: byte.map(id),
        action,
    }
}

fn display(name: &str) -> IdentityAction {
    IdentityAction::Set(IdentityFields {
        display: Some(name.into()),
        ..IdentityFields::default()
    })
}

fn subs(entries: &[(u8, &str)]) -> IdentityAction {
    IdentityAction::SetSubs(
        entries
            .iter()
            .map(|(byte, name)| SubIdentity {
                account_id: id(*byte),
                name: Some((*name).into()),
            })
            .collect(),
    )
}

struct Fixture {
    repos: MemoryRepositories,
    reconciler: Reconciler,
}

impl Fixture {
    fn new() -> Self {
        Self {
            repos: MemoryRepositories::new(),
            reconciler: Reconciler::new(Ss58Codec::new(FORMAT).unwrap(), 64),
        }
    }

    async fn create(&self, number: u64, accounts: &[u8]) {
        let ids: Vec<_> = accounts.iter().map(|b| id(*b)).collect();
        let mut tx = self.repos.begin().await.unwrap();
        self.reconciler
            .ensure_accounts(&block(number), &ids, tx.as_mut())
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    async fn apply(&self, block: &Block, records: Vec<AuditRecord>) {
        let entries = AuditEntry::sequence(block.number, records);
        let mut tx = self.repos.begin().await.unwrap();
        self.reconciler
            .apply(block, &entries, tx.as_mut())
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    async fn state(&self) -> MemoryState {
        self.repos.snapshot().await
    }
}

// =============================================================================
// Accounts
// =============================================================================

#[tokio::test]
async fn test_reaped_account_counts_every_reap() {
    let f = Fixture::new();
    f.apply(
        &block(1),
        vec![
            account_record(0, 1, AccountAction::New),
            account_record(1, 1, AccountAction::Reaped),
        ],
    )
    .await;
    f.apply(&block(2), vec![account_record(0, 1, AccountAction::Reaped)]).await;

    let state = f.state().await;
    let account = &state.accounts[&id(1)];
    assert_eq!(account.count_reaped, 2);
    assert!(account.is_reaped);
    assert_eq!(account.created_at_block, 1);

    f.apply(&block(3), vec![account_record(0, 1, AccountAction::New)]).await;
    let account = &f.state().await.accounts[&id(1)];
    assert!(!account.is_reaped);
    assert_eq!(account.count_reaped, 2);
}

// Test critique: rejouer le même bloc ne recompte rien, un bloc de fork si
#[tokio::test]
async fn test_replayed_block_is_applied_once() {
    let f = Fixture::new();
    let records = || vec![account_record(0, 1, AccountAction::Reaped)];

    f.apply(&block(1), records()).await;
    f.apply(&block(2), vec![account_record(0, 1, AccountAction::New)]).await;
    f.apply(&block(1), records()).await;
    f.apply(&block(2), vec![account_record(0, 1, AccountAction::New)]).await;
    assert_eq!(f.state().await.accounts[&id(1)].count_reaped, 1);

    f.apply(&block_on(2, 9), records()).await;
    assert_eq!(f.state().await.accounts[&id(1)].count_reaped, 2);
}

// =============================================================================
// Account indices
// =============================================================================

#[tokio::test]
async fn test_new_index_mirrors_short_address() {
    let f = Fixture::new();
    f.create(1, &[1]).await;
    f.apply(
        &block(2),
        vec![index_record(0, Some(5), Some(1), AccountIndexAction::New)],
    )
    .await;

    let short = Ss58Codec::new(FORMAT).unwrap().encode_index(5);
    let state = f.state().await;
    let index = &state.account_indices[&5];
    assert_eq!(index.account_id, Some(id(1)));
    assert_eq!(index.short_address, short);
    assert!(!index.is_reclaimable);
    assert_eq!(index.created_at_block, 2);
    assert_eq!(state.accounts[&id(1)].index_address.as_deref(), Some(short.as_str()));
}

// Test critique: un index libéré est délié et réclamable
#[tokio::test]
async fn test_reaped_index_is_unlinked_and_reclaimable() {
    let f = Fixture::new();
    f.create(1, &[1, 2]).await;
    f.apply(
        &block(2),
        vec![
            index_record(0, Some(5), Some(1), AccountIndexAction::New),
            index_record(1, Some(6), Some(2), AccountIndexAction::New),
        ],
    )
    .await;

    // One freed by id, the other through its reaped account.
    f.apply(
        &block(3),
        vec![
            index_record(0, Some(5), None, AccountIndexAction::Reaped),
            index_record(1, None, Some(2), AccountIndexAction::Reaped),
        ],
    )
    .await;

    let state = f.state().await;
    for (index_id, byte) in [(5, 1), (6, 2)] {
        let index = &state.account_indices[&index_id];
        assert_eq!(index.account_id, None);
        assert!(index.is_reclaimable);
        assert_eq!(index.created_at_block, 2);
        assert_eq!(index.updated_at_block, 3);
        assert_eq!(state.accounts[&id(byte)].index_address, None);
    }
}

// =============================================================================
// Identities
// =============================================================================

/// Account 1 with identity "alice" and subs 2 and 3, judged good once.
async fn parent_with_subs(f: &Fixture) {
    f.create(1, &[1, 2, 3]).await;
    f.apply(
        &block(2),
        vec![
            identity_record(0, 1, display("alice")),
            identity_record(1, 1, subs(&[(2, "ledger"), (3, "hot")])),
            judgement_record(2, 1, 0, Judgement::KnownGood),
        ],
    )
    .await;
}

// Test critique: effacer ou tuer une identité nettoie le parent et tous ses subs
#[tokio::test]
async fn test_cleared_and_killed_identity_reset_parent_and_subs() {
    for action in [IdentityAction::Cleared, IdentityAction::Killed] {
        let f = Fixture::new();
        parent_with_subs(&f).await;
        assert_eq!(f.state().await.accounts[&id(2)].identity_judgement_good, 1);

        f.apply(&block(3), vec![identity_record(0, 1, action.clone())]).await;

        let state = f.state().await;
        let parent = &state.accounts[&id(1)];
        assert_eq!(parent.identity, IdentityFields::default(), "{action:?}");
        assert!(!parent.has_identity);
        assert!(!parent.has_subidentity);
        assert_eq!(parent.identity_judgement_good, 0);
        assert_eq!(parent.identity_judgement_bad, 0);

        for byte in [2, 3] {
            let sub = &state.accounts[&id(byte)];
            assert_eq!(sub.parent_identity, None, "{action:?}");
            assert_eq!(sub.subidentity_display, None);
            assert_eq!(sub.identity, IdentityFields::default());
            assert!(!sub.has_identity);
            assert_eq!(sub.identity_judgement_good, 0);
        }
    }
}

#[tokio::test]
async fn test_judgements_update_counters_and_reach_subs() {
    let f = Fixture::new();
    parent_with_subs(&f).await;
    f.apply(
        &block(3),
        vec![
            judgement_record(0, 1, 1, Judgement::Erroneous),
            judgement_record(1, 1, 2, Judgement::FeePaid),
        ],
    )
    .await;

    let state = f.state().await;
    let parent = &state.accounts[&id(1)];
    assert_eq!(parent.identity_judgement_good, 1);
    assert_eq!(parent.identity_judgement_bad, 1);
    for byte in [2, 3] {
        let sub = &state.accounts[&id(byte)];
        assert_eq!(sub.identity_judgement_good, 1);
        assert_eq!(sub.identity_judgement_bad, 1);
        assert_eq!(sub.identity.display.as_deref(), Some("alice"));
    }

    assert_eq!(state.identity_judgements.len(), 3);
    let latest = &state.identity_judgements[&(id(1), 1)];
    assert_eq!(latest.judgement, Judgement::Erroneous);
    assert_eq!(latest.created_at_block, 3);
}

// Test critique: la forêt d'identités reste à un seul niveau
#[tokio::test]
async fn test_identity_forest_stays_one_level_deep() {
    let f = Fixture::new();
    parent_with_subs(&f).await;
    f.create(3, &[4, 5, 6]).await;

    // A sub cannot take subs of its own.
    f.apply(&block(4), vec![identity_record(0, 2, subs(&[(4, "deep")]))]).await;
    // An account with subs cannot become a sub.
    f.apply(&block(5), vec![identity_record(0, 5, subs(&[(6, "child")]))]).await;
    f.apply(&block(6), vec![identity_record(0, 1, subs(&[(2, "ledger"), (5, "nested")]))])
        .await;

    let state = f.state().await;
    assert_eq!(state.accounts[&id(4)].parent_identity, None);
    assert!(!state.accounts[&id(2)].has_subidentity);
    assert_eq!(state.accounts[&id(2)].parent_identity, Some(id(1)));

    assert_eq!(state.accounts[&id(5)].parent_identity, None);
    assert!(state.accounts[&id(5)].has_subidentity);
    assert_eq!(state.accounts[&id(6)].parent_identity, Some(id(5)));

    // Account 3 was dropped from the new list.
    assert_eq!(state.accounts[&id(3)].parent_identity, None);
    assert!(!state.accounts[&id(3)].has_identity);
}
