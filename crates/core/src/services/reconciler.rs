//! State reconciler.
//!
//! Replays a block's audit ledger, in ordinal order, into accounts, account
//! indices, identities and judgements. Each transition reads only state
//! already sequenced for earlier blocks plus the effects of earlier entries
//! of the same block.

use tracing::{debug, warn};

use crate::address::Ss58Codec;
use crate::error::DomainResult;
use crate::models::{
    Account, AccountAction, AccountId, AccountIndex, AccountIndexAction, AuditEntry, AuditRecord,
    Block, IdentityAction, IdentityFields, IdentityJudgement, Judgement, SubIdentity,
};
use crate::ports::StateTransaction;

/// Applies audit entries to derived state.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    codec: Ss58Codec,
    /// Blocks kept in each account's applied log.
    retain_blocks: u64,
}

impl Reconciler {
    pub fn new(codec: Ss58Codec, retain_blocks: u64) -> Self {
        Self {
            codec,
            retain_blocks,
        }
    }

    fn already_applied(&self, account: &Account, block: &Block, ordinal: u32) -> bool {
        account
            .applied_audits
            .covers(block.number, &block.hash, ordinal)
    }

    fn mark_applied(&self, account: &mut Account, block: &Block, ordinal: u32) {
        account
            .applied_audits
            .record(block.number, &block.hash, ordinal, self.retain_blocks);
        account.updated_at_block = block.number;
    }

    async fn new_account(
        &self,
        id: &AccountId,
        block: &Block,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<Account> {
        let mut account = Account::new(id.clone(), self.codec.encode_account(id), block.number);
        if let Some(index) = tx.account_indices_of(id).await?.first() {
            account.index_address = Some(index.short_address.clone());
        }
        Ok(account)
    }

    /// Create every listed account that does not exist yet.
    pub async fn ensure_accounts(
        &self,
        block: &Block,
        accounts: &[AccountId],
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<usize> {
        let mut created = 0;
        for id in accounts {
            if tx.account(id).await?.is_none() {
                let account = self.new_account(id, block, tx).await?;
                tx.save_account(&account).await?;
                created += 1;
            }
        }
        Ok(created)
    }

    /// Apply a block's entries in order.
    pub async fn apply(
        &self,
        block: &Block,
        entries: &[AuditEntry],
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        for entry in entries {
            let ordinal = entry.ordinal;
            match &entry.record {
                AuditRecord::Account {
                    account_id, action, ..
                } => self.apply_account(block, ordinal, account_id, *action, tx).await?,
                AuditRecord::AccountIndex {
                    index_id,
                    account_id,
                    action,
                    ..
                } => {
                    self.apply_account_index(block, *index_id, account_id.as_ref(), *action, tx)
                        .await?
                }
                AuditRecord::Identity {
                    account_id, action, ..
                } => self.apply_identity(block, ordinal, account_id, action, tx).await?,
                AuditRecord::IdentityJudgement {
                    account_id,
                    registrar_index,
                    judgement,
                    ..
                } => {
                    self.apply_judgement(block, ordinal, account_id, *registrar_index, *judgement, tx)
                        .await?
                }
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Accounts
    // -------------------------------------------------------------------------

    async fn apply_account(
        &self,
        block: &Block,
        ordinal: u32,
        id: &AccountId,
        action: AccountAction,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        let mut account = match tx.account(id).await? {
            Some(account) => account,
            None => self.new_account(id, block, tx).await?,
        };
        if self.already_applied(&account, block, ordinal) {
            return Ok(());
        }

        match action {
            AccountAction::New => account.is_reaped = false,
            AccountAction::Reaped => {
                account.count_reaped += 1;
                account.is_reaped = true;
            }
        }

        self.mark_applied(&mut account, block, ordinal);
        tx.save_account(&account).await?;
        Ok(())
    }

    async fn apply_account_index(
        &self,
        block: &Block,
        index_id: Option<u64>,
        account_id: Option<&AccountId>,
        action: AccountIndexAction,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        match action {
            AccountIndexAction::New => {
                let (Some(id), Some(account_id)) = (index_id, account_id) else {
                    warn!(block = block.number, "Account index record without index or account");
                    return Ok(());
                };
                let short_address = self.codec.encode_index(id);
                let created_at_block = tx
                    .account_index(id)
                    .await?
                    .map(|existing| existing.created_at_block)
                    .unwrap_or(block.number);

                tx.save_account_index(&AccountIndex {
                    id,
                    account_id: Some(account_id.clone()),
                    short_address: short_address.clone(),
                    is_reclaimable: false,
                    created_at_block,
                    updated_at_block: block.number,
                })
                .await?;

                if let Some(mut account) = tx.account(account_id).await? {
                    account.index_address = Some(short_address);
                    account.updated_at_block = block.number;
                    tx.save_account(&account).await?;
                }
            }
            AccountIndexAction::Reaped => {
                let rows = match (index_id, account_id) {
                    (Some(id), _) => tx.account_index(id).await?.into_iter().collect(),
                    (None, Some(account_id)) => tx.account_indices_of(account_id).await?,
                    (None, None) => Vec::new(),
                };

                for mut row in rows {
                    let linked = row.account_id.take();
                    row.is_reclaimable = true;
                    row.updated_at_block = block.number;
                    tx.save_account_index(&row).await?;

                    if let Some(linked) = linked
                        && let Some(mut account) = tx.account(&linked).await?
                        && account.index_address.as_deref() == Some(row.short_address.as_str())
                    {
                        account.index_address = None;
                        account.updated_at_block = block.number;
                        tx.save_account(&account).await?;
                    }
                }
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Identities
    // -------------------------------------------------------------------------

    async fn apply_identity(
        &self,
        block: &Block,
        ordinal: u32,
        id: &AccountId,
        action: &IdentityAction,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        let Some(mut account) = tx.account(id).await? else {
            debug!(account = %id, block = block.number, "Identity change for unknown account");
            return Ok(());
        };
        if self.already_applied(&account, block, ordinal) {
            return Ok(());
        }

        match action {
            IdentityAction::Set(fields) => {
                self.set_identity(block, &mut account, fields, tx).await?
            }
            IdentityAction::Cleared | IdentityAction::Killed => {
                if account.has_subidentity {
                    for mut sub in tx.sub_identities(id).await? {
                        sub.detach_from_parent();
                        sub.updated_at_block = block.number;
                        tx.save_account(&sub).await?;
                    }
                }
                account.clear_identity();
                account.has_subidentity = false;
            }
            IdentityAction::SetSubs(subs) => self.set_subs(block, &mut account, subs, tx).await?,
        }

        self.mark_applied(&mut account, block, ordinal);
        tx.save_account(&account).await?;
        Ok(())
    }

    async fn set_identity(
        &self,
        block: &Block,
        account: &mut Account,
        fields: &IdentityFields,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        account.identity = fields.clone();
        account.has_identity = true;

        if account.has_subidentity {
            for mut sub in tx.sub_identities(&account.id).await? {
                sub.inherit_identity(account);
                sub.updated_at_block = block.number;
                tx.save_account(&sub).await?;
            }
        }
        Ok(())
    }

    /// Replace the sub list, keeping the identity graph one level deep.
    async fn set_subs(
        &self,
        block: &Block,
        account: &mut Account,
        subs: &[SubIdentity],
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        if account.parent_identity.is_some() {
            warn!(
                account = %account.id,
                block = block.number,
                "Sub-identity cannot have subs of its own, ignoring"
            );
            return Ok(());
        }

        for mut old in tx.sub_identities(&account.id).await? {
            old.detach_from_parent();
            old.updated_at_block = block.number;
            tx.save_account(&old).await?;
        }

        for sub in subs {
            if sub.account_id == account.id {
                warn!(account = %account.id, "Account listed as its own sub, skipping");
                continue;
            }
            let Some(mut sub_account) = tx.account(&sub.account_id).await? else {
                debug!(sub = %sub.account_id, "Sub-identity account not indexed yet");
                continue;
            };
            if sub_account.has_subidentity {
                warn!(
                    sub = %sub.account_id,
                    parent = %account.id,
                    "Account with subs cannot become a sub, skipping"
                );
                continue;
            }

            sub_account.parent_identity = Some(account.id.clone());
            sub_account.subidentity_display = sub.name.clone();
            sub_account.inherit_identity(account);
            sub_account.updated_at_block = block.number;
            tx.save_account(&sub_account).await?;
        }

        account.has_subidentity = !subs.is_empty();
        Ok(())
    }

    async fn apply_judgement(
        &self,
        block: &Block,
        ordinal: u32,
        id: &AccountId,
        registrar_index: u32,
        judgement: Judgement,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        let created_at_block = tx
            .identity_judgement(id, registrar_index)
            .await?
            .map(|existing| existing.created_at_block)
            .unwrap_or(block.number);

        tx.save_identity_judgement(&IdentityJudgement {
            account_id: id.clone(),
            registrar_index,
            judgement,
            created_at_block,
            updated_at_block: block.number,
        })
        .await?;

        let Some(mut account) = tx.account(id).await? else {
            return Ok(());
        };
        if self.already_applied(&account, block, ordinal) {
            return Ok(());
        }

        if judgement.is_good() {
            account.identity_judgement_good += 1;
        }
        if judgement.is_bad() {
            account.identity_judgement_bad += 1;
        }
        self.mark_applied(&mut account, block, ordinal);
        tx.save_account(&account).await?;

        if account.has_subidentity {
            for mut sub in tx.sub_identities(id).await? {
                sub.identity_judgement_good = account.identity_judgement_good;
                sub.identity_judgement_bad = account.identity_judgement_bad;
                sub.updated_at_block = block.number;
                tx.save_account(&sub).await?;
            }
        }
        Ok(())
    }
}
