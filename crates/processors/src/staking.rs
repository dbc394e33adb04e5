//! Session and staking bundle.
//!
//! `session.NewSession` captures the validator set at the rotating block and
//! hands it to the session engine; everything else in staking and imonline
//! only feeds the search index.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use chronicle_core::error::{DomainError, DomainResult};
use chronicle_core::models::{AccountId, Block, SearchIndex, SearchIndexType};
use chronicle_core::ports::{
    Accumulation, BlockScopedTable, Item, Processor, ProcessorContext, SequenceContext,
    StateTransaction,
};
use chronicle_core::services::{apply_session, capture_session, entry_for};
use chronicle_core::value::{extract_field, parse_account};

use crate::bundle::{ProcessorBundle, Registration};
use crate::search::{CallSearch, EventSearch};
use crate::utils::{attr_u64, event_of, push_entry, require_attrs};

/// Session rotation.
pub struct NewSessionProcessor;

impl NewSessionProcessor {
    const NAME: &'static str = "session.NewSession";
}

#[async_trait]
impl Processor for NewSessionProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn accumulate(
        &self,
        ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Accumulation,
    ) -> DomainResult<()> {
        let event = event_of(Self::NAME, &item)?;
        require_attrs(Self::NAME, event, &[1])?;
        let session_id = attr_u64(Self::NAME, event, 0)?;

        let snapshot =
            capture_session(ctx, session_id, event.extrinsic_index(), event.index).await?;

        for validator in &snapshot.validators {
            out.search_index.push(entry_for(
                ctx.raw.number,
                &item,
                validator.validator_stash.clone(),
                SearchIndexType::StakingSession,
                None,
            ));
        }

        out.counters.sessions_new += 1;
        out.sessions.push(snapshot);
        Ok(())
    }

    async fn accumulation_revert(
        &self,
        block: &Block,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        tx.delete_created_at(block.number, BlockScopedTable::Sessions)
            .await?;
        Ok(())
    }

    async fn sequence(
        &self,
        ctx: &SequenceContext<'_>,
        item: Item<'_>,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        let Some(event) = item.event() else {
            return Ok(());
        };
        let Some(snapshot) = ctx
            .accumulation
            .sessions
            .iter()
            .find(|s| s.session.created_at_event == event.index)
        else {
            // Skipped during accumulation.
            debug!(block = ctx.block.number, event = event.index, "No session captured");
            return Ok(());
        };

        apply_session(tx, snapshot, ctx.block.number).await
    }
}

/// `imonline.SomeOffline([(validator, exposure)])`: one entry per validator.
pub struct SomeOfflineProcessor;

impl SomeOfflineProcessor {
    const NAME: &'static str = "imonline.SomeOffline";

    fn offline(item: &Item<'_>) -> DomainResult<Vec<AccountId>> {
        let event = event_of(Self::NAME, item)?;
        require_attrs(Self::NAME, event, &[1])?;
        event
            .attr(0)
            .and_then(|list| list.as_array())
            .and_then(|list| {
                list.iter()
                    .map(|offline| {
                        extract_field(offline, &["validatorId", "validator_id"], 0, parse_account)
                    })
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| DomainError::mismatch(Self::NAME, "malformed offline list"))
    }
}

#[async_trait]
impl Processor for SomeOfflineProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn accumulate(
        &self,
        _ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        _out: &mut Accumulation,
    ) -> DomainResult<()> {
        Self::offline(&item).map(|_| ())
    }

    fn search_index(
        &self,
        ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Vec<SearchIndex>,
    ) -> DomainResult<()> {
        for validator in Self::offline(&item)? {
            push_entry(
                out,
                ctx.raw.number,
                &item,
                validator,
                SearchIndexType::ImOnlineSomeOffline,
                None,
            );
        }
        Ok(())
    }
}

pub struct StakingBundle;

impl ProcessorBundle for StakingBundle {
    fn name(&self) -> &'static str {
        "staking"
    }

    fn processors(&self) -> Vec<Registration> {
        use SearchIndexType::*;

        // `(who, amount)` events.
        let events = [
            ("Slash", "staking.Slash", Slashed),
            ("Slashed", "staking.Slashed", Slashed),
            ("Bonded", "staking.Bonded", StakingBonded),
            ("Unbonded", "staking.Unbonded", StakingUnbonded),
            ("Withdrawn", "staking.Withdrawn", StakingWithdrawn),
        ];
        let calls: [(&str, &'static str, SearchIndexType, &'static [&'static str]); 8] = [
            ("bond", "staking.bond", StakingBond, &["value"]),
            ("bond_extra", "staking.bond_extra", StakingBondExtra, &["max_additional"]),
            ("unbond", "staking.unbond", StakingUnbond, &["value"]),
            ("withdraw_unbonded", "staking.withdraw_unbonded", StakingWithdrawUnbonded, &[]),
            ("nominate", "staking.nominate", StakingNominate, &[]),
            ("validate", "staking.validate", StakingValidate, &[]),
            ("chill", "staking.chill", StakingChill, &[]),
            ("set_payee", "staking.set_payee", StakingSetPayee, &[]),
        ];

        let mut processors = vec![Registration::event(
            "session",
            "NewSession",
            Arc::new(NewSessionProcessor),
        )];

        for (event_id, name, index_type) in events {
            let processor = EventSearch::new(name, &[2]).account_with_amount(0, index_type, 1);
            processors.push(Registration::event("staking", event_id, Arc::new(processor)));
        }

        processors.extend([
            Registration::event(
                "imonline",
                "HeartbeatReceived",
                Arc::new(
                    EventSearch::new("imonline.HeartbeatReceived", &[1])
                        .account(0, ImOnlineHeartbeatReceived),
                ),
            ),
            Registration::event("imonline", "SomeOffline", Arc::new(SomeOfflineProcessor)),
        ]);

        for (call_id, name, index_type, amount) in calls {
            let mut processor = CallSearch::new(name, index_type);
            if !amount.is_empty() {
                processor = processor.amount(amount);
            }
            processors.push(Registration::extrinsic("staking", call_id, Arc::new(processor)));
        }

        processors
    }

    fn priority(&self) -> i32 {
        // Validator flags precede the governance bundles' role updates.
        50
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::config::RetryConfig;
    use serde_json::json;

    use crate::utils::fixtures::{StaticState, account, context, event, hex_account, raw_block};

    #[tokio::test]
    async fn test_new_session_captures_validators() {
        let raw = raw_block(
            50,
            vec![],
            vec![event(2, None, "session", "NewSession", vec![json!(6)])],
            vec![],
        );
        let chain = StaticState::default()
            .with("Staking", "CurrentEra", &[], json!(1))
            .with(
                "Session",
                "Validators",
                &[],
                json!([hex_account(1), hex_account(2), hex_account(3)]),
            );
        let retry = RetryConfig::default();
        let ctx = context(&raw, &chain, &retry);
        let item = Item::Event {
            event: &raw.events[0],
            extrinsic: None,
        };

        let mut out = Accumulation::default();
        NewSessionProcessor
            .accumulate(&ctx, item, &mut out)
            .await
            .unwrap();

        assert_eq!(out.counters.sessions_new, 1);
        let snapshot = &out.sessions[0];
        assert_eq!(snapshot.session.id, 6);
        assert_eq!(snapshot.session.start_at_block, 51);
        assert_eq!(snapshot.session.created_at_event, 2);
        assert_eq!(snapshot.session.count_validators, 3);
        assert_eq!(snapshot.validators[2].validator_stash, account(3));
        assert_eq!(snapshot.validators[2].rank_validator, 2);

        assert_eq!(out.search_index.len(), 3);
        assert!(out
            .search_index
            .iter()
            .all(|e| e.index_type == SearchIndexType::StakingSession && e.event_idx == Some(2)));
    }

    #[test]
    fn test_some_offline_indexes_every_validator() {
        let raw = raw_block(
            51,
            vec![],
            vec![event(
                4,
                None,
                "imonline",
                "SomeOffline",
                vec![json!([
                    [hex_account(1), {"total": 10, "own": 10, "others": []}],
                    {"validatorId": hex_account(2), "fullIdentification": {}}
                ])],
            )],
            vec![],
        );
        let chain = StaticState::default();
        let retry = RetryConfig::default();
        let ctx = context(&raw, &chain, &retry);
        let item = Item::Event {
            event: &raw.events[0],
            extrinsic: None,
        };

        let mut out = Vec::new();
        SomeOfflineProcessor.search_index(&ctx, item, &mut out).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].account_id, account(1));
        assert_eq!(out[1].account_id, account(2));
        assert!(out
            .iter()
            .all(|e| e.index_type == SearchIndexType::ImOnlineSomeOffline && e.event_idx == Some(4)));
    }

    #[test]
    fn test_bundle_registers_every_call() {
        let registrations = StakingBundle.processors();
        // NewSession + 5 events + 2 imonline events + 8 calls.
        assert_eq!(registrations.len(), 16);
        let names: Vec<_> = registrations.iter().map(|r| r.processor.name()).collect();
        assert!(names.contains(&"staking.bond_extra"));
        assert!(names.contains(&"staking.Slashed"));
    }
}
