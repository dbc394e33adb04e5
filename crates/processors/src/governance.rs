//! Governance bundle: council, technical committee, elections, democracy,
//! treasury, claims and sudo.
//!
//! Three families of items change account roles: `NewTerm` for council
//! members, technical membership events for the technical committee and
//! `sudo.set_key` for the sudo key. The rest only feed the search index.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use chronicle_core::error::{DomainError, DomainResult};
use chronicle_core::models::{AccountId, AccountRole, SearchIndex, SearchIndexType};
use chronicle_core::ports::{
    Accumulation, Item, Processor, ProcessorContext, SequenceContext, StateTransaction,
};
use chronicle_core::value::{extract_field, parse_account, parse_amount};

use crate::bundle::{ProcessorBundle, Registration};
use crate::roles::RoleSetProcessor;
use crate::search::{CallAccount, CallSearch, EventSearch};
use crate::utils::{
    emitting_call, event_of, extrinsic_of, param_account, push_entry, require_attrs, signer_of,
};

/// Pallet names the Phragmén elections module has been deployed under.
const ELECTION_MODULES: [&str; 2] = ["electionsphragmen", "phragmenelection"];

/// `technicalmembership` events after which the committee is re-read.
const TECH_MEMBERSHIP_EVENTS: [(&str, &str); 5] = [
    ("MemberAdded", "technicalmembership.MemberAdded"),
    ("MemberRemoved", "technicalmembership.MemberRemoved"),
    ("MembersSwapped", "technicalmembership.MembersSwapped"),
    ("MembersReset", "technicalmembership.MembersReset"),
    ("KeyChanged", "technicalmembership.KeyChanged"),
];

// =============================================================================
// Council term
// =============================================================================

/// `NewTerm([(member, stake)])`: the elected council replaces the previous one.
pub struct NewTermProcessor;

impl NewTermProcessor {
    const NAME: &'static str = "electionsphragmen.NewTerm";

    fn members(item: &Item<'_>) -> DomainResult<Vec<(AccountId, Option<u128>)>> {
        let event = event_of(Self::NAME, item)?;
        require_attrs(Self::NAME, event, &[1])?;
        event
            .attr(0)
            .and_then(Value::as_array)
            .and_then(|list| {
                list.iter()
                    .map(|member| {
                        let account = extract_field(member, &["account"], 0, parse_account)?;
                        Some((account, extract_field(member, &["balance"], 1, parse_amount)))
                    })
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| DomainError::mismatch(Self::NAME, "malformed member list"))
    }
}

#[async_trait]
impl Processor for NewTermProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn accumulate(
        &self,
        _ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        _out: &mut Accumulation,
    ) -> DomainResult<()> {
        Self::members(&item).map(|_| ())
    }

    fn search_index(
        &self,
        ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Vec<SearchIndex>,
    ) -> DomainResult<()> {
        for (account, stake) in Self::members(&item)? {
            push_entry(
                out,
                ctx.raw.number,
                &item,
                account,
                SearchIndexType::CouncilMemberElected,
                stake,
            );
        }
        Ok(())
    }

    async fn sequence(
        &self,
        ctx: &SequenceContext<'_>,
        item: Item<'_>,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        let members = match Self::members(&item) {
            Ok(members) => members,
            Err(e) => {
                debug!(block = ctx.block.number, error = %e, "Council term not applied");
                return Ok(());
            }
        };
        let accounts: Vec<AccountId> = members.into_iter().map(|(account, _)| account).collect();
        tx.update_role_membership(AccountRole::CouncilMember, &accounts, ctx.block.number)
            .await?;
        Ok(())
    }
}

// =============================================================================
// Sudo
// =============================================================================

/// `sudo.set_key(new)`.
pub struct SudoKeyProcessor;

impl SudoKeyProcessor {
    const NAME: &'static str = "sudo.set_key";
}

#[async_trait]
impl Processor for SudoKeyProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn sequence(
        &self,
        ctx: &SequenceContext<'_>,
        item: Item<'_>,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        let Ok(ext) = extrinsic_of(Self::NAME, &item) else {
            return Ok(());
        };
        if !ext.success {
            return Ok(());
        }
        let Ok(key) = param_account(Self::NAME, ext, "new") else {
            debug!(block = ctx.block.number, "Sudo key not applied");
            return Ok(());
        };

        tx.update_role_membership(AccountRole::Sudo, &[key], ctx.block.number)
            .await?;
        Ok(())
    }
}

// =============================================================================
// Democracy proposals
// =============================================================================

/// `democracy.Proposed`: the event carries no proposer, the call does.
pub struct DemocracyProposedProcessor;

impl DemocracyProposedProcessor {
    const NAME: &'static str = "democracy.Proposed";
}

#[async_trait]
impl Processor for DemocracyProposedProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn search_index(
        &self,
        ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Vec<SearchIndex>,
    ) -> DomainResult<()> {
        let call = emitting_call(Self::NAME, &item)?;
        let proposer = signer_of(Self::NAME, call)?;
        let deposit = call.param("value").and_then(parse_amount);
        push_entry(
            out,
            ctx.raw.number,
            &item,
            proposer,
            SearchIndexType::DemocracyProposed,
            deposit,
        );
        Ok(())
    }
}

// =============================================================================
// Bundle
// =============================================================================

pub struct GovernanceBundle;

impl ProcessorBundle for GovernanceBundle {
    fn name(&self) -> &'static str {
        "governance"
    }

    fn processors(&self) -> Vec<Registration> {
        use SearchIndexType::*;

        let mut processors = vec![
            Registration::event(
                "council",
                "Proposed",
                Arc::new(EventSearch::new("council.Proposed", &[4]).account(0, CouncilProposed)),
            ),
            Registration::event(
                "council",
                "Voted",
                Arc::new(EventSearch::new("council.Voted", &[5]).account(0, CouncilVote)),
            ),
            Registration::event(
                "technicalcommittee",
                "Proposed",
                Arc::new(
                    EventSearch::new("technicalcommittee.Proposed", &[4])
                        .account(0, TechCommProposed),
                ),
            ),
            Registration::event(
                "technicalcommittee",
                "Voted",
                Arc::new(
                    EventSearch::new("technicalcommittee.Voted", &[5]).account(0, TechCommVote),
                ),
            ),
            Registration::event("democracy", "Proposed", Arc::new(DemocracyProposedProcessor)),
            Registration::extrinsic(
                "democracy",
                "vote",
                Arc::new(
                    CallSearch::new("democracy.vote", DemocracyVote)
                        .amount(&["vote", "Standard", "balance"]),
                ),
            ),
            Registration::extrinsic(
                "democracy",
                "proxy_vote",
                Arc::new(CallSearch::new("democracy.proxy_vote", DemocracyProxyVote)),
            ),
            Registration::extrinsic(
                "democracy",
                "second",
                Arc::new(CallSearch::new("democracy.second", DemocracySecond)),
            ),
            // `(proposal_index, award, beneficiary)`
            Registration::event(
                "treasury",
                "Awarded",
                Arc::new(
                    EventSearch::new("treasury.Awarded", &[3])
                        .account_with_amount(2, TreasuryAwarded, 1),
                ),
            ),
            Registration::extrinsic(
                "treasury",
                "propose_spend",
                Arc::new(
                    CallSearch::new("treasury.propose_spend", TreasuryProposed)
                        .also(CallAccount::Param("beneficiary"))
                        .amount(&["value"]),
                ),
            ),
            // `(who, ethereum_address, amount)`
            Registration::event(
                "claims",
                "Claimed",
                Arc::new(
                    EventSearch::new("claims.Claimed", &[3]).account_with_amount(
                        0,
                        ClaimsClaimed,
                        2,
                    ),
                ),
            ),
            Registration::extrinsic("sudo", "set_key", Arc::new(SudoKeyProcessor)),
        ];

        let new_term: Arc<dyn Processor> = Arc::new(NewTermProcessor);
        let kicked: Arc<dyn Processor> = Arc::new(
            EventSearch::new("electionsphragmen.MemberKicked", &[1])
                .account(0, CouncilMemberKicked),
        );
        let renounced: Arc<dyn Processor> = Arc::new(
            EventSearch::new("electionsphragmen.MemberRenounced", &[1])
                .account(0, CouncilCandidacyRenounced),
        );
        let submit: Arc<dyn Processor> = Arc::new(CallSearch::new(
            "electionsphragmen.submit_candidacy",
            CouncilCandidacySubmitted,
        ));
        let vote: Arc<dyn Processor> = Arc::new(
            CallSearch::new("electionsphragmen.vote", CouncilCandidateVoted)
                .also(CallAccount::ParamList("votes"))
                .amount(&["value"]),
        );

        for (event_id, name) in TECH_MEMBERSHIP_EVENTS {
            processors.push(Registration::event(
                "technicalmembership",
                event_id,
                Arc::new(RoleSetProcessor::tech_committee(name)),
            ));
        }

        for module in ELECTION_MODULES {
            processors.extend([
                Registration::event(module, "NewTerm", new_term.clone()),
                Registration::event(module, "MemberKicked", kicked.clone()),
                Registration::event(module, "MemberRenounced", renounced.clone()),
                Registration::extrinsic(module, "submit_candidacy", submit.clone()),
                Registration::extrinsic(module, "vote", vote.clone()),
            ]);
        }

        processors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::config::RetryConfig;
    use serde_json::json;

    use crate::utils::fixtures::{StaticState, account, context, event, extrinsic, hex_account, raw_block};

    #[test]
    fn test_new_term_members_with_stake() {
        let raw = raw_block(
            70,
            vec![],
            vec![event(
                0,
                None,
                "electionsphragmen",
                "NewTerm",
                vec![json!([[hex_account(1), 1000], {"account": hex_account(2), "balance": "0x10"}])],
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
        NewTermProcessor.search_index(&ctx, item, &mut out).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].account_id, account(1));
        assert_eq!(out[0].sorting_value, Some(1000));
        assert_eq!(out[1].account_id, account(2));
        assert_eq!(out[1].sorting_value, Some(16));
        assert!(out.iter().all(|e| e.index_type == SearchIndexType::CouncilMemberElected));
    }

    #[tokio::test]
    async fn test_malformed_term_is_recoverable() {
        let raw = raw_block(
            70,
            vec![],
            vec![event(0, None, "electionsphragmen", "NewTerm", vec![json!("0x00")])],
            vec![],
        );
        let chain = StaticState::default();
        let retry = RetryConfig::default();
        let ctx = context(&raw, &chain, &retry);

        let mut out = Accumulation::default();
        let err = NewTermProcessor
            .accumulate(
                &ctx,
                Item::Event {
                    event: &raw.events[0],
                    extrinsic: None,
                },
                &mut out,
            )
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_democracy_proposal_indexed_by_signer() {
        let call = extrinsic(
            0,
            "democracy",
            "propose",
            Some(3),
            vec![("proposal_hash", json!("0x00")), ("value", json!(250))],
        );
        let raw = raw_block(
            71,
            vec![call],
            vec![event(1, Some(0), "democracy", "Proposed", vec![json!(0), json!(250)])],
            vec![],
        );
        let chain = StaticState::default();
        let retry = RetryConfig::default();
        let ctx = context(&raw, &chain, &retry);
        let item = Item::Event {
            event: &raw.events[0],
            extrinsic: raw.extrinsic(0),
        };

        let mut out = Vec::new();
        DemocracyProposedProcessor
            .search_index(&ctx, item, &mut out)
            .unwrap();

        assert_eq!(out[0].account_id, account(3));
        assert_eq!(out[0].sorting_value, Some(250));
        assert_eq!(out[0].extrinsic_idx, Some(0));
        assert_eq!(out[0].event_idx, Some(1));
    }

    #[test]
    fn test_tech_membership_events_refresh_committee() {
        let registrations = GovernanceBundle.processors();
        for (event_id, name) in TECH_MEMBERSHIP_EVENTS {
            let registration = registrations
                .iter()
                .find(|r| r.module_id == "technicalmembership" && r.id == event_id)
                .unwrap();
            assert_eq!(registration.processor.name(), name);
        }
    }

    #[test]
    fn test_both_election_module_names_registered() {
        let registrations = GovernanceBundle.processors();
        let mut processors = Vec::new();
        for (event_id, name) in TECH_MEMBERSHIP_EVENTS {
            processors.push(Registration::event(
                "technicalmembership",
                event_id,
                Arc::new(RoleSetProcessor::tech_committee(name)),
            ));
        }

        for module in ELECTION_MODULES {
            assert!(registrations
                .iter()
                .any(|r| r.module_id == module && r.id == "NewTerm"));
        }
    }
}
