//! Validator/session engine.
//!
//! A session rotation is captured at the rotating block's hash during
//! accumulation ([`capture_session`]) and applied to account state during
//! sequencing ([`apply_session`]).

use std::collections::{BTreeSet, HashMap};

use serde_json::{Value, json};
use tracing::debug;

use crate::config::SessionLookup;
use crate::error::DomainResult;
use crate::models::{
    AccountId, AccountRole, Session, SessionNominator, SessionSnapshot, SessionTotal,
    SessionValidator,
};
use crate::ports::{ProcessorContext, StateTransaction};
use crate::value::{extract_field, parse_account, parse_accounts, parse_amount, parse_u32};

// =============================================================================
// Authorship
// =============================================================================

/// Rank of a block's author in its session's validator list.
///
/// An explicit authority index wins; otherwise the slot is assigned round
/// robin. Blocks without a slot have no resolvable author.
pub fn rank_validator(
    slot_number: Option<u64>,
    authority_index: Option<u32>,
    validator_count: u32,
) -> Option<u32> {
    let slot = slot_number?;
    if authority_index.is_some() {
        return authority_index;
    }
    if validator_count == 0 {
        return None;
    }
    Some((slot % u64::from(validator_count)) as u32)
}

/// Summary closing the session before `new_session_id`.
///
/// `previous` is that session when it was indexed; without it the span is
/// counted from genesis.
pub fn close_previous(
    new_session_id: u64,
    closing_block: u64,
    previous: Option<&Session>,
) -> Option<SessionTotal> {
    let id = new_session_id.checked_sub(1)?;
    let count_blocks = match previous {
        Some(prev) => (closing_block + 1).saturating_sub(prev.start_at_block),
        None => closing_block,
    };
    Some(SessionTotal {
        id,
        end_at_block: closing_block,
        count_blocks,
    })
}

// =============================================================================
// Capture
// =============================================================================

/// Stake exposure of one validator.
#[derive(Debug, Default)]
struct Exposure {
    total: Option<u128>,
    own: Option<u128>,
    others: Vec<(AccountId, Option<u128>)>,
}

impl Exposure {
    fn parse(value: Option<&Value>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };
        let others = value
            .get("others")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|o| {
                        let who = extract_field(o, &["who"], 0, parse_account)?;
                        Some((who, extract_field(o, &["value"], 1, parse_amount)))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            total: value.get("total").and_then(parse_amount),
            own: value.get("own").and_then(parse_amount),
            others,
        }
    }

    fn bonded_nominators(&self) -> Option<u128> {
        match self.total {
            Some(total) if total > 0 => Some(total.saturating_sub(self.own.unwrap_or(0))),
            _ => None,
        }
    }
}

/// Per-validator lookup result, independent of the runtime generation.
struct ValidatorLookup {
    stash: AccountId,
    controller: Option<AccountId>,
    session_key: Option<String>,
    commission: Option<u32>,
    exposure: Exposure,
}

fn key(account: &AccountId) -> Value {
    json!(account.to_hex())
}

fn commission_of(prefs: Option<&Value>) -> Option<u32> {
    let prefs = prefs?;
    prefs
        .get("commission")
        .or_else(|| prefs.get(0).and_then(|p| p.get("commission")))
        .and_then(parse_u32)
}

/// `Session.QueuedKeys` as `validator -> grandpa key`.
fn queued_keys(value: Option<&Value>) -> HashMap<AccountId, String> {
    let Some(list) = value.and_then(Value::as_array) else {
        return HashMap::new();
    };
    list.iter()
        .filter_map(|item| {
            let validator = extract_field(item, &["validator"], 0, parse_account)?;
            let keys = item.get("keys").or_else(|| item.get(1))?;
            let session_key = keys
                .get("grandpa")
                .or_else(|| keys.get("ed25519"))
                .and_then(Value::as_str)?;
            Some((validator, session_key.to_string()))
        })
        .collect()
}

async fn lookup_current(
    ctx: &ProcessorContext<'_>,
    era: Option<u32>,
    validators: &[AccountId],
) -> DomainResult<Vec<ValidatorLookup>> {
    let session_keys = queued_keys(ctx.storage("Session", "QueuedKeys", &[]).await?.as_ref());
    let mut out = Vec::with_capacity(validators.len());

    for stash in validators {
        let controller = ctx
            .storage("Staking", "Bonded", &[key(stash)])
            .await?
            .as_ref()
            .and_then(parse_account);

        let (prefs, exposure) = match era {
            Some(era) => (
                ctx.storage("Staking", "ErasValidatorPrefs", &[json!(era), key(stash)])
                    .await?,
                ctx.storage("Staking", "ErasStakers", &[json!(era), key(stash)])
                    .await?,
            ),
            None => (None, None),
        };

        out.push(ValidatorLookup {
            stash: stash.clone(),
            controller,
            session_key: session_keys.get(stash).cloned(),
            commission: commission_of(prefs.as_ref()),
            exposure: Exposure::parse(exposure.as_ref()),
        });
    }

    Ok(out)
}

async fn lookup_legacy(
    ctx: &ProcessorContext<'_>,
    controllers: &[AccountId],
) -> DomainResult<Vec<ValidatorLookup>> {
    let mut out = Vec::with_capacity(controllers.len());

    for controller in controllers {
        let ledger = ctx.storage("Staking", "Ledger", &[key(controller)]).await?;
        // Without a ledger the controller is the only identity we have.
        let stash = ledger
            .as_ref()
            .and_then(|l| l.get("stash"))
            .and_then(parse_account)
            .unwrap_or_else(|| controller.clone());

        let session_key = ctx
            .storage("Session", "NextKeyFor", &[key(controller)])
            .await?
            .and_then(|v| v.as_str().map(str::to_string));

        let prefs = ctx.storage("Staking", "Validators", &[key(&stash)]).await?;
        let exposure = ctx.storage("Staking", "Stakers", &[key(&stash)]).await?;

        out.push(ValidatorLookup {
            stash,
            controller: Some(controller.clone()),
            session_key,
            commission: commission_of(prefs.as_ref()),
            exposure: Exposure::parse(exposure.as_ref()),
        });
    }

    Ok(out)
}

/// Read the validator set and exposures for a new session at the current block.
///
/// Validator rank is the position in `Session.Validators` as stored.
pub async fn capture_session(
    ctx: &ProcessorContext<'_>,
    session_id: u64,
    extrinsic_idx: Option<u32>,
    event_idx: u32,
) -> DomainResult<SessionSnapshot> {
    let era = ctx
        .storage("Staking", "CurrentEra", &[])
        .await?
        .as_ref()
        .and_then(parse_u32);

    let listed = ctx
        .storage("Session", "Validators", &[])
        .await?
        .as_ref()
        .and_then(parse_accounts)
        .unwrap_or_default();

    let lookups = match ctx.runtime.session_lookup {
        SessionLookup::Current => lookup_current(ctx, era, &listed).await?,
        SessionLookup::Legacy => lookup_legacy(ctx, &listed).await?,
    };

    let mut validators = Vec::with_capacity(lookups.len());
    let mut nominators = Vec::new();
    let mut distinct_nominators = BTreeSet::new();

    for (rank, lookup) in lookups.into_iter().enumerate() {
        let rank = rank as u32;

        for (rank_nominator, (who, bonded)) in lookup.exposure.others.iter().enumerate() {
            distinct_nominators.insert(who.clone());
            nominators.push(SessionNominator {
                session_id,
                rank_validator: rank,
                rank_nominator: rank_nominator as u32,
                nominator_stash: who.clone(),
                nominator_controller: None,
                bonded: *bonded,
            });
        }

        validators.push(SessionValidator {
            session_id,
            rank_validator: rank,
            validator_stash: lookup.stash,
            validator_controller: lookup.controller,
            validator_session: lookup.session_key,
            bonded_total: lookup.exposure.total,
            bonded_own: lookup.exposure.own,
            bonded_nominators: lookup.exposure.bonded_nominators(),
            count_nominators: lookup.exposure.others.len() as u32,
            commission: lookup.commission,
        });
    }

    debug!(
        session = session_id,
        validators = validators.len(),
        nominators = distinct_nominators.len(),
        lookup = ?ctx.runtime.session_lookup,
        "Session captured"
    );

    Ok(SessionSnapshot {
        session: Session {
            id: session_id,
            start_at_block: ctx.raw.number + 1,
            era,
            count_validators: validators.len() as u32,
            count_nominators: distinct_nominators.len() as u32,
            created_at_block: ctx.raw.number,
            created_at_extrinsic: extrinsic_idx,
            created_at_event: event_idx,
        },
        validators,
        nominators,
    })
}

// =============================================================================
// Apply
// =============================================================================

/// Close the previous session and update validator/nominator role flags.
pub async fn apply_session(
    tx: &mut dyn StateTransaction,
    snapshot: &SessionSnapshot,
    block_number: u64,
) -> DomainResult<()> {
    let session_id = snapshot.session.id;
    if let Some(prev_id) = session_id.checked_sub(1) {
        let previous = tx.session(prev_id).await?;
        if let Some(total) = close_previous(session_id, block_number, previous.as_ref()) {
            tx.save_session_total(&total).await?;
        }
    }

    let validators: Vec<AccountId> = snapshot
        .validators
        .iter()
        .map(|v| v.validator_stash.clone())
        .collect();
    let nominators: Vec<AccountId> = snapshot
        .nominators
        .iter()
        .map(|n| n.nominator_stash.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    tx.update_role_membership(AccountRole::Validator, &validators, block_number)
        .await?;
    tx.update_role_membership(AccountRole::Nominator, &nominators, block_number)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test critique: slot 7, 3 validateurs, pas d'index explicite => rang 1
    #[test]
    fn test_round_robin_authorship() {
        assert_eq!(rank_validator(Some(7), None, 3), Some(1));
    }

    #[test]
    fn test_explicit_authority_index_wins() {
        assert_eq!(rank_validator(Some(7), Some(2), 3), Some(2));
        assert_eq!(rank_validator(Some(7), Some(0), 0), Some(0));
    }

    #[test]
    fn test_no_slot_or_no_validators() {
        assert_eq!(rank_validator(None, Some(1), 3), None);
        assert_eq!(rank_validator(Some(7), None, 0), None);
    }

    fn session(id: u64, start_at_block: u64) -> Session {
        Session {
            id,
            start_at_block,
            era: None,
            count_validators: 0,
            count_nominators: 0,
            created_at_block: start_at_block.saturating_sub(1),
            created_at_extrinsic: None,
            created_at_event: 0,
        }
    }

    #[test]
    fn test_close_previous_span() {
        let prev = session(4, 101);
        let total = close_previous(5, 200, Some(&prev)).unwrap();
        assert_eq!(total.id, 4);
        assert_eq!(total.end_at_block, 200);
        assert_eq!(total.count_blocks, 100);

        let from_genesis = close_previous(1, 50, None).unwrap();
        assert_eq!(from_genesis.count_blocks, 50);

        assert!(close_previous(0, 10, None).is_none());
    }

    #[test]
    fn test_exposure_parsing() {
        let who = "0x".to_string() + &"0a".repeat(32);
        let value = json!({
            "total": "1000",
            "own": 400,
            "others": [{"who": who, "value": 600}]
        });
        let exposure = Exposure::parse(Some(&value));
        assert_eq!(exposure.total, Some(1000));
        assert_eq!(exposure.bonded_nominators(), Some(600));
        assert_eq!(exposure.others, vec![(AccountId([0x0a; 32]), Some(600))]);

        let empty = Exposure::parse(None);
        assert_eq!(empty.bonded_nominators(), None);
        assert!(empty.others.is_empty());
    }

    #[test]
    fn test_queued_keys_lookup() {
        let v = "0x".to_string() + &"0b".repeat(32);
        let value = json!([[v, {"grandpa": "0xfeed", "babe": "0xbeef"}]]);
        let keys = queued_keys(Some(&value));
        assert_eq!(keys.get(&AccountId([0x0b; 32])), Some(&"0xfeed".to_string()));
    }
}
