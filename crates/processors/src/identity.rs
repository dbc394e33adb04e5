//! Identity pallet bundle.
//!
//! Identity changes are recorded as audits and applied by the reconciler,
//! which keeps the identity graph one level deep. Field values come from
//! the emitting call since the events only name the account.
//! `RegistrarAdded` refreshes the registrar flags from `Identity.Registrars`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use chronicle_core::error::{DomainError, DomainResult};
use chronicle_core::models::{
    AuditRecord, IdentityAction, IdentityFields, Judgement, SearchIndex, SearchIndexType,
    SubIdentity,
};
use chronicle_core::ports::{Accumulation, Item, Processor, ProcessorContext};
use chronicle_core::value::{extract_field, parse_account, parse_data_text, parse_u32};

use crate::bundle::{ProcessorBundle, Registration};
use crate::roles::RoleSetProcessor;
use crate::search::EventSearch;
use crate::utils::{
    attr_account, emitting_call, event_of, extrinsic_of, param_of, push_entry, require_attrs,
    signer_of,
};

// =============================================================================
// Parsing
// =============================================================================

/// Fields of an `IdentityInfo` call parameter; absent fields stay empty.
fn identity_fields(info: Option<&Value>) -> IdentityFields {
    let Some(info) = info else {
        return IdentityFields::default();
    };
    let field = |name: &str| info.get(name).and_then(parse_data_text);
    IdentityFields {
        display: field("display"),
        email: field("email"),
        legal: field("legal"),
        riot: field("riot"),
        web: field("web"),
        twitter: field("twitter"),
    }
}

/// `{ "Reasonable": null }` or `"Reasonable"`.
fn judgement_name(value: &Value) -> Option<&str> {
    match value {
        Value::String(name) => Some(name),
        Value::Object(obj) => obj.keys().next().map(String::as_str),
        _ => None,
    }
}

/// `[(account, name)]` as tuples or `{ account, name }` objects.
fn sub_identities(value: &Value) -> Option<Vec<SubIdentity>> {
    value
        .as_array()?
        .iter()
        .map(|entry| {
            Some(SubIdentity {
                account_id: extract_field(entry, &["account"], 0, parse_account)?,
                name: extract_field(entry, &["name", "data"], 1, parse_data_text),
            })
        })
        .collect()
}

// =============================================================================
// Events
// =============================================================================

/// `IdentitySet`, `IdentityCleared` and `IdentityKilled`.
pub struct IdentityEventProcessor {
    name: &'static str,
    kind: IdentityEventKind,
}

#[derive(Debug, Clone, Copy)]
enum IdentityEventKind {
    Set,
    Cleared,
    Killed,
}

impl IdentityEventProcessor {
    pub fn set() -> Self {
        Self {
            name: "identity.IdentitySet",
            kind: IdentityEventKind::Set,
        }
    }

    pub fn cleared() -> Self {
        Self {
            name: "identity.IdentityCleared",
            kind: IdentityEventKind::Cleared,
        }
    }

    pub fn killed() -> Self {
        Self {
            name: "identity.IdentityKilled",
            kind: IdentityEventKind::Killed,
        }
    }

    fn index_type(&self) -> SearchIndexType {
        match self.kind {
            IdentityEventKind::Set => SearchIndexType::IdentitySet,
            IdentityEventKind::Cleared => SearchIndexType::IdentityCleared,
            IdentityEventKind::Killed => SearchIndexType::IdentityKilled,
        }
    }
}

#[async_trait]
impl Processor for IdentityEventProcessor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn accumulate(
        &self,
        _ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Accumulation,
    ) -> DomainResult<()> {
        let event = event_of(self.name, &item)?;
        let action = match self.kind {
            IdentityEventKind::Set => {
                require_attrs(self.name, event, &[1])?;
                let info = item.extrinsic().and_then(|ext| ext.param("info"));
                IdentityAction::Set(identity_fields(info))
            }
            // `(who, deposit)`
            IdentityEventKind::Cleared => {
                require_attrs(self.name, event, &[2])?;
                IdentityAction::Cleared
            }
            IdentityEventKind::Killed => {
                require_attrs(self.name, event, &[2])?;
                IdentityAction::Killed
            }
        };

        out.audits.push(AuditRecord::Identity {
            event_idx: event.index,
            extrinsic_idx: event.extrinsic_index(),
            account_id: attr_account(self.name, event, 0)?,
            action,
        });
        Ok(())
    }

    fn search_index(
        &self,
        ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Vec<SearchIndex>,
    ) -> DomainResult<()> {
        let event = event_of(self.name, &item)?;
        let account = attr_account(self.name, event, 0)?;
        push_entry(out, ctx.raw.number, &item, account, self.index_type(), None);
        Ok(())
    }
}

/// `JudgementGiven(target, registrar_index)`; the verdict is a call parameter.
pub struct JudgementGivenProcessor;

impl JudgementGivenProcessor {
    const NAME: &'static str = "identity.JudgementGiven";
}

#[async_trait]
impl Processor for JudgementGivenProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn accumulate(
        &self,
        _ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Accumulation,
    ) -> DomainResult<()> {
        let event = event_of(Self::NAME, &item)?;
        require_attrs(Self::NAME, event, &[2])?;
        let account_id = attr_account(Self::NAME, event, 0)?;
        let registrar_index = event.attr(1).and_then(parse_u32).ok_or_else(|| {
            DomainError::mismatch(Self::NAME, "attribute 1 is not a registrar index")
        })?;

        let call = emitting_call(Self::NAME, &item)?;
        let raw_judgement = param_of(Self::NAME, call, "judgement")?;
        let judgement = judgement_name(raw_judgement)
            .and_then(Judgement::from_name)
            .ok_or_else(|| {
                DomainError::mismatch(Self::NAME, format!("unknown judgement {raw_judgement}"))
            })?;

        out.audits.push(AuditRecord::IdentityJudgement {
            event_idx: event.index,
            extrinsic_idx: event.extrinsic_index(),
            account_id,
            registrar_index,
            judgement,
        });
        Ok(())
    }

    fn search_index(
        &self,
        ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Vec<SearchIndex>,
    ) -> DomainResult<()> {
        let event = event_of(Self::NAME, &item)?;
        let account = attr_account(Self::NAME, event, 0)?;
        push_entry(
            out,
            ctx.raw.number,
            &item,
            account,
            SearchIndexType::IdentityJudgementGiven,
            None,
        );
        Ok(())
    }
}

// =============================================================================
// Calls
// =============================================================================

/// `identity.set_subs`: replaces the signer's sub-identities.
///
/// The call emits no dedicated event, so the audit is anchored at the
/// call's last event.
pub struct SetSubsProcessor;

impl SetSubsProcessor {
    const NAME: &'static str = "identity.set_subs";
}

#[async_trait]
impl Processor for SetSubsProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn accumulate(
        &self,
        ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Accumulation,
    ) -> DomainResult<()> {
        let ext = extrinsic_of(Self::NAME, &item)?;
        if !ext.success {
            return Ok(());
        }

        let account_id = signer_of(Self::NAME, ext)?;
        let subs = sub_identities(param_of(Self::NAME, ext, "subs")?)
            .ok_or_else(|| DomainError::mismatch(Self::NAME, "malformed 'subs' parameter"))?;

        out.audits.push(AuditRecord::Identity {
            event_idx: ctx.raw.last_event_of(ext.index),
            extrinsic_idx: Some(ext.index),
            account_id,
            action: IdentityAction::SetSubs(subs),
        });
        Ok(())
    }

    fn search_index(
        &self,
        ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Vec<SearchIndex>,
    ) -> DomainResult<()> {
        let ext = extrinsic_of(Self::NAME, &item)?;
        if ext.success {
            let account = signer_of(Self::NAME, ext)?;
            push_entry(
                out,
                ctx.raw.number,
                &item,
                account,
                SearchIndexType::IdentitySetSubs,
                None,
            );
        }
        Ok(())
    }
}

// =============================================================================
// Bundle
// =============================================================================

pub struct IdentityBundle;

impl ProcessorBundle for IdentityBundle {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn processors(&self) -> Vec<Registration> {
        let requested = EventSearch::new("identity.JudgementRequested", &[2])
            .account(0, SearchIndexType::IdentityJudgementRequested);
        let unrequested = EventSearch::new("identity.JudgementUnrequested", &[2])
            .account(0, SearchIndexType::IdentityJudgementUnrequested);

        vec![
            Registration::event("identity", "IdentitySet", Arc::new(IdentityEventProcessor::set())),
            Registration::event(
                "identity",
                "IdentityCleared",
                Arc::new(IdentityEventProcessor::cleared()),
            ),
            Registration::event(
                "identity",
                "IdentityKilled",
                Arc::new(IdentityEventProcessor::killed()),
            ),
            Registration::event("identity", "JudgementGiven", Arc::new(JudgementGivenProcessor)),
            Registration::event("identity", "JudgementRequested", Arc::new(requested)),
            Registration::event("identity", "JudgementUnrequested", Arc::new(unrequested)),
            Registration::extrinsic("identity", "set_subs", Arc::new(SetSubsProcessor)),
            Registration::event(
                "identity",
                "RegistrarAdded",
                Arc::new(RoleSetProcessor::registrars()),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::config::RetryConfig;
    use serde_json::json;

    use crate::utils::fixtures::{StaticState, account, context, event, extrinsic, hex_account, raw_block};

    #[tokio::test]
    async fn test_identity_set_reads_call_info() {
        let call = extrinsic(
            1,
            "identity",
            "set_identity",
            Some(8),
            vec![(
                "info",
                json!({
                    "display": {"Raw": "Alice"},
                    "email": {"None": null},
                    "web": {"Raw": "0x68747470733a2f2f612e6f7267"}
                }),
            )],
        );
        let raw = raw_block(
            30,
            vec![call],
            vec![event(3, Some(1), "identity", "IdentitySet", vec![hex_account(8)])],
            vec![],
        );
        let chain = StaticState::default();
        let retry = RetryConfig::default();
        let ctx = context(&raw, &chain, &retry);
        let item = Item::Event {
            event: &raw.events[0],
            extrinsic: raw.extrinsic(1),
        };

        let mut out = Accumulation::default();
        IdentityEventProcessor::set()
            .accumulate(&ctx, item, &mut out)
            .await
            .unwrap();

        let AuditRecord::Identity {
            account_id,
            action: IdentityAction::Set(fields),
            ..
        } = &out.audits[0]
        else {
            panic!("unexpected audit: {:?}", out.audits[0]);
        };
        assert_eq!(*account_id, account(8));
        assert_eq!(fields.display.as_deref(), Some("Alice"));
        assert_eq!(fields.email, None);
        assert_eq!(fields.web.as_deref(), Some("https://a.org"));
    }

    #[tokio::test]
    async fn test_judgement_from_call_parameter() {
        let call = extrinsic(
            2,
            "identity",
            "provide_judgement",
            Some(9),
            vec![
                ("reg_index", json!(0)),
                ("target", hex_account(8)),
                ("judgement", json!({"KnownGood": null})),
            ],
        );
        let raw = raw_block(
            31,
            vec![call],
            vec![event(5, Some(2), "identity", "JudgementGiven", vec![hex_account(8), json!(0)])],
            vec![],
        );
        let chain = StaticState::default();
        let retry = RetryConfig::default();
        let ctx = context(&raw, &chain, &retry);
        let item = Item::Event {
            event: &raw.events[0],
            extrinsic: raw.extrinsic(2),
        };

        let mut out = Accumulation::default();
        JudgementGivenProcessor
            .accumulate(&ctx, item, &mut out)
            .await
            .unwrap();

        assert_eq!(
            out.audits[0],
            AuditRecord::IdentityJudgement {
                event_idx: 5,
                extrinsic_idx: Some(2),
                account_id: account(8),
                registrar_index: 0,
                judgement: Judgement::KnownGood,
            }
        );
    }

    // Test critique: sans extrinsic émetteur, le jugement est inconnu => mismatch
    #[tokio::test]
    async fn test_judgement_without_call_is_recoverable() {
        let raw = raw_block(
            31,
            vec![],
            vec![event(0, None, "identity", "JudgementGiven", vec![hex_account(8), json!(0)])],
            vec![],
        );
        let chain = StaticState::default();
        let retry = RetryConfig::default();
        let ctx = context(&raw, &chain, &retry);

        let mut out = Accumulation::default();
        let err = JudgementGivenProcessor
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

    #[tokio::test]
    async fn test_set_subs_anchored_after_call_events() {
        let call = extrinsic(
            1,
            "identity",
            "set_subs",
            Some(8),
            vec![(
                "subs",
                json!([[hex_account(10), {"Raw": "ledger"}], {"account": hex_account(11), "name": {"None": null}}]),
            )],
        );
        let raw = raw_block(
            32,
            vec![call],
            vec![
                event(0, Some(1), "balances", "Reserved", vec![]),
                event(1, Some(1), "system", "ExtrinsicSuccess", vec![]),
            ],
            vec![],
        );
        let chain = StaticState::default();
        let retry = RetryConfig::default();
        let ctx = context(&raw, &chain, &retry);
        let item = Item::Extrinsic(&raw.extrinsics[0]);

        let mut out = Accumulation::default();
        SetSubsProcessor.accumulate(&ctx, item, &mut out).await.unwrap();
        SetSubsProcessor
            .search_index(&ctx, item, &mut out.search_index)
            .unwrap();

        assert_eq!(
            out.audits[0],
            AuditRecord::Identity {
                event_idx: 1,
                extrinsic_idx: Some(1),
                account_id: account(8),
                action: IdentityAction::SetSubs(vec![
                    SubIdentity {
                        account_id: account(10),
                        name: Some("ledger".into()),
                    },
                    SubIdentity {
                        account_id: account(11),
                        name: None,
                    },
                ]),
            }
        );
        assert_eq!(out.search_index[0].index_type, SearchIndexType::IdentitySetSubs);
    }
}
