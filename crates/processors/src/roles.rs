//! Role sets read from runtime storage.
//!
//! Membership events only announce that a set changed. The full set is read
//! at the block during accumulation and replaces the previous members while
//! sequencing.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use chronicle_core::error::{DomainError, DomainResult};
use chronicle_core::models::{AccountId, AccountRole, RoleMembership};
use chronicle_core::ports::{
    Accumulation, Item, Processor, ProcessorContext, SequenceContext, StateTransaction,
};
use chronicle_core::value::{extract_field, parse_account, parse_accounts};

/// Reads one storage value holding every member of `role`.
pub struct RoleSetProcessor {
    name: &'static str,
    role: AccountRole,
    pallet: &'static str,
    entry: &'static str,
    parse: fn(&Value) -> Option<Vec<AccountId>>,
}

impl RoleSetProcessor {
    /// `Identity.Registrars`: a list of optional registrar records.
    pub fn registrars() -> Self {
        Self {
            name: "identity.RegistrarAdded",
            role: AccountRole::Registrar,
            pallet: "Identity",
            entry: "Registrars",
            parse: parse_registrars,
        }
    }

    /// `TechnicalCommittee.Members`, refreshed on every membership event.
    pub fn tech_committee(name: &'static str) -> Self {
        Self {
            name,
            role: AccountRole::TechCommMember,
            pallet: "TechnicalCommittee",
            entry: "Members",
            parse: parse_accounts,
        }
    }
}

fn parse_registrars(value: &Value) -> Option<Vec<AccountId>> {
    value
        .as_array()?
        .iter()
        .filter(|registrar| !registrar.is_null())
        .map(|registrar| extract_field(registrar, &["account"], 0, parse_account))
        .collect()
}

#[async_trait]
impl Processor for RoleSetProcessor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn accumulate(
        &self,
        ctx: &ProcessorContext<'_>,
        _item: Item<'_>,
        out: &mut Accumulation,
    ) -> DomainResult<()> {
        let Some(value) = ctx.storage(self.pallet, self.entry, &[]).await? else {
            debug!(
                block = ctx.raw.number,
                pallet = self.pallet,
                entry = self.entry,
                "Role set not in storage"
            );
            return Ok(());
        };
        let members = (self.parse)(&value)
            .ok_or_else(|| DomainError::mismatch(self.name, "malformed member list"))?;

        out.memberships.push(RoleMembership {
            role: self.role,
            members,
        });
        Ok(())
    }

    async fn sequence(
        &self,
        ctx: &SequenceContext<'_>,
        _item: Item<'_>,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        let Some(membership) = ctx.accumulation.membership(self.role) else {
            return Ok(());
        };
        tx.update_role_membership(self.role, &membership.members, ctx.block.number)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::config::RetryConfig;
    use serde_json::json;

    use crate::utils::fixtures::{StaticState, account, context, event, hex_account, raw_block};

    #[tokio::test]
    async fn test_registrars_skip_empty_slots() {
        let raw = raw_block(
            12,
            vec![],
            vec![event(0, None, "identity", "RegistrarAdded", vec![json!(2)])],
            vec![],
        );
        let chain = StaticState::default().with(
            "Identity",
            "Registrars",
            &[],
            json!([
                {"account": hex_account(4), "fee": 0, "fields": 0},
                null,
                {"account": hex_account(6), "fee": 10, "fields": 0}
            ]),
        );
        let retry = RetryConfig::default();
        let ctx = context(&raw, &chain, &retry);
        let item = Item::Event {
            event: &raw.events[0],
            extrinsic: None,
        };

        let mut out = Accumulation::default();
        RoleSetProcessor::registrars()
            .accumulate(&ctx, item, &mut out)
            .await
            .unwrap();

        let membership = out.membership(AccountRole::Registrar).unwrap();
        assert_eq!(membership.members, vec![account(4), account(6)]);
        assert!(out.membership(AccountRole::TechCommMember).is_none());
    }

    // Test critique: une liste illisible est une erreur récupérable, une absence n'en est pas une
    #[tokio::test]
    async fn test_tech_committee_members() {
        let raw = raw_block(
            13,
            vec![],
            vec![event(0, None, "technicalmembership", "MemberAdded", vec![])],
            vec![],
        );
        let item = Item::Event {
            event: &raw.events[0],
            extrinsic: None,
        };
        let retry = RetryConfig::default();
        let processor = RoleSetProcessor::tech_committee("technicalmembership.MemberAdded");

        let chain = StaticState::default().with(
            "TechnicalCommittee",
            "Members",
            &[],
            json!([hex_account(1), hex_account(2)]),
        );
        let mut out = Accumulation::default();
        processor
            .accumulate(&context(&raw, &chain, &retry), item, &mut out)
            .await
            .unwrap();
        assert_eq!(
            out.membership(AccountRole::TechCommMember).unwrap().members,
            vec![account(1), account(2)]
        );

        let empty = StaticState::default();
        let mut out = Accumulation::default();
        processor
            .accumulate(&context(&raw, &empty, &retry), item, &mut out)
            .await
            .unwrap();
        assert!(out.memberships.is_empty());

        let broken = StaticState::default().with("TechnicalCommittee", "Members", &[], json!("0x00"));
        let err = processor
            .accumulate(&context(&raw, &broken, &retry), item, &mut Accumulation::default())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }
}
