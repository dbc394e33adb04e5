//! Table-driven search processors.
//!
//! Most pallet items only feed the search index: an account taken from an
//! event attribute or call parameter, a type, and an optional amount. These
//! two processors cover that shape so bundles only declare tables.

use async_trait::async_trait;

use chronicle_core::error::{DomainError, DomainResult};
use chronicle_core::models::{AccountId, SearchIndex, SearchIndexType};
use chronicle_core::ports::{Accumulation, Item, Processor, ProcessorContext, RawExtrinsic};
use chronicle_core::value::{parse_account, parse_accounts, parse_amount};

use crate::utils::{attr_account, attr_amount, event_of, extrinsic_of, param_of, push_entry, require_attrs, signer_of};

// =============================================================================
// Events
// =============================================================================

struct AttrEntry {
    account: usize,
    index_type: SearchIndexType,
    amount: Option<usize>,
}

/// Search entries taken from event attributes.
pub struct EventSearch {
    name: &'static str,
    accepted: &'static [usize],
    entries: Vec<AttrEntry>,
}

impl EventSearch {
    /// `accepted` lists the attribute counts the event is known to carry.
    pub fn new(name: &'static str, accepted: &'static [usize]) -> Self {
        Self {
            name,
            accepted,
            entries: Vec::new(),
        }
    }

    pub fn account(mut self, position: usize, index_type: SearchIndexType) -> Self {
        self.entries.push(AttrEntry {
            account: position,
            index_type,
            amount: None,
        });
        self
    }

    pub fn account_with_amount(
        mut self,
        position: usize,
        index_type: SearchIndexType,
        amount: usize,
    ) -> Self {
        self.entries.push(AttrEntry {
            account: position,
            index_type,
            amount: Some(amount),
        });
        self
    }
}

#[async_trait]
impl Processor for EventSearch {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn accumulate(
        &self,
        _ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        _out: &mut Accumulation,
    ) -> DomainResult<()> {
        let event = event_of(self.name, &item)?;
        require_attrs(self.name, event, self.accepted)
    }

    fn search_index(
        &self,
        ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Vec<SearchIndex>,
    ) -> DomainResult<()> {
        let event = event_of(self.name, &item)?;
        for entry in &self.entries {
            let account = attr_account(self.name, event, entry.account)?;
            let amount = entry
                .amount
                .map(|position| attr_amount(self.name, event, position))
                .transpose()?;
            push_entry(out, ctx.raw.number, &item, account, entry.index_type, amount);
        }
        Ok(())
    }
}

// =============================================================================
// Calls
// =============================================================================

/// Where a call search entry finds its account(s).
#[derive(Debug, Clone, Copy)]
pub enum CallAccount {
    Signer,
    /// A parameter holding one account.
    Param(&'static str),
    /// A parameter holding a list of accounts.
    ParamList(&'static str),
}

/// Search entries for a successful call.
pub struct CallSearch {
    name: &'static str,
    index_type: SearchIndexType,
    accounts: Vec<CallAccount>,
    /// Parameter name followed by nested keys.
    amount: Option<&'static [&'static str]>,
}

impl CallSearch {
    /// Entry for the signer only.
    pub fn new(name: &'static str, index_type: SearchIndexType) -> Self {
        Self {
            name,
            index_type,
            accounts: vec![CallAccount::Signer],
            amount: None,
        }
    }

    pub fn also(mut self, account: CallAccount) -> Self {
        self.accounts.push(account);
        self
    }

    pub fn amount(mut self, path: &'static [&'static str]) -> Self {
        self.amount = Some(path);
        self
    }

    fn resolve(&self, ext: &RawExtrinsic, account: CallAccount) -> DomainResult<Vec<AccountId>> {
        match account {
            CallAccount::Signer => Ok(vec![signer_of(self.name, ext)?]),
            CallAccount::Param(name) => parse_account(param_of(self.name, ext, name)?)
                .map(|id| vec![id])
                .ok_or_else(|| {
                    DomainError::mismatch(self.name, format!("parameter '{name}' is not an account"))
                }),
            CallAccount::ParamList(name) => parse_accounts(param_of(self.name, ext, name)?)
                .ok_or_else(|| {
                    DomainError::mismatch(self.name, format!("parameter '{name}' is not an account list"))
                }),
        }
    }

    fn sorting_value(&self, ext: &RawExtrinsic) -> Option<u128> {
        let (param, keys) = self.amount?.split_first()?;
        let mut value = ext.param(param)?;
        for key in keys {
            value = value.get(*key)?;
        }
        parse_amount(value)
    }
}

#[async_trait]
impl Processor for CallSearch {
    fn name(&self) -> &'static str {
        self.name
    }

    fn search_index(
        &self,
        ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Vec<SearchIndex>,
    ) -> DomainResult<()> {
        let ext = extrinsic_of(self.name, &item)?;
        if !ext.success {
            return Ok(());
        }

        let amount = self.sorting_value(ext);
        for source in &self.accounts {
            for account in self.resolve(ext, *source)? {
                push_entry(out, ctx.raw.number, &item, account, self.index_type, amount);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::config::RetryConfig;
    use serde_json::json;

    use crate::utils::fixtures::{StaticState, account, context, event, extrinsic, hex_account, raw_block};

    #[test]
    fn test_event_entries_with_amount() {
        let raw = raw_block(
            100,
            vec![],
            vec![event(
                2,
                Some(1),
                "balances",
                "Transfer",
                vec![hex_account(1), hex_account(2), json!(500)],
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

        let processor = EventSearch::new("balances.Transfer", &[3])
            .account_with_amount(0, SearchIndexType::BalanceTransfer, 2)
            .account_with_amount(1, SearchIndexType::BalanceTransfer, 2);

        let mut out = Vec::new();
        processor.search_index(&ctx, item, &mut out).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].account_id, account(1));
        assert_eq!(out[1].account_id, account(2));
        assert!(out.iter().all(|e| e.sorting_value == Some(500)));
        assert!(out.iter().all(|e| e.extrinsic_idx == Some(1) && e.event_idx == Some(2)));
    }

    #[test]
    fn test_call_entries_follow_nested_amount() {
        let ext = extrinsic(
            1,
            "democracy",
            "vote",
            Some(4),
            vec![
                ("ref_index", json!(0)),
                ("vote", json!({"Standard": {"vote": 128, "balance": "0x64"}})),
            ],
        );
        let raw = raw_block(10, vec![ext], vec![], vec![]);
        let chain = StaticState::default();
        let retry = RetryConfig::default();
        let ctx = context(&raw, &chain, &retry);

        let processor = CallSearch::new("democracy.vote", SearchIndexType::DemocracyVote)
            .amount(&["vote", "Standard", "balance"]);

        let mut out = Vec::new();
        processor
            .search_index(&ctx, Item::Extrinsic(&raw.extrinsics[0]), &mut out)
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].account_id, account(4));
        assert_eq!(out[0].sorting_value, Some(100));
        assert_eq!(out[0].event_idx, None);
    }

    #[test]
    fn test_failed_call_is_not_indexed() {
        let mut ext = extrinsic(0, "staking", "chill", Some(4), vec![]);
        ext.success = false;
        let raw = raw_block(10, vec![ext], vec![], vec![]);
        let chain = StaticState::default();
        let retry = RetryConfig::default();
        let ctx = context(&raw, &chain, &retry);

        let mut out = Vec::new();
        CallSearch::new("staking.chill", SearchIndexType::StakingChill)
            .search_index(&ctx, Item::Extrinsic(&raw.extrinsics[0]), &mut out)
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_param_list_accounts() {
        let ext = extrinsic(
            0,
            "electionsphragmen",
            "vote",
            Some(4),
            vec![
                ("votes", json!([hex_account(5), hex_account(6)])),
                ("value", json!(70)),
            ],
        );
        let raw = raw_block(10, vec![ext], vec![], vec![]);
        let chain = StaticState::default();
        let retry = RetryConfig::default();
        let ctx = context(&raw, &chain, &retry);

        let mut out = Vec::new();
        CallSearch::new("electionsphragmen.vote", SearchIndexType::CouncilCandidateVoted)
            .also(CallAccount::ParamList("votes"))
            .amount(&["value"])
            .search_index(&ctx, Item::Extrinsic(&raw.extrinsics[0]), &mut out)
            .unwrap();

        let accounts: Vec<_> = out.iter().map(|e| e.account_id.clone()).collect();
        assert_eq!(accounts, vec![account(4), account(5), account(6)]);
        assert!(out.iter().all(|e| e.sorting_value == Some(70)));
    }
}
