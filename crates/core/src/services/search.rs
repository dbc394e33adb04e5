//! Search index builder.

use std::collections::BTreeSet;

use crate::config::SearchIndexConfig;
use crate::models::{AccountId, SearchIndex, SearchIndexType};
use crate::ports::Item;

/// Entry for `account` pointing at `item` of block `block_number`.
///
/// Items without an amount sort by their position in the block.
pub fn entry_for(
    block_number: u64,
    item: &Item<'_>,
    account: AccountId,
    index_type: SearchIndexType,
    sorting_value: Option<u128>,
) -> SearchIndex {
    let (extrinsic_idx, event_idx) = item.coordinates();
    let position = event_idx.or(extrinsic_idx).unwrap_or(0);
    SearchIndex {
        block_number,
        extrinsic_idx,
        event_idx,
        account_id: account,
        index_type,
        sorting_value: sorting_value.or(Some(u128::from(position))),
    }
}

/// Applies the configured allow-list to emitted entries.
#[derive(Debug, Clone, Default)]
pub struct SearchIndexBuilder {
    config: SearchIndexConfig,
}

impl SearchIndexBuilder {
    pub fn new(config: SearchIndexConfig) -> Self {
        Self { config }
    }

    /// Keep allowed entries, dropping exact duplicates.
    pub fn finish(&self, entries: Vec<SearchIndex>) -> Vec<SearchIndex> {
        let mut out: Vec<SearchIndex> = Vec::with_capacity(entries.len());
        for entry in entries {
            if self.config.allows(entry.index_type) && !out.contains(&entry) {
                out.push(entry);
            }
        }
        out
    }
}

/// Distinct accounts referenced by a block's entries.
pub fn referenced_accounts(entries: &[SearchIndex]) -> Vec<AccountId> {
    entries
        .iter()
        .map(|e| e.account_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventPhase;
    use crate::ports::{RawEvent, RawExtrinsic};

    fn entry(byte: u8, ty: SearchIndexType) -> SearchIndex {
        SearchIndex {
            block_number: 100,
            extrinsic_idx: Some(1),
            event_idx: Some(2),
            account_id: AccountId([byte; 32]),
            index_type: ty,
            sorting_value: Some(500),
        }
    }

    #[test]
    fn test_allow_list_and_dedup() {
        let builder = SearchIndexBuilder::new(SearchIndexConfig::only([
            SearchIndexType::BalanceTransfer,
        ]));
        let out = builder.finish(vec![
            entry(1, SearchIndexType::BalanceTransfer),
            entry(1, SearchIndexType::BalanceTransfer),
            entry(2, SearchIndexType::BalanceTransfer),
            entry(2, SearchIndexType::Slashed),
        ]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.index_type == SearchIndexType::BalanceTransfer));
    }

    // Test critique: sans montant, la position dans le bloc sert de tri
    #[test]
    fn test_sorting_value_falls_back_to_item_position() {
        let ext = RawExtrinsic {
            index: 3,
            module_id: "staking".into(),
            call_id: "chill".into(),
            params: vec![],
            signer: Some(AccountId([1; 32])),
            success: true,
        };
        let event = RawEvent {
            index: 7,
            phase: EventPhase::ApplyExtrinsic(3),
            module_id: "staking".into(),
            event_id: "Chilled".into(),
            attributes: vec![],
        };

        let account = AccountId([1; 32]);
        let call = entry_for(5, &Item::Extrinsic(&ext), account.clone(), SearchIndexType::StakingChill, None);
        assert_eq!(call.sorting_value, Some(3));

        let emitted = Item::Event {
            event: &event,
            extrinsic: Some(&ext),
        };
        let entry = entry_for(5, &emitted, account.clone(), SearchIndexType::StakingChill, None);
        assert_eq!(entry.sorting_value, Some(7));

        let valued = entry_for(5, &emitted, account, SearchIndexType::Slashed, Some(900));
        assert_eq!(valued.sorting_value, Some(900));
    }

    #[test]
    fn test_referenced_accounts_distinct() {
        let accounts = referenced_accounts(&[
            entry(2, SearchIndexType::BalanceTransfer),
            entry(1, SearchIndexType::BalanceTransfer),
            entry(2, SearchIndexType::Slashed),
        ]);
        assert_eq!(accounts, vec![AccountId([1; 32]), AccountId([2; 32])]);
    }
}
