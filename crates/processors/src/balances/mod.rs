//! Balances pallet bundle.
//!
//! Token movements are indexed for search only; balances themselves are
//! read from chain state by the system bundle's snapshots.
//!
//! # Indexed Events
//!
//! - `Balances::Transfer` - both parties, sorted by amount
//! - `Balances::Deposit` - the credited account, sorted by amount
//!
//! # Usage
//!
//! ```ignore
//! use chronicle_processors::BalancesBundle;
//!
//! registry.register(Box::new(BalancesBundle));
//! ```

use std::sync::Arc;

use chronicle_core::models::SearchIndexType;

use crate::bundle::{ProcessorBundle, Registration};
use crate::search::EventSearch;

/// Processor bundle for the Balances pallet.
pub struct BalancesBundle;

impl ProcessorBundle for BalancesBundle {
    fn name(&self) -> &'static str {
        "balances"
    }

    fn processors(&self) -> Vec<Registration> {
        // Early runtimes append the transfer fee as a fourth attribute.
        let transfer = EventSearch::new("balances.Transfer", &[3, 4])
            .account_with_amount(0, SearchIndexType::BalanceTransfer, 2)
            .account_with_amount(1, SearchIndexType::BalanceTransfer, 2);
        let deposit = EventSearch::new("balances.Deposit", &[2])
            .account_with_amount(0, SearchIndexType::BalancesDeposit, 1);

        vec![
            Registration::event("balances", "Transfer", Arc::new(transfer)),
            Registration::event("balances", "Deposit", Arc::new(deposit)),
        ]
    }
}
