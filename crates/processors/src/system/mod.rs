//! System bundle.
//!
//! Block-level bookkeeping every chain needs: consensus logs, the block
//! timestamp, account lifecycle events, per-block account counters and
//! balance snapshots.
//!
//! # Processors
//!
//! - every header digest item (`"*"`, `"*"`) - `Log` rows, slot and author
//! - `timestamp.set` - block datetime
//! - `system.NewAccount`, `balances.NewAccount` - account audits
//! - `system.KilledAccount`, `balances.ReapedAccount` - account audits
//! - block: distinct new/reaped account counters
//! - block: `System.Account` snapshots (optional)

mod accounts;
mod logs;
mod timestamp;

use std::sync::Arc;

use chronicle_core::ports::WILDCARD;

use crate::bundle::{ProcessorBundle, Registration};

pub use accounts::{AccountCounterProcessor, AccountEventProcessor, AccountInfoProcessor};
pub use logs::LogProcessor;
pub use timestamp::TimestampProcessor;

/// Processor bundle for system-level facts.
pub struct SystemBundle {
    balance_snapshots: bool,
}

impl SystemBundle {
    /// `balance_snapshots` enables the `System.Account` reads.
    pub fn new(balance_snapshots: bool) -> Self {
        Self { balance_snapshots }
    }
}

impl ProcessorBundle for SystemBundle {
    fn name(&self) -> &'static str {
        "system"
    }

    fn processors(&self) -> Vec<Registration> {
        let mut processors = vec![
            Registration::log(WILDCARD, WILDCARD, Arc::new(LogProcessor)),
            Registration::extrinsic("timestamp", "set", Arc::new(TimestampProcessor)),
            Registration::event(
                "system",
                "NewAccount",
                Arc::new(AccountEventProcessor::system_new()),
            ),
            Registration::event(
                "balances",
                "NewAccount",
                Arc::new(AccountEventProcessor::balances_new()),
            ),
            Registration::event(
                "system",
                "KilledAccount",
                Arc::new(AccountEventProcessor::system_killed()),
            ),
            Registration::event(
                "balances",
                "ReapedAccount",
                Arc::new(AccountEventProcessor::balances_reaped()),
            ),
            Registration::block(Arc::new(AccountCounterProcessor)),
        ];

        if self.balance_snapshots {
            processors.push(Registration::block(Arc::new(AccountInfoProcessor)));
        }
        processors
    }

    fn priority(&self) -> i32 {
        // Timestamps and slots feed every other bundle's sequencing.
        100
    }
}
