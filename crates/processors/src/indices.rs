//! Indices pallet bundle: account index assignment and release.

use std::sync::Arc;

use async_trait::async_trait;

use chronicle_core::error::DomainResult;
use chronicle_core::models::{AccountIndexAction, AuditRecord};
use chronicle_core::ports::{Accumulation, Item, Processor, ProcessorContext};

use crate::bundle::{ProcessorBundle, Registration};
use crate::utils::{attr_account, attr_u64, event_of, require_attrs};

/// `NewAccountIndex` / `IndexAssigned` carry `(account, index)`,
/// `IndexFreed` carries `(index)`.
pub struct IndexEventProcessor {
    name: &'static str,
    action: AccountIndexAction,
}

impl IndexEventProcessor {
    pub fn new(name: &'static str, action: AccountIndexAction) -> Self {
        Self { name, action }
    }
}

#[async_trait]
impl Processor for IndexEventProcessor {
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

        let (index_id, account_id) = match self.action {
            AccountIndexAction::New => {
                require_attrs(self.name, event, &[2])?;
                (
                    attr_u64(self.name, event, 1)?,
                    Some(attr_account(self.name, event, 0)?),
                )
            }
            AccountIndexAction::Reaped => {
                require_attrs(self.name, event, &[1])?;
                (attr_u64(self.name, event, 0)?, None)
            }
        };

        out.audits.push(AuditRecord::AccountIndex {
            event_idx: event.index,
            extrinsic_idx: event.extrinsic_index(),
            index_id: Some(index_id),
            account_id,
            action: self.action,
        });
        Ok(())
    }
}

pub struct IndicesBundle;

impl ProcessorBundle for IndicesBundle {
    fn name(&self) -> &'static str {
        "indices"
    }

    fn processors(&self) -> Vec<Registration> {
        vec![
            Registration::event(
                "indices",
                "NewAccountIndex",
                Arc::new(IndexEventProcessor::new(
                    "indices.NewAccountIndex",
                    AccountIndexAction::New,
                )),
            ),
            Registration::event(
                "indices",
                "IndexAssigned",
                Arc::new(IndexEventProcessor::new(
                    "indices.IndexAssigned",
                    AccountIndexAction::New,
                )),
            ),
            Registration::event(
                "indices",
                "IndexFreed",
                Arc::new(IndexEventProcessor::new(
                    "indices.IndexFreed",
                    AccountIndexAction::Reaped,
                )),
            ),
        ]
    }
}
