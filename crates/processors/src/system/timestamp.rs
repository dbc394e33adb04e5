use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use chronicle_core::error::{DomainError, DomainResult};
use chronicle_core::ports::{Accumulation, Item, Processor, ProcessorContext};
use chronicle_core::value::parse_u64;

use crate::utils::{extrinsic_of, param_of};

/// `timestamp.set`: the block's wall-clock time, in milliseconds.
pub struct TimestampProcessor;

impl TimestampProcessor {
    const NAME: &'static str = "timestamp.set";
}

#[async_trait]
impl Processor for TimestampProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn accumulate(
        &self,
        _ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Accumulation,
    ) -> DomainResult<()> {
        let ext = extrinsic_of(Self::NAME, &item)?;
        if !ext.success {
            return Ok(());
        }

        let millis = parse_u64(param_of(Self::NAME, ext, "now")?)
            .and_then(|ms| i64::try_from(ms).ok())
            .ok_or_else(|| DomainError::mismatch(Self::NAME, "'now' is not a millisecond timestamp"))?;
        let datetime = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| DomainError::mismatch(Self::NAME, format!("{millis} is out of range")))?;

        out.datetime = Some(datetime);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::config::RetryConfig;
    use serde_json::json;

    use crate::utils::fixtures::{StaticState, context, extrinsic, raw_block};

    #[tokio::test]
    async fn test_sets_block_datetime() {
        let ext = extrinsic(0, "timestamp", "set", None, vec![("now", json!(1_600_000_006_000u64))]);
        let raw = raw_block(5, vec![ext], vec![], vec![]);
        let chain = StaticState::default();
        let retry = RetryConfig::default();
        let ctx = context(&raw, &chain, &retry);

        let mut out = Accumulation::default();
        TimestampProcessor
            .accumulate(&ctx, Item::Extrinsic(&raw.extrinsics[0]), &mut out)
            .await
            .unwrap();

        assert_eq!(out.datetime.unwrap().timestamp(), 1_600_000_006);
    }

    #[tokio::test]
    async fn test_missing_now_is_mismatch() {
        let ext = extrinsic(0, "timestamp", "set", None, vec![]);
        let raw = raw_block(5, vec![ext], vec![], vec![]);
        let chain = StaticState::default();
        let retry = RetryConfig::default();
        let ctx = context(&raw, &chain, &retry);

        let mut out = Accumulation::default();
        let err = TimestampProcessor
            .accumulate(&ctx, Item::Extrinsic(&raw.extrinsics[0]), &mut out)
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(out.datetime.is_none());
    }
}
