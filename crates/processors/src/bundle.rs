//! Processor bundle trait definition.

use std::sync::Arc;

use chronicle_core::ports::{Processor, ProcessorKind};

/// One processor together with the key it is registered under.
#[derive(Clone)]
pub struct Registration {
    pub kind: ProcessorKind,
    /// Lowercase pallet name, or `"*"`.
    pub module_id: &'static str,
    /// Call, event or engine id, or `"*"`.
    pub id: &'static str,
    pub processor: Arc<dyn Processor>,
}

impl Registration {
    pub fn event(module_id: &'static str, id: &'static str, processor: Arc<dyn Processor>) -> Self {
        Self {
            kind: ProcessorKind::Event,
            module_id,
            id,
            processor,
        }
    }

    pub fn extrinsic(
        module_id: &'static str,
        id: &'static str,
        processor: Arc<dyn Processor>,
    ) -> Self {
        Self {
            kind: ProcessorKind::Extrinsic,
            module_id,
            id,
            processor,
        }
    }

    /// Keyed by `(log kind, engine)`.
    pub fn log(kind: &'static str, engine: &'static str, processor: Arc<dyn Processor>) -> Self {
        Self {
            kind: ProcessorKind::Log,
            module_id: kind,
            id: engine,
            processor,
        }
    }

    pub fn block(processor: Arc<dyn Processor>) -> Self {
        Self {
            kind: ProcessorKind::Block,
            module_id: "",
            id: "",
            processor,
        }
    }
}

/// A self-contained group of processors for one pallet family.
///
/// Bundles own no schema: every table lives in the storage crate's
/// migrations. A bundle only decides which processors run for which items.
///
/// # Example
///
/// ```ignore
/// pub struct MyBundle;
///
/// impl ProcessorBundle for MyBundle {
///     fn name(&self) -> &'static str { "my_bundle" }
///
///     fn processors(&self) -> Vec<Registration> {
///         vec![Registration::event("mypallet", "Thing", Arc::new(ThingProcessor))]
///     }
/// }
/// ```
pub trait ProcessorBundle: Send + Sync {
    /// Unique name identifying this bundle.
    fn name(&self) -> &'static str;

    /// Every processor of the bundle with its registration key.
    fn processors(&self) -> Vec<Registration>;

    /// Registration priority (higher = earlier).
    ///
    /// Processors sharing a key run in registration order, so a bundle
    /// whose output others read in sequencing should rank higher.
    fn priority(&self) -> i32 {
        0
    }
}
