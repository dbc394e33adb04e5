//! Bundle registry for managing processor bundles.

use std::cmp::Reverse;

use tracing::{debug, info};

use chronicle_core::ports::ProcessorRegistry;

use crate::bundle::ProcessorBundle;

/// Registry for managing processor bundles.
///
/// # Example
///
/// ```ignore
/// let mut registry = BundleRegistry::new();
///
/// // Order doesn't matter - priority determines registration order
/// registry.register(Box::new(SystemBundle::new(true)));
/// registry.register(Box::new(BalancesBundle));
///
/// let processors = registry.into_processor_registry();
/// ```
pub struct BundleRegistry {
    bundles: Vec<Box<dyn ProcessorBundle>>,
}

impl BundleRegistry {
    /// Create a new empty bundle registry.
    pub fn new() -> Self {
        Self {
            bundles: Vec::new(),
        }
    }

    /// Register a processor bundle.
    pub fn register(&mut self, bundle: Box<dyn ProcessorBundle>) {
        info!(bundle = bundle.name(), "📦 Registering processor bundle");
        self.bundles.push(bundle);
    }

    /// Convert this registry into a [`ProcessorRegistry`].
    ///
    /// Bundles are drained in priority order (higher first, ties in
    /// registration order), and each bundle's processors in the order it
    /// lists them. That order is the order processors sharing a key run in.
    pub fn into_processor_registry(self) -> ProcessorRegistry {
        let mut registry = ProcessorRegistry::new();

        let mut sorted = self.bundles;
        sorted.sort_by_key(|b| Reverse(b.priority()));

        for bundle in sorted {
            let registrations = bundle.processors();
            debug!(
                bundle = bundle.name(),
                processors = registrations.len(),
                "Extracting processors"
            );

            for r in registrations {
                registry.register(r.kind, r.module_id, r.id, r.processor);
            }
        }

        registry
    }

    /// Get the names of all registered bundles.
    pub fn bundle_names(&self) -> Vec<&'static str> {
        self.bundles.iter().map(|b| b.name()).collect()
    }

    /// Get the number of registered bundles.
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    /// Check if no bundles are registered.
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

impl Default for BundleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
