//! Registry mapping block item keys to processors.

use std::collections::HashMap;
use std::sync::Arc;

use super::processor::Processor;

/// Matches any module or any call/event id.
pub const WILDCARD: &str = "*";

/// What a processor is registered against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessorKind {
    Extrinsic,
    Event,
    /// Keyed by `(log kind, engine)`.
    Log,
    /// Runs once per block, after all items.
    Block,
}

type Key = (ProcessorKind, String, String);

/// Ordered processor lookup.
///
/// [`ProcessorRegistry::lookup`] returns, in this order:
///
/// 1. processors registered for the exact `(module, id)`
/// 2. processors registered for `(module, "*")`
/// 3. processors registered for `("*", "*")`
///
/// Within each group, registration order is kept. Module ids are matched
/// case-insensitively; call and event ids are matched exactly.
#[derive(Default)]
pub struct ProcessorRegistry {
    items: HashMap<Key, Vec<Arc<dyn Processor>>>,
    block: Vec<Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor.
    ///
    /// For [`ProcessorKind::Block`] the module and id are ignored.
    pub fn register(
        &mut self,
        kind: ProcessorKind,
        module_id: &str,
        id: &str,
        processor: Arc<dyn Processor>,
    ) {
        if kind == ProcessorKind::Block {
            self.block.push(processor);
            return;
        }
        self.items
            .entry((kind, module_id.to_lowercase(), id.to_string()))
            .or_default()
            .push(processor);
    }

    /// Processors for an item, in documented order.
    pub fn lookup(&self, kind: ProcessorKind, module_id: &str, id: &str) -> Vec<Arc<dyn Processor>> {
        if kind == ProcessorKind::Block {
            return self.block.clone();
        }

        let module = module_id.to_lowercase();
        let mut keys: Vec<Key> = vec![(kind, module.clone(), id.to_string())];
        if id != WILDCARD {
            keys.push((kind, module.clone(), WILDCARD.to_string()));
        }
        if module != WILDCARD {
            keys.push((kind, WILDCARD.to_string(), WILDCARD.to_string()));
        }

        keys.iter()
            .filter_map(|key| self.items.get(key))
            .flatten()
            .cloned()
            .collect()
    }

    /// Block processors in registration order.
    pub fn block_processors(&self) -> &[Arc<dyn Processor>] {
        &self.block
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.items.values().map(Vec::len).sum::<usize>() + self.block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drop repeated processors, keeping first occurrences.
pub fn dedup_processors(processors: Vec<Arc<dyn Processor>>) -> Vec<Arc<dyn Processor>> {
    let mut seen: Vec<*const ()> = Vec::new();
    processors
        .into_iter()
        .filter(|p| {
            let ptr = Arc::as_ptr(p) as *const ();
            if seen.contains(&ptr) {
                false
            } else {
                seen.push(ptr);
                true
            }
        })
        .collect()
}
