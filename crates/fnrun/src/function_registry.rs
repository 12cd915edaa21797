//! In-process function definitions keyed by stable key.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::traits::FunctionResolver;
use crate::types::FunctionDefinition;

/// Thread-safe map of function definitions. Cloning shares the map.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: Arc<RwLock<BTreeMap<String, FunctionDefinition>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, replacing any previous one with the same key.
    pub fn register(&self, definition: FunctionDefinition) {
        let key = definition.key.clone();
        if self.functions.write().insert(key.clone(), definition).is_some() {
            tracing::debug!(%key, "replaced function definition");
        }
    }

    pub fn unregister(&self, key: &str) -> bool {
        self.functions.write().remove(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.functions.read().keys().cloned().collect()
    }

    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        self.functions.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }
}

impl FunctionResolver for FunctionRegistry {
    fn resolve(&self, key: &str) -> Option<FunctionDefinition> {
        self.functions.read().get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::executor::handler_fn;

    #[test]
    fn test_resolve_by_key() {
        let registry = FunctionRegistry::new();
        registry.register(FunctionDefinition::new(
            "example.org/function/a",
            "a",
            handler_fn(|_| Ok(json!("a"))),
        ));
        registry.register(
            FunctionDefinition::new("example.org/function/a", "a2", handler_fn(Ok))
                .with_description("replacement"),
        );

        assert_eq!(registry.len(), 1);
        let resolved = registry.resolve("example.org/function/a").expect("resolved");
        assert_eq!(resolved.name, "a2");
        assert!(registry.resolve("example.org/function/missing").is_none());

        assert!(registry.unregister("example.org/function/a"));
        assert!(registry.is_empty());
    }
}
