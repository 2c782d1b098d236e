pub mod rsi_reversion;
pub mod sma_cross;

use std::sync::Arc;

use crate::engine::context::StrategyFactory;
use crate::registry::RuntimeCatalog;

/// Every built-in strategy factory.
pub fn all_factories() -> Vec<Arc<dyn StrategyFactory>> {
    vec![
        Arc::new(sma_cross::SmaCrossFactory),
        Arc::new(rsi_reversion::RsiReversionFactory),
    ]
}

/// A runtime catalog pre-loaded with the built-in strategies.
pub fn default_catalog() -> RuntimeCatalog {
    let mut catalog = RuntimeCatalog::new();
    for factory in all_factories() {
        catalog.register(factory);
    }
    catalog
}

pub fn find_factory(id: &str) -> Option<Arc<dyn StrategyFactory>> {
    all_factories().into_iter().find(|f| f.id() == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_contains_builtins() {
        let catalog = default_catalog();
        assert!(catalog.contains("sma-cross"));
        assert!(catalog.contains("rsi-reversion"));
        assert_eq!(catalog.ids().len(), 2);
    }

    #[test]
    fn factory_ids_are_unique() {
        let mut ids: Vec<String> = all_factories().iter().map(|f| f.id().to_string()).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn find_factory_known_and_unknown() {
        assert!(find_factory("sma-cross").is_some());
        assert!(find_factory("does-not-exist").is_none());
    }
}
