//! Driver registry for managing available query-engine drivers

use std::collections::HashMap;
use std::sync::Arc;
use quarry_core::DatabaseDriver;

/// Registry of available drivers, keyed by name
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DatabaseDriver>>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Create a registry with all built-in drivers registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        #[cfg(feature = "trino")]
        {
            registry.register(Arc::new(crate::trino::TrinoDriver::new()));
            registry.register(Arc::new(crate::trino::TrinoDriver::presto()));
        }

        registry
    }

    /// Register a new driver
    pub fn register(&mut self, driver: Arc<dyn DatabaseDriver>) {
        let name = driver.name().to_string();
        tracing::debug!(driver = %name, "registering driver");
        self.drivers.insert(name, driver);
    }

    /// Get a driver by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<Arc<dyn DatabaseDriver>> {
        let driver = self.drivers.get(&name.to_ascii_lowercase()).cloned();
        if driver.is_none() {
            tracing::warn!(driver = %name, "driver not found in registry");
        }
        driver
    }

    /// List all registered driver names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Check if a driver is registered
    pub fn has(&self, name: &str) -> bool {
        self.drivers.contains_key(&name.to_ascii_lowercase())
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry() {
        let registry = DriverRegistry::new();
        assert!(registry.list().is_empty());
        assert!(registry.get("trino").is_none());
    }

    #[cfg(feature = "trino")]
    #[test]
    fn test_defaults_register_both_dialects() {
        let registry = DriverRegistry::with_defaults();
        assert_eq!(registry.list(), vec!["presto", "trino"]);
        assert!(registry.has("TRINO"));

        let presto = registry.get("presto").expect("presto registered");
        assert_eq!(presto.display_name(), "Presto");
        assert_eq!(presto.default_port(), Some(8080));
    }
}
