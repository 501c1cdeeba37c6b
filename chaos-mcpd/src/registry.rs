use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use shared::types::ServiceInfo;
use crate::error::{ChaosError, Result};

/// Named services the control plane can target.
/// Cloning shares the same underlying map.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<RwLock<HashMap<String, ServiceInfo>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service. Entries are immutable, so an existing name is rejected.
    pub fn register(&self, info: ServiceInfo) -> Result<()> {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        if services.contains_key(&info.name) {
            return Err(ChaosError::DuplicateService(info.name));
        }
        tracing::info!(
            "Registered service {} ({}:{}, process {})",
            info.name,
            info.host,
            info.port,
            info.process
        );
        services.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<ServiceInfo> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ChaosError::UnknownService(name.to_string()))
    }

    /// All services, sorted by name
    pub fn list(&self) -> Vec<ServiceInfo> {
        let mut services: Vec<ServiceInfo> = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    pub fn names(&self) -> Vec<String> {
        self.list().into_iter().map(|s| s.name).collect()
    }

    pub fn len(&self) -> usize {
        self.services.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service(name: &str) -> ServiceInfo {
        ServiceInfo {
            name: name.to_string(),
            host: "localhost".to_string(),
            port: 8080,
            process: "nginx".to_string(),
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ServiceRegistry::new();
        registry.register(test_service("web-server")).unwrap();

        let found = registry.lookup("web-server").unwrap();
        assert_eq!(found, test_service("web-server"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = ServiceRegistry::new();
        registry.register(test_service("web-server")).unwrap();

        let mut other = test_service("web-server");
        other.port = 9090;
        let err = registry.register(other).unwrap_err();
        assert_eq!(err, ChaosError::DuplicateService("web-server".to_string()));

        // Original entry is untouched
        assert_eq!(registry.lookup("web-server").unwrap().port, 8080);
    }

    #[test]
    fn test_unknown_lookup() {
        let registry = ServiceRegistry::new();
        let err = registry.lookup("cache").unwrap_err();
        assert_eq!(err.kind(), "UnknownService");
    }

    #[test]
    fn test_list_sorted_and_shared_between_clones() {
        let registry = ServiceRegistry::new();
        let clone = registry.clone();
        registry.register(test_service("web-server")).unwrap();
        clone.register(test_service("database")).unwrap();

        assert_eq!(registry.names(), vec!["database", "web-server"]);
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = ServiceRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry.register(test_service(&format!("svc-{}", i))).unwrap();
                    registry.lookup(&format!("svc-{}", i)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 8);
    }
}
