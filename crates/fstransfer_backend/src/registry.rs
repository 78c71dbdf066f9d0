use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::backend::{BackendError, StorageBackend};

/// Storage providers by name, handed to the executor at construction.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn StorageBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: Arc<dyn StorageBackend>) -> &mut Self {
        self.backends.insert(backend.name().to_string(), backend);
        self
    }

    pub fn with(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn StorageBackend>, BackendError> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::UnknownProvider(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("providers", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::BackendRegistry;
    use crate::backend::BackendError;
    use crate::memory::InMemoryBackend;

    #[test]
    fn resolves_registered_providers_by_name() {
        let registry = BackendRegistry::new()
            .with(Arc::new(InMemoryBackend::new("local")))
            .with(Arc::new(InMemoryBackend::new("archive")));

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["archive", "local"]);
        assert_eq!(registry.resolve("local").expect("local").name(), "local");
        assert!(matches!(
            registry.resolve("s3"),
            Err(BackendError::UnknownProvider(name)) if name == "s3"
        ));
    }
}
