use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::backend::{BackendError, StorageBackend, StoredFile};

#[derive(Debug)]
pub struct InMemoryBackend {
    name: String,
    files: RwLock<HashMap<String, StoredFile>>,
}

impl InMemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, key: impl Into<String>, file: StoredFile) {
        self.files.write().await.insert(key.into(), file);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.files.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, key: &str) -> Result<Option<StoredFile>, BackendError> {
        Ok(self.files.read().await.get(key).cloned())
    }

    async fn store(&self, file: StoredFile) -> Result<String, BackendError> {
        let key = Uuid::now_v7().to_string();
        self.files.write().await.insert(key.clone(), file);
        Ok(key)
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.files.write().await.remove(key);
        Ok(())
    }
}
