use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub title: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl StoredFile {
    pub fn new(title: impl Into<String>, mime_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            title: title.into(),
            mime_type: mime_type.into(),
            content,
        }
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("storage provider {0} is not registered")]
    UnknownProvider(String),
    /// Structured failure reported by the provider, optionally with a
    /// response code.
    #[error("{message}")]
    Service { code: Option<i32>, message: String },
    #[error("storage io failure: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn service(code: i32, message: impl Into<String>) -> Self {
        BackendError::Service {
            code: Some(code),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when no file is stored under `key`.
    async fn fetch(&self, key: &str) -> Result<Option<StoredFile>, BackendError>;

    /// Stores `file` and returns the key the provider assigned to it.
    async fn store(&self, file: StoredFile) -> Result<String, BackendError>;

    async fn delete(&self, key: &str) -> Result<(), BackendError>;
}
