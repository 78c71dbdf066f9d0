use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::backend::{BackendError, StorageBackend, StoredFile};

const META_SUFFIX: &str = ".meta.json";

#[derive(Debug, Serialize, Deserialize)]
struct FileMeta {
    title: String,
    mime_type: String,
}

/// Keeps each file as `<root>/<key>` with a JSON sidecar holding its title
/// and media type.
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    name: String,
    root: PathBuf,
}

impl FilesystemBackend {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, BackendError> {
        let relative = Path::new(key);
        let plain = !key.is_empty()
            && !key.ends_with(META_SUFFIX)
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !plain {
            return Err(BackendError::service(400, format!("invalid file key: {key}")));
        }
        Ok(self.root.join(relative))
    }

    fn meta_path(path: &Path) -> PathBuf {
        let mut raw = path.as_os_str().to_owned();
        raw.push(META_SUFFIX);
        PathBuf::from(raw)
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, key: &str) -> Result<Option<StoredFile>, BackendError> {
        let path = self.resolve(key)?;
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let meta = match tokio::fs::read(Self::meta_path(&path)).await {
            Ok(raw) => serde_json::from_slice::<FileMeta>(&raw).map_err(|err| {
                BackendError::service(500, format!("corrupt metadata for {key}: {err}"))
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => FileMeta {
                title: key.to_string(),
                mime_type: "application/octet-stream".to_string(),
            },
            Err(err) => return Err(err.into()),
        };

        Ok(Some(StoredFile {
            title: meta.title,
            mime_type: meta.mime_type,
            content,
        }))
    }

    async fn store(&self, file: StoredFile) -> Result<String, BackendError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let key = Uuid::now_v7().to_string();
        let path = self.resolve(&key)?;
        let meta = serde_json::to_vec(&FileMeta {
            title: file.title,
            mime_type: file.mime_type,
        })
        .map_err(|err| BackendError::service(500, format!("encode metadata: {err}")))?;

        tokio::fs::write(&path, &file.content).await?;
        tokio::fs::write(Self::meta_path(&path), meta).await?;
        debug!(provider = %self.name, key = %key, bytes = file.content.len(), "file stored");
        Ok(key)
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let path = self.resolve(key)?;
        for target in [Self::meta_path(&path), path] {
            match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::FilesystemBackend;
    use crate::backend::{BackendError, StorageBackend, StoredFile};

    #[tokio::test]
    async fn stores_fetches_and_deletes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FilesystemBackend::new("disk", dir.path().join("files"));
        let file = StoredFile::new("report.pdf", "application/pdf", vec![1, 2, 3]);

        let key = backend.store(file.clone()).await.expect("store");
        assert_eq!(backend.fetch(&key).await.expect("fetch"), Some(file));

        backend.delete(&key).await.expect("delete");
        assert_eq!(backend.fetch(&key).await.expect("fetch"), None);
        backend.delete(&key).await.expect("delete missing is a no-op");
    }

    #[tokio::test]
    async fn missing_sidecar_falls_back_to_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("legacy"), b"data").expect("seed");
        let backend = FilesystemBackend::new("disk", dir.path());

        let file = backend
            .fetch("legacy")
            .await
            .expect("fetch")
            .expect("present");
        assert_eq!(file.title, "legacy");
        assert_eq!(file.content, b"data".to_vec());
    }

    #[tokio::test]
    async fn rejects_keys_escaping_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FilesystemBackend::new("disk", dir.path());

        for key in ["../etc/passwd", "/abs", "", "x.meta.json"] {
            match backend.fetch(key).await {
                Err(BackendError::Service { code: Some(400), .. }) => {}
                other => panic!("unexpected result for {key:?}: {other:?}"),
            }
        }
    }
}
