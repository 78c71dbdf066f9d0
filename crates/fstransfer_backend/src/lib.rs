pub mod backend;
pub mod filesystem;
pub mod memory;
pub mod registry;

pub use backend::{BackendError, StorageBackend, StoredFile};
pub use filesystem::FilesystemBackend;
pub use memory::InMemoryBackend;
pub use registry::BackendRegistry;
