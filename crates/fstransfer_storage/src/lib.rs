mod repository;
mod store;

pub use repository::{FsTransferStorage, StorageConfig};
pub use store::{ErrorStore, RequestStore};
