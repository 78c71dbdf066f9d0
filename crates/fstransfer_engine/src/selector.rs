use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use fstransfer_contract::{TransferRequest, DUE_PRIORITY};
use fstransfer_storage::RequestStore;
use tracing::debug;

/// Read-only view over the request store that yields what is due now:
/// `FAILED` first, then `TODO`, each oldest first.
#[derive(Clone)]
pub struct DueJobSelector {
    store: Arc<dyn RequestStore>,
}

impl DueJobSelector {
    pub fn new(store: Arc<dyn RequestStore>) -> Self {
        Self { store }
    }

    /// `limit <= 0` selects everything that is due.
    pub async fn select(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<TransferRequest>> {
        let due = self.store.list_due(&DUE_PRIORITY, now, limit).await?;
        debug!(count = due.len(), limit, "due transfer requests selected");
        Ok(due)
    }
}
