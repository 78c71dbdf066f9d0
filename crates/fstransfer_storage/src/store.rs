use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fstransfer_contract::{
    ErrorId, NewRequestError, NewTransferRequest, RequestError, RequestId, RequestStatus,
    SchedulableStatus, TransferRequest,
};

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Inserts a fresh request in `TODO`, due at `now`.
    async fn create(&self, request: NewTransferRequest, now: DateTime<Utc>)
        -> Result<TransferRequest>;

    /// Persists every mutable field and releases any claim on the row.
    async fn update(&self, request: &TransferRequest) -> Result<()>;

    /// Removes the request together with its error records.
    async fn delete(&self, id: RequestId) -> Result<bool>;

    async fn find_by_id(&self, id: RequestId) -> Result<Option<TransferRequest>>;

    async fn list_all(&self) -> Result<Vec<TransferRequest>>;

    async fn list_by_ids(&self, ids: &[RequestId]) -> Result<Vec<TransferRequest>>;

    async fn list_by_status(&self, status: RequestStatus) -> Result<Vec<TransferRequest>>;

    async fn list_ids_by_status(&self, status: RequestStatus) -> Result<Vec<RequestId>>;

    /// Requests due at `now`, tier by tier in `priority` order, each tier by
    /// ascending execution time. `limit > 0` caps the total across tiers.
    async fn list_due(
        &self,
        priority: &[SchedulableStatus],
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TransferRequest>>;

    /// Stamps `token` on the row if it is still in the observed status and
    /// retry count and carries no live claim. Returns whether the claim won.
    async fn claim(
        &self,
        request: &TransferRequest,
        token: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool>;

    /// Operator re-arm: back to `TODO` with a zero retry count, due at `now`.
    /// `DONE` rows are left untouched.
    async fn reset(&self, id: RequestId, now: DateTime<Utc>) -> Result<Option<TransferRequest>>;

    /// Applies [`RequestStore::reset`] to every request in `ERROR`.
    async fn reset_all_errors(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait ErrorStore: Send + Sync {
    async fn create_error(&self, error: NewRequestError) -> Result<RequestError>;

    async fn delete_error(&self, id: ErrorId) -> Result<bool>;

    async fn find_error(&self, id: ErrorId) -> Result<Option<RequestError>>;

    async fn list_errors_by_request(&self, request_id: RequestId) -> Result<Vec<RequestError>>;
}
