use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fstransfer_contract::{
    validate_new_file_key, ErrorId, NewRequestError, NewTransferRequest, RequestError, RequestId,
    RequestStatus, SchedulableStatus, TransferRequest,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::store::{ErrorStore, RequestStore};

const SCHEMA_SQL: &str = include_str!("sql/schema.sql");

const SELECT_REQUESTS: &str = "SELECT id_request, old_file_key, source_provider_name, new_file_key, target_provider_name, request_status, retry_count, execution_time, creation_time, request_context, contact_mail FROM transfer_requests";

const SELECT_ERRORS: &str =
    "SELECT id_error, id_request, code, error_message, error_trace, execution_time FROM request_errors";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub sqlite_path: String,
}

#[derive(Debug, Clone)]
pub struct FsTransferStorage {
    pool: SqlitePool,
}

#[derive(Debug, FromRow)]
struct RequestRow {
    id_request: i64,
    old_file_key: String,
    source_provider_name: String,
    new_file_key: String,
    target_provider_name: String,
    request_status: String,
    retry_count: i64,
    execution_time: i64,
    creation_time: i64,
    request_context: String,
    contact_mail: Option<String>,
}

impl TryFrom<RequestRow> for TransferRequest {
    type Error = anyhow::Error;

    fn try_from(row: RequestRow) -> Result<Self> {
        Ok(TransferRequest {
            id: row.id_request,
            old_file_key: row.old_file_key,
            source_provider_name: row.source_provider_name,
            target_provider_name: row.target_provider_name,
            new_file_key: row.new_file_key,
            status: RequestStatus::from_stored(&row.request_status),
            retry_count: u32::try_from(row.retry_count)
                .with_context(|| format!("retry_count out of range for request {}", row.id_request))?,
            execution_time: from_millis(row.execution_time)?,
            creation_time: from_millis(row.creation_time)?,
            request_context: row.request_context,
            contact_mail: row.contact_mail,
        })
    }
}

#[derive(Debug, FromRow)]
struct ErrorRow {
    id_error: i64,
    id_request: i64,
    code: i64,
    error_message: String,
    error_trace: String,
    execution_time: i64,
}

impl TryFrom<ErrorRow> for RequestError {
    type Error = anyhow::Error;

    fn try_from(row: ErrorRow) -> Result<Self> {
        Ok(RequestError {
            id: row.id_error,
            request_id: row.id_request,
            code: i32::try_from(row.code)
                .with_context(|| format!("code out of range for error {}", row.id_error))?,
            error_message: row.error_message,
            error_trace: row.error_trace,
            execution_time: from_millis(row.execution_time)?,
        })
    }
}

impl FsTransferStorage {
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let uri = normalize_sqlite_uri(&config.sqlite_path);
        let options = SqliteConnectOptions::from_str(&uri)
            .with_context(|| format!("invalid sqlite URI: {}", uri))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect sqlite pool")?;

        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    /// A private database living on a single pinned connection.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("invalid in-memory sqlite URI")?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("failed to open in-memory sqlite pool")?;

        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA_SQL.split(';') {
            let sql = statement.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("migration failed for statement: {sql}"))?;
        }
        info!("fstransfer sqlite schema ready");
        Ok(())
    }

    async fn fetch_requests(&self, sql: &str, label: &str) -> Result<Vec<TransferRequest>> {
        let rows = sqlx::query_as::<_, RequestRow>(sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("query {label}"))?;
        rows.into_iter().map(TransferRequest::try_from).collect()
    }
}

#[async_trait]
impl RequestStore for FsTransferStorage {
    async fn create(
        &self,
        request: NewTransferRequest,
        now: DateTime<Utc>,
    ) -> Result<TransferRequest> {
        request.validate().context("invalid transfer request")?;
        let now_ms = to_millis(now);

        let result = sqlx::query(
            "INSERT INTO transfer_requests(old_file_key, source_provider_name, new_file_key, target_provider_name, request_status, retry_count, execution_time, creation_time, request_context, contact_mail) VALUES (?, ?, '', ?, ?, 0, ?, ?, ?, ?)",
        )
        .bind(&request.old_file_key)
        .bind(&request.source_provider_name)
        .bind(&request.target_provider_name)
        .bind(RequestStatus::Todo.as_str())
        .bind(now_ms)
        .bind(now_ms)
        .bind(&request.request_context)
        .bind(&request.contact_mail)
        .execute(&self.pool)
        .await
        .context("insert transfer request")?;

        let id = result.last_insert_rowid();
        self.find_by_id(id)
            .await?
            .context("transfer request missing after insert")
    }

    async fn update(&self, request: &TransferRequest) -> Result<()> {
        validate_new_file_key(&request.new_file_key)
            .with_context(|| format!("invalid new_file_key for request {}", request.id))?;

        sqlx::query(
            "UPDATE transfer_requests SET old_file_key = ?, source_provider_name = ?, new_file_key = ?, target_provider_name = ?, request_status = ?, retry_count = ?, execution_time = ?, request_context = ?, contact_mail = ?, claim_token = NULL, claimed_at = NULL WHERE id_request = ?",
        )
        .bind(&request.old_file_key)
        .bind(&request.source_provider_name)
        .bind(&request.new_file_key)
        .bind(&request.target_provider_name)
        .bind(request.status.as_str())
        .bind(i64::from(request.retry_count))
        .bind(to_millis(request.execution_time))
        .bind(&request.request_context)
        .bind(&request.contact_mail)
        .bind(request.id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("update transfer request {}", request.id))?;

        Ok(())
    }

    async fn delete(&self, id: RequestId) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("begin delete transaction")?;

        sqlx::query("DELETE FROM request_errors WHERE id_request = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("delete errors of request {id}"))?;

        let result = sqlx::query("DELETE FROM transfer_requests WHERE id_request = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("delete transfer request {id}"))?;

        tx.commit().await.context("commit delete transaction")?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, id: RequestId) -> Result<Option<TransferRequest>> {
        let row = sqlx::query_as::<_, RequestRow>(&format!("{SELECT_REQUESTS} WHERE id_request = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("query transfer request {id}"))?;

        row.map(TransferRequest::try_from).transpose()
    }

    async fn list_all(&self) -> Result<Vec<TransferRequest>> {
        self.fetch_requests(
            &format!("{SELECT_REQUESTS} ORDER BY id_request ASC"),
            "transfer requests",
        )
        .await
    }

    async fn list_by_ids(&self, ids: &[RequestId]) -> Result<Vec<TransferRequest>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!("{SELECT_REQUESTS} WHERE id_request IN ("));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id_request ASC");

        let rows = builder
            .build_query_as::<RequestRow>()
            .fetch_all(&self.pool)
            .await
            .context("query transfer requests by ids")?;
        rows.into_iter().map(TransferRequest::try_from).collect()
    }

    async fn list_by_status(&self, status: RequestStatus) -> Result<Vec<TransferRequest>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!("{SELECT_REQUESTS} WHERE "));
        push_status_filter(&mut builder, status);
        builder.push(" ORDER BY id_request ASC");

        let rows = builder
            .build_query_as::<RequestRow>()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("query transfer requests in {status}"))?;

        rows.into_iter().map(TransferRequest::try_from).collect()
    }

    async fn list_ids_by_status(&self, status: RequestStatus) -> Result<Vec<RequestId>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT id_request FROM transfer_requests WHERE ");
        push_status_filter(&mut builder, status);
        builder.push(" ORDER BY id_request ASC");

        builder
            .build_query_scalar::<i64>()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("query transfer request ids in {status}"))
    }

    async fn list_due(
        &self,
        priority: &[SchedulableStatus],
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TransferRequest>> {
        let now_ms = to_millis(now);
        let mut due = Vec::new();

        for status in priority {
            // SQLite treats a negative LIMIT as no limit.
            let remaining = if limit > 0 {
                limit - due.len() as i64
            } else {
                -1
            };
            if remaining == 0 {
                break;
            }

            let rows = sqlx::query_as::<_, RequestRow>(&format!(
                "{SELECT_REQUESTS} WHERE request_status = ? AND execution_time <= ? ORDER BY execution_time ASC, id_request ASC LIMIT ?"
            ))
            .bind(status.as_str())
            .bind(now_ms)
            .bind(remaining)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("query due transfer requests in {}", status.as_str()))?;

            for row in rows {
                due.push(TransferRequest::try_from(row)?);
            }
        }

        Ok(due)
    }

    async fn claim(
        &self,
        request: &TransferRequest,
        token: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        let now_ms = to_millis(now);
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let stale_before = now_ms.saturating_sub(ttl_ms);

        let result = sqlx::query(
            "UPDATE transfer_requests SET claim_token = ?, claimed_at = ? WHERE id_request = ? AND request_status = ? AND retry_count = ? AND (claim_token IS NULL OR claimed_at < ?)",
        )
        .bind(token)
        .bind(now_ms)
        .bind(request.id)
        .bind(request.status.as_str())
        .bind(i64::from(request.retry_count))
        .bind(stale_before)
        .execute(&self.pool)
        .await
        .with_context(|| format!("claim transfer request {}", request.id))?;

        let claimed = result.rows_affected() > 0;
        if !claimed {
            debug!(request_id = request.id, "claim lost: request changed or already claimed");
        }
        Ok(claimed)
    }

    async fn reset(&self, id: RequestId, now: DateTime<Utc>) -> Result<Option<TransferRequest>> {
        let result = sqlx::query(
            "UPDATE transfer_requests SET request_status = ?, retry_count = 0, execution_time = ?, claim_token = NULL, claimed_at = NULL WHERE id_request = ? AND request_status <> ?",
        )
        .bind(RequestStatus::Todo.as_str())
        .bind(to_millis(now))
        .bind(id)
        .bind(RequestStatus::Done.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("reset transfer request {id}"))?;

        if result.rows_affected() > 0 {
            info!(request_id = id, "transfer request reset to TODO");
        }
        self.find_by_id(id).await
    }

    async fn reset_all_errors(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE transfer_requests SET request_status = ?, retry_count = 0, execution_time = ?, claim_token = NULL, claimed_at = NULL WHERE request_status = ?",
        )
        .bind(RequestStatus::Todo.as_str())
        .bind(to_millis(now))
        .bind(RequestStatus::Error.as_str())
        .execute(&self.pool)
        .await
        .context("reset errored transfer requests")?;

        let count = result.rows_affected();
        info!(count, "errored transfer requests reset to TODO");
        Ok(count)
    }
}

#[async_trait]
impl ErrorStore for FsTransferStorage {
    async fn create_error(&self, error: NewRequestError) -> Result<RequestError> {
        error.validate().context("invalid request error")?;

        let result = sqlx::query(
            "INSERT INTO request_errors(id_request, code, error_message, error_trace, execution_time) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(error.request_id)
        .bind(i64::from(error.code))
        .bind(&error.error_message)
        .bind(&error.error_trace)
        .bind(to_millis(error.execution_time))
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert error for request {}", error.request_id))?;

        let id = result.last_insert_rowid();
        self.find_error(id)
            .await?
            .context("request error missing after insert")
    }

    async fn delete_error(&self, id: ErrorId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM request_errors WHERE id_error = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete request error {id}"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_error(&self, id: ErrorId) -> Result<Option<RequestError>> {
        let row = sqlx::query_as::<_, ErrorRow>(&format!("{SELECT_ERRORS} WHERE id_error = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("query request error {id}"))?;

        row.map(RequestError::try_from).transpose()
    }

    async fn list_errors_by_request(&self, request_id: RequestId) -> Result<Vec<RequestError>> {
        let rows = sqlx::query_as::<_, ErrorRow>(&format!(
            "{SELECT_ERRORS} WHERE id_request = ? ORDER BY execution_time ASC, id_error ASC"
        ))
        .bind(request_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("query errors of request {request_id}"))?;

        rows.into_iter().map(RequestError::try_from).collect()
    }
}

/// `Unknown` matches every stored value that is not a known code.
fn push_status_filter(builder: &mut QueryBuilder<'_, Sqlite>, status: RequestStatus) {
    if status != RequestStatus::Unknown {
        builder.push("request_status = ").push_bind(status.as_str());
        return;
    }

    builder.push("request_status NOT IN (");
    let mut separated = builder.separated(", ");
    for known in RequestStatus::KNOWN {
        separated.push_bind(known.as_str());
    }
    separated.push_unseparated(")");
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .with_context(|| format!("timestamp out of range: {ms}"))
}

fn normalize_sqlite_uri(raw: &str) -> String {
    if raw.starts_with("sqlite:") {
        raw.to_string()
    } else {
        format!("sqlite://{raw}")
    }
}
