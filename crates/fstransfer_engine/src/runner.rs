use std::sync::Arc;

use chrono::{DateTime, Utc};
use fstransfer_contract::RequestId;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info};

use crate::executor::{AttemptOutcome, ExecutorError, OutcomeKind, TransferExecutor};
use crate::selector::DueJobSelector;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub selected: usize,
    pub completed: usize,
    pub retrying: usize,
    pub exhausted: usize,
    pub skipped: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &AttemptOutcome) {
        match outcome.kind {
            OutcomeKind::Completed => self.completed += 1,
            OutcomeKind::Retrying => self.retrying += 1,
            OutcomeKind::Exhausted => self.exhausted += 1,
            OutcomeKind::Skipped => self.skipped += 1,
        }
    }
}

/// Drives one scheduler tick: select what is due, then attempt each request
/// with bounded concurrency.
#[derive(Clone)]
pub struct TransferRunner {
    selector: DueJobSelector,
    executor: Arc<TransferExecutor>,
    concurrency: usize,
}

impl TransferRunner {
    pub fn new(selector: DueJobSelector, executor: Arc<TransferExecutor>) -> Self {
        Self {
            selector,
            executor,
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn run_due(&self, limit: i64) -> Result<RunSummary, ExecutorError> {
        self.run_due_at(Utc::now(), limit).await
    }

    /// Every selected request is attempted even if one of them hits a store
    /// error; the first such error is returned after the batch drains.
    pub async fn run_due_at(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<RunSummary, ExecutorError> {
        let due = self.selector.select(now, limit).await?;
        let mut summary = RunSummary {
            selected: due.len(),
            ..RunSummary::default()
        };
        if due.is_empty() {
            debug!("no transfer requests due");
            return Ok(summary);
        }

        let results: Vec<Result<AttemptOutcome, ExecutorError>> = stream::iter(due)
            .map(|request| {
                let executor = Arc::clone(&self.executor);
                async move { executor.execute_at(request, now).await }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut first_error = None;
        for result in results {
            match result {
                Ok(outcome) => summary.record(&outcome),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        info!(
            selected = summary.selected,
            completed = summary.completed,
            retrying = summary.retrying,
            exhausted = summary.exhausted,
            skipped = summary.skipped,
            "transfer run finished"
        );

        match first_error {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    /// Runs one request now regardless of its execution time.
    pub async fn play_now(
        &self,
        id: RequestId,
        now: DateTime<Utc>,
    ) -> Result<AttemptOutcome, ExecutorError> {
        self.executor.execute_by_id(id, now).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use fstransfer_backend::{BackendRegistry, InMemoryBackend, StoredFile};
    use fstransfer_contract::{NewTransferRequest, RequestStatus};
    use fstransfer_storage::{FsTransferStorage, RequestStore};

    use super::{RunSummary, TransferRunner};
    use crate::executor::{ExecutorError, OutcomeKind, TransferExecutor};
    use crate::retry::RetryPolicy;
    use crate::selector::DueJobSelector;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    async fn setup(
        limit: u32,
    ) -> (Arc<FsTransferStorage>, Arc<InMemoryBackend>, TransferRunner) {
        let storage = Arc::new(FsTransferStorage::in_memory().await.expect("storage"));
        let source = Arc::new(InMemoryBackend::new("local"));
        let target = Arc::new(InMemoryBackend::new("archive"));
        let executor = TransferExecutor::new(
            storage.clone(),
            storage.clone(),
            BackendRegistry::new().with(source.clone()).with(target),
            RetryPolicy::new(limit, 60),
        );
        let runner = TransferRunner::new(DueJobSelector::new(storage.clone()), Arc::new(executor))
            .with_concurrency(4);
        (storage, source, runner)
    }

    #[tokio::test]
    async fn run_attempts_every_due_request_once() {
        let (storage, source, runner) = setup(3).await;
        for key in ["a", "b", "c"] {
            source
                .insert(key, StoredFile::new(key, "text/plain", key.as_bytes().to_vec()))
                .await;
            storage
                .create(NewTransferRequest::new(key, "local", "archive"), t0())
                .await
                .expect("create");
        }
        storage
            .create(NewTransferRequest::new("gone", "local", "archive"), t0())
            .await
            .expect("create");

        let summary = runner.run_due_at(t0(), 0).await.expect("run");
        assert_eq!(
            summary,
            RunSummary {
                selected: 4,
                completed: 3,
                retrying: 1,
                exhausted: 0,
                skipped: 0,
            }
        );
        assert!(source.is_empty().await);

        // The failed one is not due again until its delay passes.
        let idle = runner.run_due_at(t0(), 0).await.expect("run");
        assert_eq!(idle.selected, 0);
        let retry = runner
            .run_due_at(t0() + Duration::seconds(60), 0)
            .await
            .expect("run");
        assert_eq!(retry.selected, 1);
        assert_eq!(retry.retrying, 1);
    }

    #[tokio::test]
    async fn run_respects_batch_limit() {
        let (storage, _source, runner) = setup(3).await;
        for key in ["a", "b", "c"] {
            storage
                .create(NewTransferRequest::new(key, "local", "archive"), t0())
                .await
                .expect("create");
        }

        let summary = runner.run_due_at(t0(), 2).await.expect("run");
        assert_eq!(summary.selected, 2);
        assert_eq!(
            storage
                .list_by_status(RequestStatus::Todo)
                .await
                .expect("list")
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn play_now_ignores_execution_time_but_not_status() {
        let (storage, source, runner) = setup(3).await;
        source
            .insert("doc", StoredFile::new("doc", "text/plain", b"x".to_vec()))
            .await;
        let request = storage
            .create(
                NewTransferRequest::new("doc", "local", "archive"),
                t0() + Duration::days(1),
            )
            .await
            .expect("create");

        let outcome = runner.play_now(request.id, t0()).await.expect("play");
        assert_eq!(outcome.kind, OutcomeKind::Completed);

        let again = runner.play_now(request.id, t0()).await;
        assert!(matches!(
            again,
            Err(ExecutorError::NotSchedulable {
                status: RequestStatus::Done,
                ..
            })
        ));
    }
}
