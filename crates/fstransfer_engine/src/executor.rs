//! One transfer attempt for one request: claim, move the file, persist the
//! outcome, then notify.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use fstransfer_backend::BackendRegistry;
use fstransfer_contract::{
    validate_new_file_key, NewRequestError, RequestError, RequestId, RequestStatus,
    TransferRequest,
};
use fstransfer_storage::{ErrorStore, RequestStore};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alert::{render_failure_alert, AlertSender};
use crate::failure::{TransferFailure, TransferStage};
use crate::notifier::TransferListener;
use crate::retry::RetryPolicy;
use crate::settings::NotificationSettings;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("request {id} is in status {status} and cannot be executed")]
    NotSchedulable { id: RequestId, status: RequestStatus },
    #[error("request {0} not found")]
    NotFound(RequestId),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Completed,
    Retrying,
    Exhausted,
    /// Another executor holds the request or it changed since selection.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub kind: OutcomeKind,
    pub request: TransferRequest,
    pub error: Option<RequestError>,
}

pub struct TransferExecutor {
    requests: Arc<dyn RequestStore>,
    errors: Arc<dyn ErrorStore>,
    backends: BackendRegistry,
    policy: RetryPolicy,
    claim_ttl: Duration,
    listeners: Vec<Arc<dyn TransferListener>>,
    alerts: Option<(Arc<dyn AlertSender>, NotificationSettings)>,
}

impl TransferExecutor {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        errors: Arc<dyn ErrorStore>,
        backends: BackendRegistry,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            requests,
            errors,
            backends,
            policy,
            claim_ttl: Duration::from_secs(900),
            listeners: Vec::new(),
            alerts: None,
        }
    }

    pub fn with_claim_ttl(mut self, claim_ttl: Duration) -> Self {
        self.claim_ttl = claim_ttl;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn TransferListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_alerts(
        mut self,
        sender: Arc<dyn AlertSender>,
        settings: NotificationSettings,
    ) -> Self {
        self.alerts = Some((sender, settings));
        self
    }

    /// Loads a request by id and attempts it immediately, ignoring its
    /// execution time.
    pub async fn execute_by_id(
        &self,
        id: RequestId,
        now: DateTime<Utc>,
    ) -> Result<AttemptOutcome, ExecutorError> {
        let request = self
            .requests
            .find_by_id(id)
            .await?
            .ok_or(ExecutorError::NotFound(id))?;
        self.execute_at(request, now).await
    }

    /// Transfer failures never surface as `Err`; they are recorded on the
    /// request. `Err` means the store could not be read or written.
    pub async fn execute_at(
        &self,
        mut request: TransferRequest,
        now: DateTime<Utc>,
    ) -> Result<AttemptOutcome, ExecutorError> {
        // The store keeps millisecond precision.
        let now = now.trunc_subsecs(3);
        if request.status.schedulable().is_none() {
            return Err(ExecutorError::NotSchedulable {
                id: request.id,
                status: request.status,
            });
        }

        let attempt_id = Uuid::now_v7().to_string();
        if !self
            .requests
            .claim(&request, &attempt_id, now, self.claim_ttl)
            .await?
        {
            debug!(request_id = request.id, attempt_id = %attempt_id, "request skipped");
            return Ok(AttemptOutcome {
                kind: OutcomeKind::Skipped,
                request,
                error: None,
            });
        }

        match self.transfer(&request).await {
            Ok(new_file_key) => {
                debug_assert!(request.status.can_transition_to(RequestStatus::Done));
                request.new_file_key = new_file_key;
                request.status = RequestStatus::Done;
                self.requests.update(&request).await?;

                info!(
                    request_id = request.id,
                    attempt_id = %attempt_id,
                    new_file_key = %request.new_file_key,
                    "transfer completed"
                );
                self.notify_completed(&request).await;

                Ok(AttemptOutcome {
                    kind: OutcomeKind::Completed,
                    request,
                    error: None,
                })
            }
            Err(failure) => self.record_failure(request, failure, &attempt_id, now).await,
        }
    }

    async fn transfer(&self, request: &TransferRequest) -> Result<String, TransferFailure> {
        let source = self
            .backends
            .resolve(&request.source_provider_name)
            .map_err(|err| TransferFailure::classify(TransferStage::ResolveSource, err))?;
        let target = self
            .backends
            .resolve(&request.target_provider_name)
            .map_err(|err| TransferFailure::classify(TransferStage::ResolveTarget, err))?;

        let file = source
            .fetch(&request.old_file_key)
            .await
            .map_err(|err| TransferFailure::classify(TransferStage::Fetch, err))?
            .ok_or_else(|| TransferFailure::NotFound {
                key: request.old_file_key.clone(),
            })?;

        let size = file.size();
        let new_file_key = target
            .store(file)
            .await
            .map_err(|err| TransferFailure::classify(TransferStage::Store, err))?;
        // Must hold before the source copy is deleted.
        validate_new_file_key(&new_file_key).map_err(|source| TransferFailure::Rejected {
            stage: TransferStage::Store,
            source,
        })?;
        debug!(
            request_id = request.id,
            bytes = size,
            new_file_key = %new_file_key,
            "file stored in target"
        );

        // The copy stays in the target if this fails; nothing rolls it back.
        source
            .delete(&request.old_file_key)
            .await
            .map_err(|err| TransferFailure::classify(TransferStage::DeleteSource, err))?;

        Ok(new_file_key)
    }

    async fn record_failure(
        &self,
        mut request: TransferRequest,
        failure: TransferFailure,
        attempt_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AttemptOutcome, ExecutorError> {
        let decision = self.policy.after_failure(request.retry_count, now);
        debug_assert!(request.status.can_transition_to(decision.status));
        request.retry_count = decision.retry_count;
        request.status = decision.status;
        request.execution_time = decision.execution_time;
        self.requests.update(&request).await?;

        let error = self
            .errors
            .create_error(NewRequestError {
                request_id: request.id,
                code: failure.code(),
                error_message: failure.summary(),
                error_trace: failure.trace(&request, attempt_id),
                execution_time: now,
            })
            .await?;

        let kind = if request.status == RequestStatus::Error {
            error!(
                request_id = request.id,
                attempt_id = %attempt_id,
                code = error.code,
                retry_count = request.retry_count,
                error = %error.error_message,
                "transfer failed permanently"
            );
            OutcomeKind::Exhausted
        } else {
            warn!(
                request_id = request.id,
                attempt_id = %attempt_id,
                code = error.code,
                retry_count = request.retry_count,
                next_execution = %request.execution_time,
                error = %error.error_message,
                "transfer failed, retry scheduled"
            );
            OutcomeKind::Retrying
        };

        self.send_alert(&request, &error).await;

        Ok(AttemptOutcome {
            kind,
            request,
            error: Some(error),
        })
    }

    async fn notify_completed(&self, request: &TransferRequest) {
        for listener in &self.listeners {
            if let Err(err) = listener.transfer_completed(request).await {
                warn!(
                    request_id = request.id,
                    listener = listener.name(),
                    error = %err,
                    "transfer listener failed"
                );
            }
        }
    }

    async fn send_alert(&self, request: &TransferRequest, error: &RequestError) {
        let Some((sender, settings)) = &self.alerts else {
            return;
        };
        let Some(alert) = render_failure_alert(settings, request, error) else {
            return;
        };
        if let Err(err) = sender.send(&alert).await {
            warn!(request_id = request.id, error = %err, "failure alert not delivered");
        }
    }
}
