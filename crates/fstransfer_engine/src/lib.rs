pub mod alert;
pub mod executor;
pub mod failure;
pub mod notifier;
pub mod retry;
pub mod runner;
pub mod selector;
pub mod settings;

pub use alert::{render_failure_alert, AlertSender, FailureAlert, TracingAlertSender};
pub use executor::{AttemptOutcome, ExecutorError, OutcomeKind, TransferExecutor};
pub use failure::{TransferFailure, TransferStage};
pub use notifier::{LoggingListener, TransferListener};
pub use retry::{RetryDecision, RetryPolicy};
pub use runner::{RunSummary, TransferRunner};
pub use selector::DueJobSelector;
pub use settings::{ExecutorSettings, NotificationSettings, RetrySettings, TransferSettings};
