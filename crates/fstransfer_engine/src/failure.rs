use std::error::Error as _;
use std::fmt;

use fstransfer_backend::BackendError;
use fstransfer_contract::{TransferRequest, ValidationError};
use thiserror::Error;

pub const NOT_FOUND_CODE: i32 = 404;
pub const UNCLASSIFIED_CODE: i32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    ResolveSource,
    ResolveTarget,
    Fetch,
    Store,
    DeleteSource,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransferStage::ResolveSource => "resolve source provider",
            TransferStage::ResolveTarget => "resolve target provider",
            TransferStage::Fetch => "fetch from source",
            TransferStage::Store => "store into target",
            TransferStage::DeleteSource => "delete from source",
        })
    }
}

/// Why one transfer attempt failed. Every variant is handled the same way by
/// the executor; the variant only decides the recorded code.
#[derive(Debug, Error)]
pub enum TransferFailure {
    #[error("file {key} not found")]
    NotFound { key: String },
    #[error("{stage} failed with code {code}: {source}")]
    Backend {
        stage: TransferStage,
        code: i32,
        #[source]
        source: BackendError,
    },
    #[error("{stage} failed: {source}")]
    Unclassified {
        stage: TransferStage,
        #[source]
        source: BackendError,
    },
    /// The provider accepted the call but returned something unusable.
    #[error("{stage} returned an invalid result: {source}")]
    Rejected {
        stage: TransferStage,
        #[source]
        source: ValidationError,
    },
}

impl TransferFailure {
    pub fn classify(stage: TransferStage, error: BackendError) -> Self {
        match error {
            // A structured provider failure without its own code is reported
            // as not found.
            BackendError::Service { code, .. } => TransferFailure::Backend {
                stage,
                code: code.unwrap_or(NOT_FOUND_CODE),
                source: error,
            },
            other => TransferFailure::Unclassified {
                stage,
                source: other,
            },
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            TransferFailure::NotFound { .. } => NOT_FOUND_CODE,
            TransferFailure::Backend { code, .. } => *code,
            TransferFailure::Unclassified { .. } | TransferFailure::Rejected { .. } => {
                UNCLASSIFIED_CODE
            }
        }
    }

    /// Short description for the error record; never empty.
    pub fn summary(&self) -> String {
        let summary = self.to_string();
        if summary.trim().is_empty() {
            "unclassified transfer failure".to_string()
        } else {
            summary
        }
    }

    /// Full diagnostic text, built fresh for each attempt.
    pub fn trace(&self, request: &TransferRequest, attempt_id: &str) -> String {
        let mut buffer = format!(
            "transfer of {} from {} to {} failed (request {}, attempt {})\nerror: {self}\n",
            request.old_file_key,
            request.source_provider_name,
            request.target_provider_name,
            request.id,
            attempt_id,
        );

        let mut cause = self.source();
        while let Some(inner) = cause {
            buffer.push_str(&format!("caused by: {inner}\n"));
            cause = inner.source();
        }

        buffer.push_str(&format!("{self:#?}"));
        buffer
    }
}
