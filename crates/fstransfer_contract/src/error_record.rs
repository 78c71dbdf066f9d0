use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::{RequestId, ValidationError};

pub type ErrorId = i64;

/// Diagnostic entry for one failed attempt. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestError {
    pub id: ErrorId,
    pub request_id: RequestId,
    pub code: i32,
    pub error_message: String,
    pub error_trace: String,
    pub execution_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewRequestError {
    pub request_id: RequestId,
    pub code: i32,
    pub error_message: String,
    pub error_trace: String,
    pub execution_time: DateTime<Utc>,
}

impl NewRequestError {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.error_message.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "error_message",
            });
        }
        Ok(())
    }
}
