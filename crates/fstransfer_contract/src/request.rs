use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::RequestStatus;

pub type RequestId = i64;
pub type ProviderName = String;

pub const MAX_FIELD_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} exceeds {max} characters (got {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },
}

/// One file move between two named storage backends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferRequest {
    pub id: RequestId,
    pub old_file_key: String,
    pub source_provider_name: ProviderName,
    pub target_provider_name: ProviderName,
    pub new_file_key: String,
    pub status: RequestStatus,
    pub retry_count: u32,
    pub execution_time: DateTime<Utc>,
    pub creation_time: DateTime<Utc>,
    pub request_context: String,
    pub contact_mail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTransferRequest {
    pub old_file_key: String,
    pub source_provider_name: ProviderName,
    pub target_provider_name: ProviderName,
    #[serde(default)]
    pub request_context: String,
    #[serde(default)]
    pub contact_mail: Option<String>,
}

impl NewTransferRequest {
    pub fn new(
        old_file_key: impl Into<String>,
        source_provider_name: impl Into<String>,
        target_provider_name: impl Into<String>,
    ) -> Self {
        Self {
            old_file_key: old_file_key.into(),
            source_provider_name: source_provider_name.into(),
            target_provider_name: target_provider_name.into(),
            request_context: String::new(),
            contact_mail: None,
        }
    }

    pub fn with_context(mut self, request_context: impl Into<String>) -> Self {
        self.request_context = request_context.into();
        self
    }

    pub fn with_contact_mail(mut self, contact_mail: impl Into<String>) -> Self {
        self.contact_mail = Some(contact_mail.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        required("old_file_key", &self.old_file_key)?;
        required("source_provider_name", &self.source_provider_name)?;
        required("target_provider_name", &self.target_provider_name)?;
        Ok(())
    }
}

fn required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    bounded(field, value)
}

pub(crate) fn bounded(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let actual = value.chars().count();
    if actual > MAX_FIELD_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_FIELD_LEN,
            actual,
        });
    }
    Ok(())
}

pub fn validate_new_file_key(value: &str) -> Result<(), ValidationError> {
    bounded("new_file_key", value)
}

#[cfg(test)]
mod tests {
    use super::{validate_new_file_key, NewTransferRequest, ValidationError, MAX_FIELD_LEN};

    #[test]
    fn accepts_well_formed_request() {
        let request = NewTransferRequest::new("file-1", "local", "archive")
            .with_context("batch=7")
            .with_contact_mail("owner@example.org");
        assert_eq!(request.validate(), Ok(()));
    }

    #[test]
    fn rejects_blank_provider() {
        let request = NewTransferRequest::new("file-1", "  ", "archive");
        assert_eq!(
            request.validate(),
            Err(ValidationError::Empty {
                field: "source_provider_name"
            })
        );
    }

    #[test]
    fn rejects_oversized_key() {
        let key = "k".repeat(MAX_FIELD_LEN + 1);
        let request = NewTransferRequest::new(key, "local", "archive");
        assert_eq!(
            request.validate(),
            Err(ValidationError::TooLong {
                field: "old_file_key",
                max: MAX_FIELD_LEN,
                actual: MAX_FIELD_LEN + 1,
            })
        );
    }

    #[test]
    fn new_file_key_may_be_empty_but_bounded() {
        assert!(validate_new_file_key("").is_ok());
        assert!(validate_new_file_key(&"x".repeat(MAX_FIELD_LEN)).is_ok());
        assert!(validate_new_file_key(&"x".repeat(MAX_FIELD_LEN + 1)).is_err());
    }
}
