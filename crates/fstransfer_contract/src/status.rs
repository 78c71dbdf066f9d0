use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a transfer request.
///
/// Decoding from storage is total: any value that is not one of the known
/// codes becomes [`RequestStatus::Unknown`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum RequestStatus {
    Todo,
    Failed,
    Done,
    Error,
    Unknown,
}

impl RequestStatus {
    /// Statuses that have a stored code of their own.
    pub const KNOWN: [RequestStatus; 4] = [
        RequestStatus::Todo,
        RequestStatus::Done,
        RequestStatus::Failed,
        RequestStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Todo => "TODO",
            RequestStatus::Failed => "FAILED",
            RequestStatus::Done => "DONE",
            RequestStatus::Error => "ERROR",
            RequestStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn from_stored(value: &str) -> Self {
        match value {
            "TODO" => RequestStatus::Todo,
            "FAILED" => RequestStatus::Failed,
            "DONE" => RequestStatus::Done,
            "ERROR" => RequestStatus::Error,
            _ => RequestStatus::Unknown,
        }
    }

    /// Narrows to the statuses the due-job selector may pick up.
    pub fn schedulable(&self) -> Option<SchedulableStatus> {
        match self {
            RequestStatus::Failed => Some(SchedulableStatus::Failed),
            RequestStatus::Todo => Some(SchedulableStatus::Todo),
            _ => None,
        }
    }

    /// Edges of the automatic state machine. Operator resets are not edges.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Todo, RequestStatus::Done)
                | (RequestStatus::Todo, RequestStatus::Failed)
                | (RequestStatus::Todo, RequestStatus::Error)
                | (RequestStatus::Failed, RequestStatus::Done)
                | (RequestStatus::Failed, RequestStatus::Failed)
                | (RequestStatus::Failed, RequestStatus::Error)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RequestStatus {
    fn from(value: String) -> Self {
        RequestStatus::from_stored(&value)
    }
}

impl From<RequestStatus> for String {
    fn from(value: RequestStatus) -> Self {
        value.as_str().to_string()
    }
}

/// The subset of statuses eligible for automatic selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulableStatus {
    Failed,
    Todo,
}

/// Retried work is served before fresh work.
pub const DUE_PRIORITY: [SchedulableStatus; 2] = [SchedulableStatus::Failed, SchedulableStatus::Todo];

impl SchedulableStatus {
    pub fn as_str(&self) -> &'static str {
        RequestStatus::from(*self).as_str()
    }
}

impl From<SchedulableStatus> for RequestStatus {
    fn from(value: SchedulableStatus) -> Self {
        match value {
            SchedulableStatus::Failed => RequestStatus::Failed,
            SchedulableStatus::Todo => RequestStatus::Todo,
        }
    }
}
