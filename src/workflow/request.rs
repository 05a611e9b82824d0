use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    New,
    InProgress,
    Matched,
    Completed,
    Cancelled,
}

use RequestStatus::*;

/// Legal moves. A status may always be re-stated (recorded as a note).
const TRANSITIONS: &[(RequestStatus, &[RequestStatus])] = &[
    (New, &[InProgress, Cancelled]),
    (InProgress, &[Matched, Cancelled]),
    (Matched, &[Completed, Cancelled, InProgress]),
    (Completed, &[]),
    (Cancelled, &[]),
];

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            New => "new",
            InProgress => "in_progress",
            Matched => "matched",
            Completed => "completed",
            Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Completed | Cancelled)
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        *self == next
            || TRANSITIONS
                .iter()
                .find(|(from, _)| from == self)
                .map(|(_, to)| to.contains(&next))
                .unwrap_or(false)
    }

    /// Validate a requested status change.
    pub fn transition(self, next: RequestStatus) -> Result<RequestStatus, WorkflowError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(WorkflowError::invalid(format!("move request to '{}'", next), self))
        }
    }

    /// Status after assigning a sales_ops member: `new` advances to `in_progress`,
    /// anything open stays as it is. Closed requests cannot be reassigned.
    pub fn after_assignment(self) -> Result<RequestStatus, WorkflowError> {
        match self {
            New => Ok(InProgress),
            s if s.is_terminal() => Err(WorkflowError::invalid("assign request", s)),
            s => Ok(s),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "new" => Ok(New),
            "in_progress" => Ok(InProgress),
            "matched" => Ok(Matched),
            "completed" => Ok(Completed),
            "cancelled" => Ok(Cancelled),
            "" => Err(WorkflowError::validation("status", "Status is required")),
            other => Err(WorkflowError::UnknownStatus(other.to_string())),
        }
    }
}
