//! Status workflows for property requests and scheduled viewings.
//!
//! Pure functions over closed status enums. Services call these before
//! writing anything, so a rejected transition never mutates a record.

pub mod request;
pub mod viewing;

pub use request::RequestStatus;
pub use viewing::{ViewingEvent, ViewingStatus};

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Unknown status '{0}'")]
    UnknownStatus(String),

    #[error("Cannot {action} when status is '{from}'")]
    InvalidTransition { action: String, from: String },

    #[error("{message}")]
    Validation { field: &'static str, message: String },
}

impl WorkflowError {
    pub(crate) fn invalid(action: impl Into<String>, from: impl std::fmt::Display) -> Self {
        WorkflowError::InvalidTransition { action: action.into(), from: from.to_string() }
    }

    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        WorkflowError::Validation { field, message: message.into() }
    }
}
