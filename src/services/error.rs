use std::collections::HashMap;

use thiserror::Error;

use crate::access::Decision;
use crate::access::Scope;
use crate::database::DatabaseError;
use crate::workflow::WorkflowError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the service layer. Everything except `Unexpected` is an
/// operational error and reaches the client unchanged.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{message}")]
    Validation {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("{context}: {source}")]
    Unexpected {
        context: String,
        #[source]
        source: BoxError,
    },
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation { message: message.into(), field_errors: None }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut field_errors = HashMap::new();
        field_errors.insert(field.into(), message.clone());
        ServiceError::Validation { message, field_errors: Some(field_errors) }
    }

    pub fn fields(message: impl Into<String>, field_errors: HashMap<String, String>) -> Self {
        ServiceError::Validation { message: message.into(), field_errors: Some(field_errors) }
    }

    pub fn not_found(what: &str) -> Self {
        ServiceError::NotFound(format!("{} not found", what))
    }

    pub fn unexpected(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ServiceError::Unexpected { context: context.into(), source: source.into() }
    }
}

impl From<DatabaseError> for ServiceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ServiceError::NotFound(msg),
            DatabaseError::Conflict(msg) => ServiceError::Conflict(msg),
            other => ServiceError::unexpected("Data access failed", other),
        }
    }
}

impl From<WorkflowError> for ServiceError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::UnknownStatus(status) => {
                ServiceError::field("status", format!("Unknown status '{}'", status))
            }
            WorkflowError::InvalidTransition { .. } => ServiceError::InvalidTransition(err.to_string()),
            WorkflowError::Validation { field, message } => ServiceError::field(field, message),
        }
    }
}

/// Prefix unexpected data-access failures with what the operation was doing.
/// Operational errors (not found, conflict) pass through untouched.
pub trait ServiceContext<T> {
    fn context(self, context: &str) -> Result<T, ServiceError>;
}

impl<T> ServiceContext<T> for Result<T, DatabaseError> {
    fn context(self, context: &str) -> Result<T, ServiceError> {
        self.map_err(|err| match err {
            DatabaseError::NotFound(msg) => ServiceError::NotFound(msg),
            DatabaseError::Conflict(msg) => ServiceError::Conflict(msg),
            other => ServiceError::unexpected(context, other),
        })
    }
}

pub fn authorize(decision: Decision) -> Result<Scope, ServiceError> {
    match decision {
        Decision::Allow(scope) => Ok(scope),
        Decision::Deny(reason) => Err(ServiceError::Forbidden(reason.to_string())),
    }
}
