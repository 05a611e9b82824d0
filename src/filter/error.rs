use thiserror::Error;

/// Rejections raised while turning a filter document into SQL or matching it in memory.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Unknown collection: {0}")]
    InvalidTableName(String),

    #[error("Invalid column name: {0}")]
    InvalidColumn(String),

    #[error("Invalid where clause: {0}")]
    InvalidWhereClause(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid operator data: {0}")]
    InvalidOperatorData(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error("Invalid offset: {0}")]
    InvalidOffset(String),

    #[error("Malformed filter document: {0}")]
    JsonError(#[from] serde_json::Error),
}
