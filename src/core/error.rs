use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Lock error: {0}")]
    LockError(String),

    // ========================================
    // Virtual attribute errors
    // ========================================
    /// Broken attribute declaration. Raised while a model is built or bound
    /// to a store and must not be ignored.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Virtual attribute '{attribute}' is read-only")]
    ReadOnlyWriteRejected { attribute: String },

    #[error("Bulk mutation rejected: {0}")]
    BulkMutationRejected(String),

    #[error("Query engine '{0}' cannot express the search cache extraction")]
    UnsupportedQueryEngine(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<sqlparser::parser::ParserError> for DbError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl DbError {
    /// True for errors that signal a broken declaration rather than a
    /// runtime condition.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
