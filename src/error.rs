use thiserror::Error;

/// Errors raised while translating or executing SQL.
#[derive(Debug, Error)]
pub enum ShimError {
    /// A rewrite rule was rejected when it was defined.
    #[error("invalid rewrite rule {pattern:?}: {reason}")]
    InvalidRule { pattern: String, reason: String },

    /// A rewrite stage found a query shape it cannot translate. Never retried.
    #[error("translation failed: {0}")]
    Translation(String),

    /// The engine rejected the (massaged) statement text.
    #[error("Invalid query: {message:?} {query:?}")]
    InvalidQuery { message: String, query: String },

    /// The engine rejected the parameter list bound to a statement.
    #[error("Invalid parameters: {message:?} {params} for {query:?}")]
    InvalidParameters {
        message: String,
        params: String,
        query: String,
    },

    /// Unique, foreign key, check or not-null constraint violation.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Serialization failure or deadlock; the transaction was rolled back.
    #[error("transaction rolled back: {0}")]
    TransactionRollback(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShimError {
    pub fn translation(message: impl Into<String>) -> Self {
        ShimError::Translation(message.into())
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, ShimError::Integrity(_))
    }
}

pub type Result<T> = std::result::Result<T, ShimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_query_includes_query_text() {
        let err = ShimError::InvalidQuery {
            message: "near \"NULLS\": syntax error".into(),
            query: "SELECT * FROM t ORDER BY x NULLS".into(),
        };
        let text = err.to_string();
        assert!(text.starts_with("Invalid query:"));
        assert!(text.contains("ORDER BY x NULLS"));
    }

    #[test]
    fn test_invalid_parameters_includes_params() {
        let err = ShimError::InvalidParameters {
            message: "wrong number of parameters".into(),
            params: "[1, 2]".into(),
            query: "SELECT ?".into(),
        };
        assert!(err.to_string().contains("[1, 2]"));
    }

    #[test]
    fn test_is_integrity() {
        assert!(ShimError::Integrity("UNIQUE constraint failed".into()).is_integrity());
        assert!(!ShimError::translation("x").is_integrity());
    }
}
