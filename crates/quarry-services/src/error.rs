use quarry_core::QuarryError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service-level errors with user-friendly messages
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("No connection available: {0}")]
    PoolUnavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

impl ServiceError {
    /// Pool capacity problems clear up on their own; callers may retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::PoolUnavailable(_))
    }
}

impl From<QuarryError> for ServiceError {
    fn from(err: QuarryError) -> Self {
        if err.is_pool_unavailable() {
            ServiceError::PoolUnavailable(err.to_string())
        } else {
            ServiceError::QueryFailed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_retryable() {
        let err = ServiceError::from(QuarryError::PoolExhausted { max_connections: 4 });
        assert!(matches!(err, ServiceError::PoolUnavailable(_)));
        assert!(err.is_retryable());

        let err = ServiceError::from(QuarryError::Timeout("waited 5s".into()));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_engine_errors_are_query_failures() {
        let err = ServiceError::from(QuarryError::Query("line 1:8: mismatched input".into()));
        assert!(matches!(err, ServiceError::QueryFailed(ref m) if m.contains("mismatched input")));
        assert!(!err.is_retryable());
        assert!(!ServiceError::InvalidArgument("limit".into()).is_retryable());
    }
}
