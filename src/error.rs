use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced by the card lifecycle and quota engine.
///
/// Each variant maps onto the HTTP status a caller would report through
/// [`EngineError::status_code`]. Quota lookups that find nothing usable are not
/// errors; see [`crate::domain::application::AlertOutcome`].
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error("{0}")]
    #[diagnostic(code(parkcard::validation))]
    ValidationError(String),

    #[error("{0}")]
    #[diagnostic(code(parkcard::not_found))]
    NotFound(String),

    #[error("{0}")]
    #[diagnostic(code(parkcard::conflict))]
    ConflictError(String),

    #[error("{message}")]
    #[diagnostic(code(parkcard::payment))]
    PaymentError { status: u16, message: String },

    #[error("{0}")]
    #[diagnostic(
        code(parkcard::allocation),
        help("the card number sequence is exhausted; no card was issued")
    )]
    AllocationError(String),

    #[error("Storage error: {0}")]
    #[diagnostic(code(parkcard::storage))]
    InternalError(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(parkcard::serialization))]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    #[diagnostic(code(parkcard::rocksdb))]
    RocksDbError(#[from] rocksdb::Error),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::ConflictError(message.into())
    }

    pub fn payment(status: u16, message: impl Into<String>) -> Self {
        Self::PaymentError {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into().into())
    }

    /// HTTP status an adapter should answer with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ValidationError(_) => 400,
            Self::NotFound(_) => 404,
            Self::ConflictError(_) => 409,
            Self::PaymentError { status, .. } => *status,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(EngineError::validation("bad").status_code(), 400);
        assert_eq!(EngineError::not_found("missing").status_code(), 404);
        assert_eq!(EngineError::conflict("dup").status_code(), 409);
        assert_eq!(EngineError::payment(502, "gateway").status_code(), 502);
        assert_eq!(
            EngineError::AllocationError("Card number limit exceeded".to_string()).status_code(),
            500
        );
        assert_eq!(EngineError::internal("boom").status_code(), 500);
    }

    #[test]
    fn test_payment_error_passes_message_through() {
        let err = EngineError::payment(502, "PhonePe payment initialization failed");
        assert_eq!(err.to_string(), "PhonePe payment initialization failed");
    }
}
