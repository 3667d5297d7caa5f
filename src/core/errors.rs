use thiserror::Error;
use uuid::Uuid;

/// Unified error type for the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Uniqueness violation on a slot number.
    #[error("number {number} is already reserved")]
    Conflict { number: u16 },

    /// Ownership mismatch on mutate/delete.
    #[error("reservation {id} belongs to another principal")]
    Forbidden { id: Uuid },

    /// Unknown reservation id.
    #[error("reservation {id} not found")]
    NotFound { id: Uuid },

    /// Rejected input: out-of-range number or empty subject.
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        field: Option<&'static str>,
    },

    /// Network/timeout-class store failure. Retried by the policy before
    /// being surfaced to the caller.
    #[error("transient store failure during {operation}")]
    Transient {
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid registry configuration.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Corrupted payloads, closed channels and other faults that retrying
    /// cannot fix.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RegistryError {
    pub fn conflict(number: u16) -> Self {
        Self::Conflict { number }
    }

    pub fn forbidden(id: Uuid) -> Self {
        Self::Forbidden { id }
    }

    pub fn not_found(id: Uuid) -> Self {
        Self::NotFound { id }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error tied to a specific field.
    pub fn validation_field<S: Into<String>>(message: S, field: &'static str) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field),
        }
    }

    pub fn transient<S: Into<String>>(operation: S) -> Self {
        Self::Transient {
            operation: operation.into(),
            source: None,
        }
    }

    /// Create a transient error wrapping the underlying failure.
    pub fn transient_with_source<S, E>(operation: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transient {
            operation: operation.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Only transient errors are retried; every other kind is terminal and
    /// propagates on first occurrence.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Get error category for metrics/logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "conflict",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::Validation { .. } => "validation",
            Self::Transient { .. } => "transient",
            Self::Configuration { .. } => "configuration",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<sled::Error> for RegistryError {
    fn from(err: sled::Error) -> Self {
        Self::transient_with_source("sled_operation", err)
    }
}

impl From<bincode::Error> for RegistryError {
    fn from(err: bincode::Error) -> Self {
        Self::internal_with_source("record encoding failed", err)
    }
}

impl From<anyhow::Error> for RegistryError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}
