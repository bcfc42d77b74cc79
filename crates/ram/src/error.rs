use ram_core::ConfigError;

/// Errors raised by producers, consumers and schema bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum RamError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(
        "protocol version mismatch: database has {found}, this build speaks {expected}; reconcile the ram_version table manually"
    )]
    VersionMismatch {
        found: String,
        expected: &'static str,
    },
    #[error("no protocol version recorded in ram_version; provision the schema with a producer first")]
    VersionMissing,
    #[error("ram_version must hold at most one row, found {0}")]
    CorruptVersionTable(usize),
    #[error("required table `{0}` does not exist")]
    MissingTable(String),
    #[error("{field} must be at most 255 characters, got {len}")]
    KeyTooLong { field: &'static str, len: usize },
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("delay must not be negative, got {0}ms")]
    NegativeDelay(i64),
    #[error("{field} is out of range")]
    DurationOutOfRange { field: &'static str },
    #[error("no database connection available")]
    NoConnection,
    #[error("invalid select statement: {0}")]
    InvalidSelect(String),
    #[error("max_retry_time must be greater than zero")]
    InvalidMaxRetryTime,
    #[error("delay_time_when_retries has {actual} entries, expected {expected} (max_retry_time)")]
    RetryScheduleLength { expected: u32, actual: usize },
    #[error("failed to serialize message")]
    Serialize(#[from] serde_json::Error),
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl RamError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::VersionMismatch { .. } => "VERSION_MISMATCH",
            Self::VersionMissing => "VERSION_MISSING",
            Self::CorruptVersionTable(_) => "CORRUPT_VERSION_TABLE",
            Self::MissingTable(_) => "MISSING_TABLE",
            Self::KeyTooLong { .. } => "KEY_TOO_LONG",
            Self::EmptyMessage => "EMPTY_MESSAGE",
            Self::NegativeDelay(_) => "NEGATIVE_DELAY",
            Self::DurationOutOfRange { .. } => "DURATION_OUT_OF_RANGE",
            Self::NoConnection => "NO_CONNECTION",
            Self::InvalidSelect(_) => "INVALID_SELECT",
            Self::InvalidMaxRetryTime => "INVALID_MAX_RETRY_TIME",
            Self::RetryScheduleLength { .. } => "RETRY_SCHEDULE_LENGTH",
            Self::Serialize(_) => "SERIALIZE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the error stems from bad input rather than configuration or
    /// infrastructure. Callers may retry these with corrected arguments.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::KeyTooLong { .. }
                | Self::EmptyMessage
                | Self::NegativeDelay(_)
                | Self::InvalidSelect(_)
                | Self::Serialize(_)
        )
    }
}

/// Outcome signalled by a failing event handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The attempt failed; try again after the configured backoff.
    #[error("{0}")]
    Retry(String),
    /// The payload can never succeed. The event is logged and dropped.
    #[error("{0}")]
    StopRetry(String),
    /// Anything else; retried like [`HandlerError::Retry`].
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn retry(message: impl Into<String>) -> Self {
        Self::Retry(message.into())
    }

    pub fn stop_retry(message: impl Into<String>) -> Self {
        Self::StopRetry(message.into())
    }

    pub fn is_stop_retry(&self) -> bool {
        matches!(self, Self::StopRetry(_))
    }

    /// Text stored in the event log. Domain errors keep their message as is;
    /// unexpected errors keep their full cause chain and backtrace.
    pub fn log_message(&self) -> String {
        match self {
            Self::Unexpected(e) => format!("{e:?}"),
            other => other.to_string(),
        }
    }
}
