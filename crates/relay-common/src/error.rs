use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stable error code carried in `ExecutionResult.error.kind`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RateLimitExceeded,
    PermissionDenied,
    DataSourceDenied,
    SchemaViolation,
    AgentNotFound,
    UnsupportedExecutionType,
    ExecutionTimeout,
    BackendError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::RateLimitExceeded,
        ErrorKind::PermissionDenied,
        ErrorKind::DataSourceDenied,
        ErrorKind::SchemaViolation,
        ErrorKind::AgentNotFound,
        ErrorKind::UnsupportedExecutionType,
        ErrorKind::ExecutionTimeout,
        ErrorKind::BackendError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "RateLimitExceeded",
            Self::PermissionDenied => "PermissionDenied",
            Self::DataSourceDenied => "DataSourceDenied",
            Self::SchemaViolation => "SchemaViolation",
            Self::AgentNotFound => "AgentNotFound",
            Self::UnsupportedExecutionType => "UnsupportedExecutionType",
            Self::ExecutionTimeout => "ExecutionTimeout",
            Self::BackendError => "BackendError",
        }
    }

    /// Denials telemetry correlates as potential abuse.
    pub fn is_security_relevant(self) -> bool {
        matches!(self, Self::PermissionDenied | Self::DataSourceDenied)
    }

    pub fn is_admission(self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded
                | Self::PermissionDenied
                | Self::DataSourceDenied
                | Self::SchemaViolation
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing error envelope. Never carries backtraces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("data source access denied: {0}")]
    DataSourceDenied(String),

    #[error("input schema violation: {0}")]
    SchemaViolation(String),
}

impl AdmissionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimitExceeded(_) => ErrorKind::RateLimitExceeded,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::DataSourceDenied(_) => ErrorKind::DataSourceDenied,
            Self::SchemaViolation(_) => ErrorKind::SchemaViolation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("unsupported execution type '{0}'")]
    UnsupportedExecutionType(String),

    #[error("agent '{0}' is not registered")]
    AgentNotFound(String),
}

impl RoutingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedExecutionType(_) => ErrorKind::UnsupportedExecutionType,
            Self::AgentNotFound(_) => ErrorKind::AgentNotFound,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend misconfigured: {0}")]
    Misconfigured(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("runtime failure: {0}")]
    Runtime(String),
}

const UPSTREAM_BODY_LIMIT: usize = 512;

impl BackendError {
    /// Builds an `Upstream` error, truncating the body so large error pages
    /// never end up in caller-facing results.
    pub fn upstream(status: u16, body: &str) -> Self {
        let body = match body.char_indices().nth(UPSTREAM_BODY_LIMIT) {
            Some((idx, _)) => format!("{}...", &body[..idx]),
            None => body.to_string(),
        };
        Self::Upstream { status, body }
    }

    /// False when the call was refused before anything left the engine.
    pub fn reached_backend(&self) -> bool {
        !matches!(self, Self::Misconfigured(_))
    }
}

/// Any failure the pipeline can end an invocation with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("execution exceeded timeout of {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Admission(e) => e.kind(),
            Self::Routing(e) => e.kind(),
            Self::Backend(_) => ErrorKind::BackendError,
            Self::Timeout(_) => ErrorKind::ExecutionTimeout,
        }
    }

    pub fn to_execution_error(&self) -> ExecutionError {
        ExecutionError {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}
