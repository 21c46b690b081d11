//! Error types for Playgate.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{BridgeErrorKind, LimitKind, Operation, ValidationReport};

/// Result type alias using Playgate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Playgate.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Validator Errors
    // =========================================================================
    #[error("Submission rejected with {} issue(s)", .0.issues().len())]
    Rejected(ValidationReport),

    // =========================================================================
    // Rate Limiting
    // =========================================================================
    #[error("Rate limited on {limit}; resets at {reset_at}")]
    RateLimited {
        limit: LimitKind,
        reset_at: DateTime<Utc>,
    },

    // =========================================================================
    // Isolation Boundary & Bridge Errors
    // =========================================================================
    #[error("Bootstrap fault: {0}")]
    BootstrapFault(String),

    #[error("Runtime fault in {operation}: {kind}")]
    RuntimeFault {
        operation: Operation,
        kind: BridgeErrorKind,
        /// Internal diagnostic, logged but never returned to callers.
        detail: String,
    },

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Instance limit reached: {0}")]
    InstanceLimit(usize),

    #[error("Instance {0} is owned by another agent")]
    NotInstanceOwner(String),

    // =========================================================================
    // Session Errors
    // =========================================================================
    #[error("Session {0} has already ended")]
    TerminalStateViolation(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {0} is owned by another agent")]
    NotSessionOwner(String),

    // =========================================================================
    // Store & Asset Errors
    // =========================================================================
    #[error("Game not found: {0}")]
    GameNotFound(String),

    #[error("Asset error: {0}")]
    Asset(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a runtime fault.
    pub fn runtime_fault(
        operation: Operation,
        kind: BridgeErrorKind,
        detail: impl Into<String>,
    ) -> Self {
        Self::RuntimeFault {
            operation,
            kind,
            detail: detail.into(),
        }
    }

    /// Create a bootstrap fault.
    pub fn bootstrap(msg: impl Into<String>) -> Self {
        Self::BootstrapFault(msg.into())
    }

    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an asset error.
    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "VALIDATION_FAILED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::BootstrapFault(_) => "BOOTSTRAP_FAULT",
            Self::RuntimeFault { .. } => "RUNTIME_FAULT",
            Self::InstanceNotFound(_) => "INSTANCE_NOT_FOUND",
            Self::InstanceLimit(_) => "INSTANCE_LIMIT",
            Self::NotInstanceOwner(_) => "NOT_INSTANCE_OWNER",
            Self::TerminalStateViolation(_) => "TERMINAL_STATE_VIOLATION",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::NotSessionOwner(_) => "NOT_SESSION_OWNER",
            Self::GameNotFound(_) => "GAME_NOT_FOUND",
            Self::Asset(_) => "ASSET_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to a remote caller.
    ///
    /// Runtime faults and internal errors are reduced to their kind so
    /// isolated-instance diagnostics never leave the host.
    pub fn public_message(&self) -> String {
        match self {
            Self::RuntimeFault {
                operation, kind, ..
            } => format!("The game failed during {} ({})", operation, kind),
            Self::BootstrapFault(_) => "The game could not be started".to_string(),
            Self::Storage(_) | Self::Internal(_) | Self::Other(_) | Self::Config(_) => {
                "Internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}
