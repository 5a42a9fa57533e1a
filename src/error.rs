//! Error types for Aegis operations.
//!
//! This module provides structured error handling for the interactive
//! pipeline and the batch ETLs, including categorization, severity levels,
//! and retry guidance.
//!
//! # Error Taxonomy
//!
//! The main error type is [`AegisError`], which covers all failure modes:
//! - Configuration errors (missing env settings, missing SSL cert,
//!   unreadable category templates)
//! - Authentication failures (OAuth exhausted retries, missing API key)
//! - Upstream transport failures (LLM provider, database, object storage)
//! - Content errors (malformed tool-call arguments, empty conversations)
//! - User errors (batch requests for unavailable bank/period tuples)
//! - Invariant violations (should-not-happen states)
//!
//! # Propagation Policy
//!
//! The connector layer retries, the component layer classifies, and the
//! pipeline/ETL layer decides user-visible behavior. Use
//! [`AegisError::is_retryable`] at the connector layer and
//! [`AegisError::user_message`] at the outermost surface.
//!
//! # Result Type
//!
//! Use [`AegisResult<T>`] as a convenient alias for `Result<T, AegisError>`:
//!
//! ```rust
//! use aegis::AegisResult;
//!
//! fn my_function() -> AegisResult<String> {
//!     Ok("Success".to_string())
//! }
//! ```

use crate::logging::{log_error, log_warn};
use thiserror::Error;

// ============================================================================
// Error categorization types
// ============================================================================

/// High-level categorization of errors for routing and handling decisions.
///
/// Use [`AegisError::category()`] to get the category for any error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Startup configuration problems. Fatal for the process.
    Config,

    /// Authentication problems. Fatal for the current request or ETL run.
    Auth,

    /// External service failures (LLM provider, database, object storage).
    ///
    /// May be transient; the connector layer retries a bounded number of
    /// times before surfacing these.
    Upstream,

    /// Content that failed validation (tool-call arguments, conversations).
    ///
    /// The owning component decides whether to degrade or reject.
    Content,

    /// Caller mistakes on the batch path (bank not monitored, period not
    /// available). The caller can fix these.
    User,

    /// Internal invariant violations. Should never happen; always
    /// investigated.
    Invariant,
}

/// Severity level for logging and alerting decisions.
///
/// Use [`AegisError::severity()`] to get the severity for any error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// System is unusable for this execution. Requires attention.
    Critical,

    /// Action failed but the system is stable.
    Error,

    /// Unexpected but recoverable situation.
    Warning,

    /// Expected failure (validation, not-found). Normal operation.
    Info,
}

// ============================================================================
// Aegis error types
// ============================================================================

/// Convenient result type for Aegis operations.
pub type AegisResult<T> = std::result::Result<T, AegisError>;

/// Errors that can occur during pipeline or ETL operations.
///
/// Each variant can be:
/// - Categorized via [`category()`](Self::category)
/// - Assessed for severity via [`severity()`](Self::severity)
/// - Checked for retryability via [`is_retryable()`](Self::is_retryable)
/// - Converted to user-facing messages via [`user_message()`](Self::user_message)
///
/// # Creating Errors
///
/// Use the constructor methods, which log at the appropriate level:
///
/// ```rust
/// use aegis::AegisError;
///
/// let err = AegisError::config("POSTGRES_HOST is not set");
/// let err = AegisError::upstream("LLM provider returned 503", true, None);
/// ```
#[derive(Error, Debug)]
pub enum AegisError {
    /// Missing or invalid environment settings, missing SSL cert,
    /// unreadable category template. Fatal at startup.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },

    /// OAuth failure after retries, or a missing API key.
    ///
    /// Surfaces to the user as a generic authentication-failed event;
    /// details are recorded in the monitor.
    #[error("Authentication failed: {message}")]
    Auth {
        /// Details about the authentication failure.
        message: String,
    },

    /// LLM, database, or object-storage transport failure.
    ///
    /// `retryable` reflects the connector-layer classification: transport
    /// errors and 408/429/5xx responses retry; other 4xx responses do not.
    #[error("Upstream failure: {message}")]
    Upstream {
        /// Description of the failure.
        message: String,
        /// Whether the connector layer may retry this failure.
        retryable: bool,
        /// The underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Tool-call arguments missing required fields, invalid JSON after
    /// whitespace stripping, or references to nonexistent qa_ids.
    #[error("Content error: {message}")]
    Content {
        /// Details about the content failure.
        message: String,
    },

    /// No prompt record exists for the requested (layer, name).
    #[error("Prompt not found: {layer}/{name}")]
    PromptNotFound {
        /// Prompt layer that was requested.
        layer: String,
        /// Prompt name that was requested.
        name: String,
    },

    /// No messages remain after conversation filtering.
    #[error("No valid messages after filtering")]
    EmptyConversation,

    /// A requested (bank, period) tuple is not in data-availability, or an
    /// ETL run found no applicable banks. Batch path only.
    #[error("User error: {message}")]
    UserError {
        /// Description of what the caller got wrong.
        message: String,
    },

    /// Should-not-happen states: inconsistent chunk order, a prompt tool
    /// definition double-encoded as a string, unbound SQL parameters.
    #[error("Invariant violation: {message}")]
    Invariant {
        /// Description of the violated invariant.
        message: String,
    },
}

impl AegisError {
    /// Get the error category for routing and handling decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. } => ErrorCategory::Config,
            Self::Auth { .. } => ErrorCategory::Auth,
            Self::Upstream { .. } => ErrorCategory::Upstream,
            Self::Content { .. } => ErrorCategory::Content,
            Self::PromptNotFound { .. } => ErrorCategory::Config,
            Self::EmptyConversation => ErrorCategory::Content,
            Self::UserError { .. } => ErrorCategory::User,
            Self::Invariant { .. } => ErrorCategory::Invariant,
        }
    }

    /// Get the error severity for logging and alerting.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Config { .. } => ErrorSeverity::Critical,
            Self::Auth { .. } => ErrorSeverity::Critical,
            Self::Upstream { .. } => ErrorSeverity::Error,
            Self::Content { .. } => ErrorSeverity::Warning,
            Self::PromptNotFound { .. } => ErrorSeverity::Error,
            Self::EmptyConversation => ErrorSeverity::Info,
            Self::UserError { .. } => ErrorSeverity::Info,
            Self::Invariant { .. } => ErrorSeverity::Error,
        }
    }

    /// Whether this error is transient and should trigger a retry.
    ///
    /// Only upstream transport failures carry retry guidance; everything
    /// else is deterministic and retrying will not help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream { retryable: true, .. })
    }

    /// Convert to a user-facing message suitable for streaming back.
    ///
    /// Technical details and internal identifiers are stripped.
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { .. } | Self::PromptNotFound { .. } => {
                "Service configuration issue. Please contact support".to_string()
            }
            Self::Auth { .. } => "Authentication failed. Please try again later".to_string(),
            Self::Upstream { .. } => {
                "Data is temporarily unavailable. Please try again".to_string()
            }
            Self::Content { .. } => {
                "I could not process part of the response. Please rephrase and try again"
                    .to_string()
            }
            Self::EmptyConversation => {
                "I did not receive a question to answer. Please send a message".to_string()
            }
            Self::UserError { message } => message.clone(),
            Self::Invariant { .. } => "An internal error occurred. Please try again".to_string(),
        }
    }

    // =========================================================================
    // Constructor methods with automatic logging
    // =========================================================================
    //
    // These methods log the error at the appropriate level. Use them instead
    // of constructing variants directly.

    /// Create a configuration error (logs at ERROR level).
    pub fn config(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "config",
            message = %message,
            "Configuration validation failed"
        );
        Self::Config { message }
    }

    /// Create an authentication error (logs at ERROR level).
    pub fn auth(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "auth",
            message = %message,
            "Authentication failed"
        );
        Self::Auth { message }
    }

    /// Create an upstream transport error (logs at ERROR level).
    pub fn upstream(
        message: impl Into<String>,
        retryable: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let message = message.into();
        log_error!(
            error_type = "upstream",
            message = %message,
            retryable = retryable,
            has_source = source.is_some(),
            "Upstream request failed"
        );
        Self::Upstream {
            message,
            retryable,
            source,
        }
    }

    /// Create a content error (logs at WARN level).
    pub fn content(message: impl Into<String>) -> Self {
        let message = message.into();
        log_warn!(
            error_type = "content",
            message = %message,
            "Content validation failed"
        );
        Self::Content { message }
    }

    /// Create a prompt-not-found error (logs at ERROR level).
    pub fn prompt_not_found(layer: impl Into<String>, name: impl Into<String>) -> Self {
        let layer = layer.into();
        let name = name.into();
        log_error!(
            error_type = "prompt_not_found",
            layer = %layer,
            name = %name,
            "Prompt record missing from registry"
        );
        Self::PromptNotFound { layer, name }
    }

    /// Create a user error for the batch path (logs at WARN level).
    pub fn user(message: impl Into<String>) -> Self {
        let message = message.into();
        log_warn!(
            error_type = "user",
            message = %message,
            "Rejected batch request"
        );
        Self::UserError { message }
    }

    /// Create an invariant-violation error (logs at ERROR level).
    pub fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "invariant",
            message = %message,
            "Invariant violated"
        );
        Self::Invariant { message }
    }
}
