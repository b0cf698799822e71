//! Error types for Atrium
//!
//! Provides standardized error handling across the host. Failures are scoped
//! to the module (or provider) that caused them and never cross module
//! boundaries; callers that tolerate a failure log it and move on.

use thiserror::Error;

/// Errors that can occur in the Atrium host
#[derive(Debug, Error)]
pub enum AtriumError {
    /// The host catalog could not be fetched or decoded
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// A module declared a library requirement not present in the shared pool
    #[error("Module {module}: unresolved dependency `{name}`")]
    UnresolvedDependency { module: String, name: String },

    /// A module's code could not be fetched
    #[error("Module {module}: code fetch failed: {reason}")]
    Fetch { module: String, reason: String },

    /// A module's code could not be linked into an executable instance
    #[error("Module {module}: link failed: {reason}")]
    Link { module: String, reason: String },

    /// A module's `setup` entry point failed
    #[error("Module {module}: setup failed: {reason}")]
    Setup { module: String, reason: String },

    /// A state container was asked to run an action it does not define
    #[error("Container {container}: unknown action `{action}`")]
    UnknownAction { container: String, action: String },

    /// Development channel errors (seed fetch, socket, malformed messages)
    #[error("Dev channel error: {0}")]
    DevChannel(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Atrium operations
pub type AtriumResult<T> = Result<T, AtriumError>;
