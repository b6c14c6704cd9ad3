//! Error handling module for setupforge
//!
//! Provides centralized error handling with proper error types using thiserror.
//! All errors in the engine should use these types for consistency.

use thiserror::Error;

/// Main error type for the deployment engine
#[derive(Error, Debug)]
pub enum SetupError {
    /// IO errors (file operations, extraction, working root)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (missing or unparseable setup configuration)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network errors (remote configuration fetch)
    #[error("Network error: {0}")]
    Network(String),

    /// Validation errors (active module list structure)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Manifest errors (order list or command descriptors)
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Extraction errors (materializing a module's bundled files)
    #[error("Extraction error: {0}")]
    Extract(String),

    /// Step execution errors (OS-level action failed)
    #[error("Step execution failed: {0}")]
    Step(String),

    /// Host operation errors (process spawn, registry, services, environment)
    #[error("Host operation failed: {0}")]
    Host(String),

    /// Engine state errors (re-entrant run, invalid transition)
    #[error("Engine error: {0}")]
    Engine(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, SetupError>;

// Convenient error constructors
impl SetupError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a manifest error
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Create an extraction error
    pub fn extract(msg: impl Into<String>) -> Self {
        Self::Extract(msg.into())
    }

    /// Create a step execution error
    pub fn step(msg: impl Into<String>) -> Self {
        Self::Step(msg.into())
    }

    /// Create a host operation error
    pub fn host(msg: impl Into<String>) -> Self {
        Self::Host(msg.into())
    }

    /// Create an engine state error
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }
}
