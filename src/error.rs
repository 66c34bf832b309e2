//! Unified error types for hostnet

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for hostnet operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    #[error("VM '{0}' not found")]
    VmNotFound(String),

    // Address errors
    #[error("Malformed IPv4 address '{value}': expected four octets in 0-255")]
    MalformedAddress { value: String },

    #[error("No host address left in {address}/{netmask}: last octet would exceed 255")]
    AddressSpaceExhausted { address: String, netmask: String },

    // Network errors
    #[error("Host only network '{name}' not found")]
    NetworkNotFound { name: String },

    #[error("Host only network '{name}' still has {attached} VM(s) attached")]
    NetworkInUse { name: String, attached: usize },

    #[error("Backend {operation} failed: {message}")]
    Backend { operation: String, message: String },

    #[error("Failed to lock '{path}': {message}")]
    Lock { path: PathBuf, message: String },

    // Output errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for an opaque hypervisor failure
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for hostnet operations
pub type Result<T> = std::result::Result<T, Error>;
