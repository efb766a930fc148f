//! Error types for iqlink.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IqLinkError {
    // Session construction and configuration
    #[error("{role} endpoint {id} not found among available endpoints")]
    EndpointNotFound { role: String, id: u32 },

    #[error("Endpoint configuration failed at {step}: {message}")]
    ConfigurationFailed { step: String, message: String },

    #[error("Session is {actual}, expected {expected}")]
    InvalidState { expected: String, actual: String },

    // Modulation
    #[error("Unsupported modulation: {bits_per_symbol} bits per symbol (maximum is 8)")]
    ModulationConfig { bits_per_symbol: u32 },

    #[error("Unknown modulation scheme: {name}")]
    UnknownModulation { name: String },

    // Device endpoint calls
    #[error("Send/receive timed out after {timeout_ms}ms")]
    IoTimeout { timeout_ms: u64 },

    #[error("Endpoint call {operation} failed: {message}")]
    Endpoint { operation: String, message: String },

    #[error("Unknown stream handle: {handle}")]
    UnknownStream { handle: u32 },

    #[error("Unknown register parameter: {name}")]
    UnknownRegister { name: String },

    // Files
    #[error("Cannot access {path}: {message}")]
    FileAccess { path: String, message: String },

    // Configuration file
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl IqLinkError {
    /// Shorthand for a failed endpoint call.
    pub fn endpoint(operation: &str, message: impl Into<String>) -> Self {
        IqLinkError::Endpoint {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Returns true for errors the session loop retries on the next cycle.
    pub fn is_timeout(&self) -> bool {
        matches!(self, IqLinkError::IoTimeout { .. })
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, IqLinkError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_endpoint_not_found_display() {
        let error = IqLinkError::EndpointNotFound {
            role: "TX".to_string(),
            id: 3,
        };
        assert_eq!(
            error.to_string(),
            "TX endpoint 3 not found among available endpoints"
        );
    }

    #[test]
    fn test_configuration_failed_display() {
        let error = IqLinkError::ConfigurationFailed {
            step: "RX path of RX endpoint, channel 1: set gain".to_string(),
            message: "out of range".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Endpoint configuration failed at RX path of RX endpoint, channel 1: set gain: out of range"
        );
    }

    #[test]
    fn test_modulation_config_display() {
        let error = IqLinkError::ModulationConfig { bits_per_symbol: 9 };
        assert_eq!(
            error.to_string(),
            "Unsupported modulation: 9 bits per symbol (maximum is 8)"
        );
    }

    #[test]
    fn test_io_timeout_display_and_classification() {
        let error = IqLinkError::IoTimeout { timeout_ms: 100 };
        assert_eq!(error.to_string(), "Send/receive timed out after 100ms");
        assert!(error.is_timeout());
        assert!(!IqLinkError::endpoint("send", "usb gone").is_timeout());
    }

    #[test]
    fn test_endpoint_helper_display() {
        let error = IqLinkError::endpoint("set_gain_db", "device busy");
        assert_eq!(
            error.to_string(),
            "Endpoint call set_gain_db failed: device busy"
        );
    }

    #[test]
    fn test_file_access_display() {
        let error = IqLinkError::FileAccess {
            path: "data.bin".to_string(),
            message: "No such file or directory".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Cannot access data.bin: No such file or directory"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: IqLinkError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: IqLinkError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: IqLinkError = io_error.into();

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<IqLinkError>();
        assert_sync::<IqLinkError>();
    }
}
