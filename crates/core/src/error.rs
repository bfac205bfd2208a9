use std::path::PathBuf;

/// Fatal configuration problems. Surfaced at startup; the monitor loop
/// never starts while one of these is outstanding.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in config file {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("Device {device} does not resolve to a transport handle ({path})")]
    MissingDevice { device: String, path: PathBuf },
}

/// A device response that contains no decimal number.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("No temperature value in response: '{response}'")]
pub struct ParseError {
    pub response: String,
}
