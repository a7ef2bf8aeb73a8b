//! CLI error types.

use std::error::Error as _;
use std::fmt;

use claw_wgembed::WgEmbedError;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// The configuration file or document is invalid.
    Config(WgEmbedError),
    /// The device could not be reached or rejected a request.
    Device(WgEmbedError),
    /// Output formatting error.
    Format(String),
    /// Invalid argument.
    InvalidArgument(String),
    /// IO error.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Device(e) => write!(f, "device error: {e}"),
            Self::Format(msg) => write!(f, "format error: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            // Display already includes the wrapped error.
            Self::Config(e) | Self::Device(e) => e.source(),
            Self::Io(e) => e.source(),
            Self::Format(_) | Self::InvalidArgument(_) => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<WgEmbedError> for CliError {
    fn from(err: WgEmbedError) -> Self {
        if err.is_input_error() {
            Self::Config(err)
        } else {
            Self::Device(err)
        }
    }
}
