//! Error types for embedded `WireGuard` operations.
//!
//! Every failure in this crate is reported through [`WgEmbedError`]. Parse and
//! validation failures are caller mistakes and are never retried here; device
//! and link failures are surfaced with the step that failed so the caller can
//! decide on retry or teardown.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::types::ConfigField;

/// Result type alias for embedded `WireGuard` operations.
pub type Result<T> = std::result::Result<T, WgEmbedError>;

/// Boxed underlying cause carried by device configuration failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The step of a configuration apply that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyStep {
    /// Pushing a full configuration or delta to the device.
    Configure,
    /// Reading live state back from the device.
    Query,
    /// Assigning an interface address.
    SetAddress,
    /// Bringing the link up.
    SetLinkUp,
}

impl fmt::Display for ApplyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configure => write!(f, "configure device"),
            Self::Query => write!(f, "query device"),
            Self::SetAddress => write!(f, "set interface address"),
            Self::SetLinkUp => write!(f, "bring link up"),
        }
    }
}

/// Errors that can occur while parsing, validating or applying `WireGuard`
/// configuration.
#[derive(Debug, Error)]
pub enum WgEmbedError {
    /// Malformed configuration text.
    #[error("parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number, 0 when the error is not tied to a line.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// A configuration field failed validation.
    #[error("invalid {field}{}: {message}", peer_suffix(.peer.as_deref()))]
    Validation {
        /// The offending field.
        field: ConfigField,
        /// Public key text of the peer the field belongs to, if any.
        peer: Option<String>,
        /// Description of the problem.
        message: String,
    },

    /// The OS random source could not produce key material.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// The tunnel device could not be allocated.
    #[error("failed to create device '{name}': {reason}")]
    DeviceCreation {
        /// Interface name.
        name: String,
        /// Reason for the failure.
        reason: String,
    },

    /// The tunnel engine or link layer rejected a configuration step.
    #[error("failed to {step} on '{name}'")]
    DeviceConfiguration {
        /// Interface name.
        name: String,
        /// The step that failed.
        step: ApplyStep,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },

    /// A peer lookup found nothing.
    #[error("peer not found: {0}")]
    NotFound(String),

    /// An external call did not complete within its deadline.
    #[error("timeout: {operation} did not complete within {timeout:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// Malformed control protocol traffic.
    #[error("control protocol error: {0}")]
    Protocol(String),

    /// The interface handle has already been closed.
    #[error("interface '{0}' is closed")]
    Closed(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn peer_suffix(peer: Option<&str>) -> String {
    peer.map(|key| format!(" for peer {key}")).unwrap_or_default()
}

impl WgEmbedError {
    /// Creates a `Parse` error.
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Creates a `Validation` error for an interface-level field.
    pub fn invalid(field: ConfigField, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            peer: None,
            message: message.into(),
        }
    }

    /// Creates a `Validation` error for a field of the given peer.
    pub fn invalid_peer(
        field: ConfigField,
        peer: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field,
            peer: Some(peer.into()),
            message: message.into(),
        }
    }

    /// Creates a `DeviceCreation` error.
    pub fn creation(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceCreation {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Wraps a cause as a `DeviceConfiguration` error for the given step.
    pub fn configuration(
        name: impl Into<String>,
        step: ApplyStep,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::DeviceConfiguration {
            name: name.into(),
            step,
            source: source.into(),
        }
    }

    /// Returns the offending field for `Validation` errors.
    #[must_use]
    pub fn field(&self) -> Option<ConfigField> {
        match self {
            Self::Validation { field, .. } => Some(*field),
            _ => None,
        }
    }

    /// Returns the failed step for `DeviceConfiguration` errors.
    #[must_use]
    pub fn step(&self) -> Option<ApplyStep> {
        match self {
            Self::DeviceConfiguration { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Returns true for errors the caller fixes by changing its input.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::Validation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn validation_display_names_field_and_peer() {
        let err = WgEmbedError::invalid_peer(ConfigField::AllowedIps, "gysK", "not-a-cidr");
        assert_eq!(err.to_string(), "invalid AllowedIPs for peer gysK: not-a-cidr");
        assert_eq!(err.field(), Some(ConfigField::AllowedIps));
        assert!(err.is_input_error());
    }

    #[test]
    fn validation_display_without_peer() {
        let err = WgEmbedError::invalid(ConfigField::ListenPort, "out of range");
        assert_eq!(err.to_string(), "invalid ListenPort: out of range");
    }

    #[test]
    fn configuration_error_chains_source() {
        let cause = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = WgEmbedError::configuration("wg0", ApplyStep::SetLinkUp, cause);
        assert_eq!(err.to_string(), "failed to bring link up on 'wg0'");
        assert_eq!(err.step(), Some(ApplyStep::SetLinkUp));
        let source = err.source().expect("source");
        assert_eq!(source.to_string(), "denied");
        assert!(!err.is_input_error());
    }

    #[test]
    fn io_error_converts() {
        let err: WgEmbedError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, WgEmbedError::Io(_)));
    }
}
