//! The shared interface capability and the settings used to create one.
//!
//! [`WireGuardInterface`] is what callers program against. The running
//! implementation is [`InterfaceHandle`] (Unix only, since devices are driven
//! over Unix control sockets); [`NoOpInterface`](crate::NoOpInterface) works
//! everywhere.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{self, ConfigurationDocument};
use crate::device::{BoxFuture, socket_file_name};
use crate::error::{Result, WgEmbedError};
use crate::keys::PublicKey;
use crate::link::LinkBackend;
use crate::types::PeerRecord;

#[cfg(unix)]
pub use crate::handle::InterfaceHandle;

/// Default directory for control sockets.
pub const DEFAULT_SOCKET_DIR: &str = "/var/run/wireguard";

/// Default link MTU.
pub const DEFAULT_MTU: u16 = 1420;

/// Default deadline for each external call.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest interface name the host accepts.
pub const MAX_NAME_LEN: usize = 15;

/// The operations every interface implementation supports.
///
/// Implemented by [`InterfaceHandle`] and
/// [`NoOpInterface`](crate::NoOpInterface), so callers can pick one at
/// construction time and hold a `Box<dyn WireGuardInterface>`.
pub trait WireGuardInterface: Send + Sync {
    /// Interface name.
    fn name(&self) -> &str;

    /// Validates `document` and applies it, replacing every existing peer.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for bad input, or the failed step.
    fn load_configuration<'a>(
        &'a self,
        document: &'a ConfigurationDocument,
    ) -> BoxFuture<'a, Result<()>>;

    /// Adds a peer or replaces an existing peer's allowed IPs.
    ///
    /// `allowed_ips` is a comma-separated CIDR list.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for a bad key or CIDR.
    fn add_peer<'a>(&'a self, public_key: &'a str, allowed_ips: &'a str)
    -> BoxFuture<'a, Result<()>>;

    /// Removes a peer. Removing an absent peer succeeds.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for a malformed key.
    fn remove_peer<'a>(&'a self, public_key: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Lists peers as currently reported by the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be queried.
    fn list_peers(&self) -> BoxFuture<'_, Result<Vec<PeerRecord>>>;

    /// Public key of the running interface, once configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be queried.
    fn public_key(&self) -> BoxFuture<'_, Result<Option<PublicKey>>>;

    /// Listen port of the running interface, once configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be queried.
    fn port(&self) -> BoxFuture<'_, Result<Option<u16>>>;

    /// Releases the interface. Calling it again succeeds without effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the tunnel engine fails to release the device.
    fn close(&self) -> BoxFuture<'_, Result<()>>;

    /// Returns true if a peer with `public_key` is present.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for a malformed key.
    fn has_peer<'a>(&'a self, public_key: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let key = config::parse_public_key(public_key)?;
            let peers = self.list_peers().await?;
            Ok(peers.iter().any(|p| p.public_key == key))
        })
    }

    /// Looks up one peer.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no peer has `public_key`.
    fn peer<'a>(&'a self, public_key: &'a str) -> BoxFuture<'a, Result<PeerRecord>> {
        Box::pin(async move {
            let key = config::parse_public_key(public_key)?;
            self.list_peers()
                .await?
                .into_iter()
                .find(|p| p.public_key == key)
                .ok_or_else(|| WgEmbedError::NotFound(public_key.to_string()))
        })
    }
}

/// Settings for creating an interface handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceOptions {
    /// Directory holding control sockets.
    pub socket_dir: PathBuf,
    /// MTU used when the configuration sets none.
    pub mtu: u16,
    /// Deadline for each external call.
    pub operation_timeout: Duration,
    /// Link configuration backend.
    pub link: LinkBackend,
}

impl Default for InterfaceOptions {
    fn default() -> Self {
        Self {
            socket_dir: PathBuf::from(DEFAULT_SOCKET_DIR),
            mtu: DEFAULT_MTU,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            link: LinkBackend::default(),
        }
    }
}

impl InterfaceOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the control socket directory.
    #[must_use]
    pub fn with_socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.socket_dir = dir.into();
        self
    }

    /// Sets the default MTU.
    #[must_use]
    pub fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    /// Sets the per-call deadline.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the link backend.
    #[must_use]
    pub fn with_link(mut self, link: LinkBackend) -> Self {
        self.link = link;
        self
    }

    /// Control socket path for `name`.
    #[must_use]
    pub fn socket_path(&self, name: &str) -> PathBuf {
        self.socket_dir.join(socket_file_name(name))
    }
}

/// Lifecycle state of a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceState {
    /// Device allocated, no configuration applied yet.
    Created,
    /// At least one configuration applied.
    Configured,
    /// Resources released.
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults() {
        let options = InterfaceOptions::default();
        assert_eq!(options.socket_dir, PathBuf::from("/var/run/wireguard"));
        assert_eq!(options.mtu, 1420);
        assert_eq!(options.operation_timeout, Duration::from_secs(10));
        assert_eq!(options.link, LinkBackend::Auto);
        assert_eq!(
            options.socket_path("wg0"),
            PathBuf::from("/var/run/wireguard/wg0.sock")
        );
    }

    #[test]
    fn options_serde_fills_defaults() {
        let options: InterfaceOptions =
            serde_json::from_str(r#"{"mtu": 1280, "link": "noop"}"#).expect("deserialize");
        assert_eq!(options.mtu, 1280);
        assert_eq!(options.link, LinkBackend::Noop);
        assert_eq!(options.socket_dir, PathBuf::from(DEFAULT_SOCKET_DIR));

        let json = serde_json::to_string(&options).expect("serialize");
        let back: InterfaceOptions = serde_json::from_str(&json).expect("roundtrip");
        assert_eq!(back, options);
    }
}
