//! Control-socket client for running devices.
//!
//! The device is owned by another process; this client only speaks the
//! userspace control protocol over its socket and, for `apply`, sets link
//! state on the host.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use claw_wgctl::client::DeviceClient;
//!
//! # async fn example() -> Result<(), claw_wgctl::CliError> {
//! let client = DeviceClient::new("/var/run/wireguard", Duration::from_secs(5));
//! let device = client.query("wg0").await?;
//! println!("peers: {}", device.peers.len());
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use claw_wgembed::apply::{self, apply_configuration};
use claw_wgembed::device::{DeviceConfigurator, LinkConfigurator, UapiConfigurator};
use claw_wgembed::uapi::{DeviceUpdate, PeerUpdate};
use claw_wgembed::{ApplyStep, DeviceInfo, LinkBackend, NormalizedConfiguration};
use tracing::{debug, info};

use crate::error::CliError;

/// Client for one socket directory.
pub struct DeviceClient {
    configurator: UapiConfigurator,
    link: Arc<dyn LinkConfigurator>,
    timeout: Duration,
}

impl std::fmt::Debug for DeviceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceClient")
            .field("socket_dir", &self.configurator.socket_dir())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DeviceClient {
    /// Creates a client for sockets under `socket_dir` using the platform
    /// link backend.
    #[must_use]
    pub fn new(socket_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            configurator: UapiConfigurator::new(socket_dir),
            link: LinkBackend::Auto.build(),
            timeout,
        }
    }

    /// Replaces the link backend.
    #[must_use]
    pub fn with_link(mut self, backend: LinkBackend) -> Self {
        self.link = backend.build();
        self
    }

    /// Per-call deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Reads the live device state.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is unreachable, the reply is malformed
    /// or the call times out.
    pub async fn query(&self, name: &str) -> Result<DeviceInfo, CliError> {
        self.call(name, ApplyStep::Query, self.configurator.query(name))
            .await
    }

    /// Applies a full configuration: every peer is replaced, then addresses
    /// are assigned and the link is brought up unless `skip_link` is set.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first step that failed.
    pub async fn apply(
        &self,
        name: &str,
        config: &NormalizedConfiguration,
        default_mtu: u16,
        skip_link: bool,
    ) -> Result<(), CliError> {
        let link = (!skip_link).then_some(self.link.as_ref());
        apply_configuration(
            name,
            config,
            &self.configurator,
            link,
            default_mtu,
            self.timeout,
        )
        .await
        .map_err(CliError::Device)?;

        info!(interface = %name, peers = config.peers.len(), skip_link, "configuration applied");
        Ok(())
    }

    /// Adds a peer or replaces its allowed IPs. Other peers are untouched.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a bad key or CIDR list, otherwise
    /// the device's failure.
    pub async fn add_peer(
        &self,
        name: &str,
        public_key: &str,
        allowed_ips: &str,
    ) -> Result<(), CliError> {
        let update = apply::upsert_peer(public_key, allowed_ips)?;
        self.push_peer(name, update, "peer upserted").await
    }

    /// Removes a peer. Removing an absent peer succeeds.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed key, otherwise the
    /// device's failure.
    pub async fn remove_peer(&self, name: &str, public_key: &str) -> Result<(), CliError> {
        let update = apply::remove_peer(public_key)?;
        self.push_peer(name, update, "peer removed").await
    }

    async fn push_peer(
        &self,
        name: &str,
        update: PeerUpdate,
        done: &'static str,
    ) -> Result<(), CliError> {
        let key = update.public_key;
        let update = DeviceUpdate::peer(update);
        self.call(name, ApplyStep::Configure, self.configurator.configure(name, &update))
            .await?;
        debug!(interface = %name, peer = %key.short(), "{done}");
        Ok(())
    }

    async fn call<T>(
        &self,
        name: &str,
        step: ApplyStep,
        call: impl Future<Output = claw_wgembed::Result<T>>,
    ) -> Result<T, CliError> {
        apply::run_step(name, step, self.timeout, call)
            .await
            .map_err(CliError::Device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn query_missing_socket_is_device_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let client = DeviceClient::new(dir.path(), Duration::from_secs(1));

        let err = client.query("wg-absent").await.expect_err("no socket");
        match err {
            CliError::Device(inner) => assert_eq!(inner.step(), Some(ApplyStep::Query)),
            other => panic!("expected device error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn skip_link_touches_only_the_device() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (handle, _) = crate::commands::testing::serve("wgctl-client0", dir.path()).await;
        let client =
            DeviceClient::new(dir.path(), Duration::from_secs(2)).with_link(LinkBackend::IpCommand);

        let doc = claw_wgembed::parse(
            "[Interface]\nPrivateKey = wPNV/LaCgF5yx7bAotuxaaQ6jxsy1H7zs8LuNYzOXHQ=\n\
             Address = 10.0.0.1/24\nListenPort = 51901\n",
        )
        .expect("parse");
        let config = claw_wgembed::normalize(&doc).expect("normalize");

        client.apply("wgctl-client0", &config, 1420, true).await.expect("apply");
        assert_eq!(handle.port().await.expect("port"), Some(51901));

        // The memory device has no host link, so the address step fails.
        let err = client
            .apply("wgctl-client0", &config, 1420, false)
            .await
            .expect_err("no host link");
        match err {
            CliError::Device(inner) => assert_eq!(inner.step(), Some(ApplyStep::SetAddress)),
            other => panic!("expected device error, got {other:?}"),
        }
        handle.close().await.expect("close");
    }

    #[tokio::test]
    async fn bad_key_fails_before_connecting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let client = DeviceClient::new(dir.path(), Duration::from_secs(1));

        let err = client.add_peer("wg0", "not-a-key", "10.0.0.2/32").await.expect_err("bad key");
        assert!(matches!(err, CliError::Config(_)));

        let err = client.remove_peer("wg0", "").await.expect_err("empty key");
        assert!(matches!(err, CliError::Config(_)));
    }
}
