//! Collaborator capabilities consumed by an interface handle.
//!
//! Three seams separate this crate from the host:
//!
//! - [`TunnelEngine`] allocates device state and processes control connections.
//! - [`DeviceConfigurator`] pushes updates into a running device and reads its
//!   live state back.
//! - [`LinkConfigurator`] assigns addresses and sets link state.
//!
//! `UapiConfigurator` is the control-socket implementation of
//! [`DeviceConfigurator`] and works against any engine that serves the
//! userspace control protocol. Control sockets are Unix domain sockets, so
//! it and [`TunnelEngine`] exist only on Unix targets.

use std::future::Future;
#[cfg(unix)]
use std::path::{Path, PathBuf};
use std::pin::Pin;

use ipnet::IpNet;
#[cfg(unix)]
use tokio::io::{AsyncReadExt, AsyncWriteExt};
#[cfg(unix)]
use tokio::net::UnixStream;
#[cfg(unix)]
use tracing::trace;

use crate::error::Result;
#[cfg(unix)]
use crate::error::WgEmbedError;
use crate::types::DeviceInfo;
use crate::uapi::DeviceUpdate;
#[cfg(unix)]
use crate::uapi::{self, GET_REQUEST};

/// Boxed future returned by the capability traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// File name of the control socket for an interface.
#[must_use]
pub fn socket_file_name(name: &str) -> String {
    format!("{name}.sock")
}

/// The tunnel engine behind a device: owns key exchange and packet I/O.
///
/// Implementations must be dyn-compatible so the engine can be selected at
/// runtime.
#[cfg(unix)]
pub trait TunnelEngine: Send + Sync {
    /// Returns true if [`create_device`](Self::create_device) allocates a
    /// host network link that addresses can be assigned to.
    fn creates_os_link(&self) -> bool {
        true
    }

    /// Allocates device state for `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device already exists or cannot be allocated.
    fn create_device<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Processes one accepted control connection for `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails before a response is sent.
    fn serve_connection<'a>(&'a self, name: &'a str, stream: UnixStream)
    -> BoxFuture<'a, Result<()>>;

    /// Releases device state for `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be released.
    fn close_device<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Pushes configuration into a running device and reads live state back.
pub trait DeviceConfigurator: Send + Sync {
    /// Applies a full configuration or a delta.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is unreachable or rejects the update.
    fn configure<'a>(&'a self, name: &'a str, update: &'a DeviceUpdate)
    -> BoxFuture<'a, Result<()>>;

    /// Reads the live device state.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is unreachable or the reply is malformed.
    fn query<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<DeviceInfo>>;
}

/// Sets OS-level link state for an interface.
///
/// Implementations on platforms without privileged network access are
/// no-ops that return success.
pub trait LinkConfigurator: Send + Sync {
    /// Assigns an address to the interface. Assigning an address that is
    /// already present succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the host rejects the address.
    fn set_address<'a>(&'a self, name: &'a str, address: &'a IpNet) -> BoxFuture<'a, Result<()>>;

    /// Sets the MTU and brings the link up.
    ///
    /// # Errors
    ///
    /// Returns an error if the host rejects the change.
    fn set_link_up<'a>(&'a self, name: &'a str, mtu: u16) -> BoxFuture<'a, Result<()>>;
}

/// Drives devices over their control sockets in a directory.
#[cfg(unix)]
#[derive(Clone, Debug)]
pub struct UapiConfigurator {
    socket_dir: PathBuf,
}

#[cfg(unix)]
impl UapiConfigurator {
    /// Creates a configurator for sockets under `socket_dir`.
    #[must_use]
    pub fn new(socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            socket_dir: socket_dir.into(),
        }
    }

    /// Directory holding the control sockets.
    #[must_use]
    pub fn socket_dir(&self) -> &Path {
        &self.socket_dir
    }

    /// Control socket path for `name`.
    #[must_use]
    pub fn socket_path(&self, name: &str) -> PathBuf {
        self.socket_dir.join(socket_file_name(name))
    }

    /// Sends one request and returns the raw response.
    async fn exchange(&self, name: &str, request: &str) -> Result<String> {
        let path = self.socket_path(name);
        let mut stream = UnixStream::connect(&path).await?;
        stream.write_all(request.as_bytes()).await?;
        stream.shutdown().await?;

        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        trace!(interface = %name, bytes = response.len(), "control response received");
        Ok(response)
    }
}

#[cfg(unix)]
impl DeviceConfigurator for UapiConfigurator {
    fn configure<'a>(
        &'a self,
        name: &'a str,
        update: &'a DeviceUpdate,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let response = self.exchange(name, &update.encode()).await?;
            match uapi::response_errno(&response)? {
                0 => Ok(()),
                errno => Err(WgEmbedError::Protocol(format!(
                    "device rejected update with errno={errno}"
                ))),
            }
        })
    }

    fn query<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<DeviceInfo>> {
        Box::pin(async move {
            let response = self.exchange(name, GET_REQUEST).await?;
            uapi::decode_get_response(name, &response)
        })
    }
}
