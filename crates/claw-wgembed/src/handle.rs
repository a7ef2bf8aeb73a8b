//! Running interface handles.
//!
//! An [`InterfaceHandle`] owns one running tunnel interface:
//!
//! ```text
//! create ──▶ Created ──load_configuration──▶ Configured ⟲ load_configuration
//!               │                                 │
//!               └────────────── close ────────────┴──▶ Closed
//! ```
//!
//! Creation reserves the interface name for the whole process, allocates the
//! device in the tunnel engine, binds the control socket and starts the
//! accept loop. Closing releases them in the reverse order.

use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::apply;
use crate::config::{self, ConfigurationDocument, NormalizedConfiguration, normalize_async};
use crate::device::{
    BoxFuture, DeviceConfigurator, LinkConfigurator, TunnelEngine, UapiConfigurator,
};
use crate::error::{ApplyStep, Result, WgEmbedError};
use crate::interface::{InterfaceOptions, InterfaceState, MAX_NAME_LEN, WireGuardInterface};
use crate::keys::PublicKey;
use crate::types::{DeviceInfo, PeerRecord};

static ACTIVE_NAMES: Lazy<parking_lot::Mutex<HashSet<String>>> =
    Lazy::new(|| parking_lot::Mutex::new(HashSet::new()));

/// Process-wide reservation of an interface name, released on drop.
#[derive(Debug)]
struct NameLease(String);

impl NameLease {
    fn acquire(name: &str) -> Result<Self> {
        if ACTIVE_NAMES.lock().insert(name.to_string()) {
            Ok(Self(name.to_string()))
        } else {
            Err(WgEmbedError::creation(name, "interface name already in use"))
        }
    }
}

impl Drop for NameLease {
    fn drop(&mut self) {
        ACTIVE_NAMES.lock().remove(&self.0);
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(WgEmbedError::creation(name, "interface name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(WgEmbedError::creation(
            name,
            format!("interface name longer than {MAX_NAME_LEN} bytes"),
        ));
    }
    if name
        .chars()
        .any(|c| c == '/' || c == ':' || c.is_whitespace() || c.is_control())
    {
        return Err(WgEmbedError::creation(name, "interface name has invalid characters"));
    }
    Ok(())
}

pub(crate) struct Lifecycle {
    state: InterfaceState,
    applied: Option<NormalizedConfiguration>,
    accept_task: Option<JoinHandle<()>>,
    lease: Option<NameLease>,
}

/// A running tunnel interface.
///
/// Every mutation holds the handle's lock until the device acknowledges it,
/// so concurrent callers are applied one at a time. Reads re-query the
/// device on every call.
pub struct InterfaceHandle {
    name: String,
    options: InterfaceOptions,
    socket_path: PathBuf,
    engine: Arc<dyn TunnelEngine>,
    device: Arc<dyn DeviceConfigurator>,
    link: Arc<dyn LinkConfigurator>,
    lifecycle: Mutex<Lifecycle>,
    closed: watch::Sender<bool>,
}

impl std::fmt::Debug for InterfaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceHandle")
            .field("name", &self.name)
            .field("socket_path", &self.socket_path)
            .field("closed", &*self.closed.borrow())
            .finish_non_exhaustive()
    }
}

impl InterfaceHandle {
    /// Creates an interface driven over its control socket, with the link
    /// backend selected by `options`. Under
    /// [`LinkBackend::Auto`](crate::LinkBackend::Auto), engines that
    /// allocate no host link get the no-op backend.
    ///
    /// # Errors
    ///
    /// Returns `DeviceCreation` if the name is invalid or in use, or the
    /// device or control socket cannot be allocated.
    pub async fn create(
        name: &str,
        engine: Arc<dyn TunnelEngine>,
        options: InterfaceOptions,
    ) -> Result<Self> {
        let device = Arc::new(UapiConfigurator::new(&options.socket_dir));
        let link = options.link.build_for(engine.creates_os_link());
        Self::create_with(name, engine, device, link, options).await
    }

    /// Creates an interface with explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns `DeviceCreation` if the name is invalid or in use, or the
    /// device or control socket cannot be allocated.
    pub async fn create_with(
        name: &str,
        engine: Arc<dyn TunnelEngine>,
        device: Arc<dyn DeviceConfigurator>,
        link: Arc<dyn LinkConfigurator>,
        options: InterfaceOptions,
    ) -> Result<Self> {
        validate_name(name)?;
        let lease = NameLease::acquire(name)?;
        let timeout = options.operation_timeout;

        match tokio::time::timeout(timeout, engine.create_device(name)).await {
            Ok(Ok(())) => {}
            Ok(Err(e @ WgEmbedError::DeviceCreation { .. })) => return Err(e),
            Ok(Err(e)) => return Err(WgEmbedError::creation(name, e.to_string())),
            Err(_) => return Err(timeout_error(format!("create device '{name}'"), timeout)),
        }

        let socket_path = options.socket_path(name);
        let listener = match bind_control_socket(&socket_path).await {
            Ok(listener) => listener,
            Err(reason) => {
                // Roll back the device; the lease drops with this scope.
                if let Err(e) = engine.close_device(name).await {
                    warn!(interface = %name, error = %e, "failed to release device after bind failure");
                }
                return Err(WgEmbedError::creation(name, reason));
            }
        };

        let accept_task = tokio::spawn(accept_loop(
            listener,
            name.to_string(),
            Arc::clone(&engine),
        ));

        info!(interface = %name, socket = %socket_path.display(), "interface created");

        let (closed, _) = watch::channel(false);
        Ok(Self {
            name: name.to_string(),
            options,
            socket_path,
            engine,
            device,
            link,
            lifecycle: Mutex::new(Lifecycle {
                state: InterfaceState::Created,
                applied: None,
                accept_task: Some(accept_task),
                lease: Some(lease),
            }),
            closed,
        })
    }

    /// Interface name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Options the handle was created with.
    #[must_use]
    pub fn options(&self) -> &InterfaceOptions {
        &self.options
    }

    /// Path of the control socket.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> InterfaceState {
        self.lifecycle.lock().await.state
    }

    /// Returns true once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// The last configuration successfully applied.
    pub async fn config(&self) -> Option<NormalizedConfiguration> {
        self.lifecycle.lock().await.applied.clone()
    }

    /// Queries the live device state.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close, or the query failure.
    pub async fn device(&self) -> Result<DeviceInfo> {
        self.ensure_open()?;
        self.query().await
    }

    /// Public key of the running device.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close, or the query failure.
    pub async fn public_key(&self) -> Result<Option<PublicKey>> {
        Ok(self.device().await?.public_key)
    }

    /// Listen port of the running device.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close, or the query failure.
    pub async fn port(&self) -> Result<Option<u16>> {
        Ok(self.device().await?.listen_port)
    }

    /// Resolves once the handle has been closed.
    pub async fn wait(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives as long as `self`, so this only ends on close.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Validates and applies a configuration document.
    ///
    /// The device receives the full configuration with every previous peer
    /// replaced, then each address is assigned and the link is brought up
    /// with the configured MTU. A failure stops at the failing step and is
    /// not rolled back.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for bad input, `Closed` after close, or a
    /// `DeviceConfiguration`/`Timeout` error naming the failed step.
    pub async fn load_configuration(&self, document: &ConfigurationDocument) -> Result<()> {
        let config = normalize_async(document, self.options.operation_timeout).await?;
        self.apply(config).await
    }

    /// Reads, validates and applies a configuration file.
    ///
    /// # Errors
    ///
    /// As [`load_configuration`](Self::load_configuration), plus `Io` and
    /// `Parse` errors from reading the file.
    pub async fn load_config_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let document = config::read_document(path).await?;
        self.load_configuration(&document).await
    }

    async fn apply(&self, config: NormalizedConfiguration) -> Result<()> {
        let mut lifecycle = self.lock_open().await?;

        apply::apply_configuration(
            &self.name,
            &config,
            self.device.as_ref(),
            Some(self.link.as_ref()),
            self.options.mtu,
            self.options.operation_timeout,
        )
        .await?;

        info!(
            interface = %self.name,
            public_key = %config.public_key().short(),
            listen_port = ?config.listen_port,
            peers = config.peers.len(),
            addresses = config.addresses.len(),
            "configuration applied"
        );
        lifecycle.applied = Some(config);
        lifecycle.state = InterfaceState::Configured;
        Ok(())
    }

    /// Releases the interface.
    ///
    /// Stops the accept loop, removes the control socket, releases the
    /// device and frees the name. A second call is a successful no-op.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if releasing the device fails; the handle
    /// is closed either way.
    pub async fn close(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.state == InterfaceState::Closed {
            debug!(interface = %self.name, "close on closed interface");
            return Ok(());
        }
        lifecycle.state = InterfaceState::Closed;

        if let Some(task) = lifecycle.accept_task.take() {
            task.abort();
        }
        remove_socket(&self.socket_path);

        let timeout = self.options.operation_timeout;
        let released = match tokio::time::timeout(timeout, self.engine.close_device(&self.name)).await
        {
            Ok(result) => result,
            Err(_) => Err(timeout_error(format!("close device '{}'", self.name), timeout)),
        };

        drop(lifecycle.lease.take());
        self.closed.send_replace(true);
        info!(interface = %self.name, "interface closed");
        released
    }

    /// Fails with `Closed` once the handle has been closed.
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(WgEmbedError::Closed(self.name.clone()))
        } else {
            Ok(())
        }
    }

    /// Takes the mutation lock, failing if the handle is closed.
    pub(crate) async fn lock_open(&self) -> Result<MutexGuard<'_, Lifecycle>> {
        let lifecycle = self.lifecycle.lock().await;
        if lifecycle.state == InterfaceState::Closed {
            return Err(WgEmbedError::Closed(self.name.clone()));
        }
        Ok(lifecycle)
    }

    /// Runs one external call under the operation deadline.
    pub(crate) async fn run_step<T>(
        &self,
        step: ApplyStep,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        apply::run_step(&self.name, step, self.options.operation_timeout, call).await
    }

    /// Pushes a delta or full update to the device.
    pub(crate) async fn push(&self, update: &crate::uapi::DeviceUpdate) -> Result<()> {
        self.run_step(ApplyStep::Configure, self.device.configure(&self.name, update))
            .await
    }

    /// Reads the live device state.
    pub(crate) async fn query(&self) -> Result<DeviceInfo> {
        self.run_step(ApplyStep::Query, self.device.query(&self.name))
            .await
    }
}

/// An unclosed handle releases its device on a background task and frees the
/// name once the device is gone. Outside a runtime the device cannot be
/// released, so the name stays reserved.
impl Drop for InterfaceHandle {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut();
        if lifecycle.state == InterfaceState::Closed {
            return;
        }
        if let Some(task) = lifecycle.accept_task.take() {
            task.abort();
        }
        remove_socket(&self.socket_path);

        let lease = lifecycle.lease.take();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(interface = %self.name, "interface dropped outside a runtime; device not released");
            std::mem::forget(lease);
            return;
        };

        warn!(interface = %self.name, "interface dropped without close; releasing device");
        let engine = Arc::clone(&self.engine);
        let name = self.name.clone();
        let timeout = self.options.operation_timeout;
        runtime.spawn(async move {
            match tokio::time::timeout(timeout, engine.close_device(&name)).await {
                Ok(Ok(())) => debug!(interface = %name, "device released after drop"),
                Ok(Err(e)) => warn!(interface = %name, error = %e, "failed to release dropped device"),
                Err(_) => warn!(interface = %name, "timed out releasing dropped device"),
            }
            drop(lease);
        });
    }
}

fn timeout_error(operation: String, timeout: Duration) -> WgEmbedError {
    WgEmbedError::Timeout { operation, timeout }
}

fn remove_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(socket = %path.display(), error = %e, "failed to remove control socket"),
    }
}

/// Binds the control socket, replacing a stale socket file left by a dead
/// process. A socket that still accepts connections is in use.
async fn bind_control_socket(path: &Path) -> std::result::Result<UnixListener, String> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| format!("failed to create {}: {e}", dir.display()))?;
    }

    if tokio::fs::symlink_metadata(path).await.is_ok() {
        if UnixStream::connect(path).await.is_ok() {
            return Err(format!("control socket {} is in use", path.display()));
        }
        debug!(socket = %path.display(), "removing stale control socket");
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| format!("failed to remove stale socket {}: {e}", path.display()))?;
    }

    UnixListener::bind(path).map_err(|e| format!("failed to bind {}: {e}", path.display()))
}

/// Hands every accepted control connection to the engine on its own task.
async fn accept_loop(listener: UnixListener, name: String, engine: Arc<dyn TunnelEngine>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let engine = Arc::clone(&engine);
                let name = name.clone();
                tokio::spawn(async move {
                    if let Err(e) = engine.serve_connection(&name, stream).await {
                        debug!(interface = %name, error = %e, "control connection failed");
                    }
                });
            }
            Err(e) => {
                warn!(interface = %name, error = %e, "control accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

impl WireGuardInterface for InterfaceHandle {
    fn name(&self) -> &str {
        InterfaceHandle::name(self)
    }

    fn load_configuration<'a>(
        &'a self,
        document: &'a ConfigurationDocument,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(InterfaceHandle::load_configuration(self, document))
    }

    fn add_peer<'a>(
        &'a self,
        public_key: &'a str,
        allowed_ips: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(InterfaceHandle::add_peer(self, public_key, allowed_ips))
    }

    fn remove_peer<'a>(&'a self, public_key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(InterfaceHandle::remove_peer(self, public_key))
    }

    fn list_peers(&self) -> BoxFuture<'_, Result<Vec<PeerRecord>>> {
        Box::pin(InterfaceHandle::list_peers(self))
    }

    fn public_key(&self) -> BoxFuture<'_, Result<Option<PublicKey>>> {
        Box::pin(InterfaceHandle::public_key(self))
    }

    fn port(&self) -> BoxFuture<'_, Result<Option<u16>>> {
        Box::pin(InterfaceHandle::port(self))
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(InterfaceHandle::close(self))
    }

    fn has_peer<'a>(&'a self, public_key: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(InterfaceHandle::has_peer(self, public_key))
    }

    fn peer<'a>(&'a self, public_key: &'a str) -> BoxFuture<'a, Result<PeerRecord>> {
        Box::pin(InterfaceHandle::peer(self, public_key))
    }
}
