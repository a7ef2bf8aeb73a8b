//! In-process tunnel engine.
//!
//! [`MemoryEngine`] keeps device state in memory and answers the userspace
//! control protocol exactly like a packet-processing engine would, without
//! moving any packets or allocating a host link. It backs tests, dry runs and
//! demos.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, info};

use crate::device::{BoxFuture, TunnelEngine};
use crate::error::{Result, WgEmbedError};
use crate::keys::{PresharedKey, PrivateKey, PublicKey};
use crate::types::{DeviceInfo, PeerRecord, TransferStats};
use crate::uapi::{self, DeviceUpdate, EINVAL, EIO, PeerUpdate, Request};

#[derive(Default)]
struct DeviceState {
    private_key: Option<PrivateKey>,
    listen_port: Option<u16>,
    peers: Vec<PeerState>,
}

struct PeerState {
    record: PeerRecord,
    preshared_key: Option<PresharedKey>,
}

impl DeviceState {
    fn apply(&mut self, update: DeviceUpdate) {
        if let Some(key) = update.private_key {
            self.private_key = Some(key);
        }
        if let Some(port) = update.listen_port {
            self.listen_port = Some(port);
        }
        if update.replace_peers {
            self.peers.clear();
        }
        for peer in update.peers {
            self.apply_peer(peer);
        }
    }

    fn apply_peer(&mut self, update: PeerUpdate) {
        let position = self
            .peers
            .iter()
            .position(|p| p.record.public_key == update.public_key);

        if update.remove {
            if let Some(index) = position {
                self.peers.remove(index);
            }
            return;
        }

        let index = position.unwrap_or_else(|| {
            self.peers.push(PeerState {
                record: PeerRecord::new(update.public_key),
                preshared_key: None,
            });
            self.peers.len() - 1
        });
        let peer = &mut self.peers[index];

        if let Some(psk) = update.preshared_key {
            peer.preshared_key = (!psk.is_zero()).then_some(psk);
        }
        if let Some(endpoint) = update.endpoint {
            peer.record.endpoint = Some(endpoint);
        }
        if let Some(interval) = update.persistent_keepalive {
            peer.record.persistent_keepalive = (interval != 0).then_some(interval);
        }
        if update.replace_allowed_ips {
            peer.record.allowed_ips.clear();
        }
        peer.record.allowed_ips.extend(update.allowed_ips);
    }

    fn records(&self) -> Vec<PeerRecord> {
        self.peers.iter().map(|p| p.record.clone()).collect()
    }
}

/// Tunnel engine that keeps every device in memory.
///
/// Cloning shares the device table.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    devices: Arc<Mutex<HashMap<String, DeviceState>>>,
}

impl MemoryEngine {
    /// Creates an engine with no devices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a device named `name` exists.
    #[must_use]
    pub fn has_device(&self, name: &str) -> bool {
        self.devices.lock().contains_key(name)
    }

    /// Number of live devices.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.lock().len()
    }

    /// Snapshot of a device's state.
    #[must_use]
    pub fn snapshot(&self, name: &str) -> Option<DeviceInfo> {
        let devices = self.devices.lock();
        devices.get(name).map(|state| DeviceInfo {
            name: name.to_string(),
            public_key: state.private_key.as_ref().map(PrivateKey::public_key),
            listen_port: state.listen_port,
            peers: state.records(),
        })
    }

    /// Records a handshake and traffic for a peer, as packet processing would.
    ///
    /// Returns false if the device or peer does not exist.
    pub fn record_traffic(
        &self,
        name: &str,
        peer: &PublicKey,
        at: SystemTime,
        transfer: TransferStats,
    ) -> bool {
        let mut devices = self.devices.lock();
        let Some(state) = devices.get_mut(name) else {
            return false;
        };
        let Some(peer) = state.peers.iter_mut().find(|p| &p.record.public_key == peer) else {
            return false;
        };
        peer.record.last_handshake = Some(at);
        peer.record.transfer.rx_bytes = peer.record.transfer.rx_bytes.saturating_add(transfer.rx_bytes);
        peer.record.transfer.tx_bytes = peer.record.transfer.tx_bytes.saturating_add(transfer.tx_bytes);
        true
    }

    /// Handles one decoded request and returns the response text.
    fn respond(&self, name: &str, request: Request) -> String {
        let mut devices = self.devices.lock();
        let Some(state) = devices.get_mut(name) else {
            return uapi::encode_errno(EIO);
        };
        match request {
            Request::Get => uapi::encode_get_response(
                state.private_key.as_ref(),
                state.listen_port,
                &state.records(),
            ),
            Request::Set(update) => {
                debug!(
                    interface = %name,
                    peers = update.peers.len(),
                    replace_peers = update.replace_peers,
                    "applying update"
                );
                state.apply(update);
                uapi::encode_errno(0)
            }
        }
    }
}

impl TunnelEngine for MemoryEngine {
    fn creates_os_link(&self) -> bool {
        false
    }

    fn create_device<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut devices = self.devices.lock();
            if devices.contains_key(name) {
                return Err(WgEmbedError::creation(name, "device already exists"));
            }
            devices.insert(name.to_string(), DeviceState::default());
            info!(interface = %name, "created in-memory device");
            Ok(())
        })
    }

    fn serve_connection<'a>(
        &'a self,
        name: &'a str,
        mut stream: UnixStream,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut request = String::new();
            stream.read_to_string(&mut request).await?;

            let response = match Request::decode(&request) {
                Ok(request) => self.respond(name, request),
                Err(e) => {
                    debug!(interface = %name, error = %e, "rejecting control request");
                    uapi::encode_errno(EINVAL)
                }
            };

            stream.write_all(response.as_bytes()).await?;
            stream.shutdown().await?;
            Ok(())
        })
    }

    fn close_device<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.devices.lock().remove(name).is_some() {
                info!(interface = %name, "closed in-memory device");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipnet::IpNet;

    fn key(byte: u8) -> PublicKey {
        PublicKey::from_bytes_array([byte; 32])
    }

    fn nets(items: &[&str]) -> Vec<IpNet> {
        items.iter().map(|s| s.parse().expect("cidr")).collect()
    }

    fn engine_with(name: &str) -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine
            .devices
            .lock()
            .insert(name.to_string(), DeviceState::default());
        engine
    }

    fn apply(engine: &MemoryEngine, name: &str, update: DeviceUpdate) {
        let response = engine.respond(name, Request::Set(update));
        assert_eq!(response, "errno=0\n\n");
    }

    #[test]
    fn allocates_no_os_link() {
        assert!(!MemoryEngine::new().creates_os_link());
    }

    #[tokio::test]
    async fn create_twice_fails() {
        let engine = MemoryEngine::new();
        engine.create_device("wg0").await.expect("create");
        let err = engine.create_device("wg0").await.expect_err("should fail");
        assert!(matches!(err, WgEmbedError::DeviceCreation { .. }));
        engine.close_device("wg0").await.expect("close");
        assert!(!engine.has_device("wg0"));
        engine.close_device("wg0").await.expect("close again");
    }

    #[test]
    fn upsert_replaces_allowed_ips() {
        let engine = engine_with("wg0");
        apply(&engine, "wg0", DeviceUpdate::peer(PeerUpdate::upsert(key(1), nets(&["10.0.0.1/32"]))));
        apply(&engine, "wg0", DeviceUpdate::peer(PeerUpdate::upsert(key(1), nets(&["10.0.0.9/32"]))));

        let info = engine.snapshot("wg0").expect("device");
        assert_eq!(info.peers.len(), 1);
        assert_eq!(info.peers[0].allowed_ips, nets(&["10.0.0.9/32"]));
    }

    #[test]
    fn replace_peers_drops_existing() {
        let engine = engine_with("wg0");
        apply(&engine, "wg0", DeviceUpdate::peer(PeerUpdate::upsert(key(1), Vec::new())));
        apply(
            &engine,
            "wg0",
            DeviceUpdate {
                replace_peers: true,
                peers: vec![
                    PeerUpdate::upsert(key(3), Vec::new()),
                    PeerUpdate::upsert(key(2), Vec::new()),
                ],
                ..DeviceUpdate::default()
            },
        );
        let keys: Vec<PublicKey> = engine
            .snapshot("wg0")
            .expect("device")
            .peers
            .iter()
            .map(|p| p.public_key)
            .collect();
        assert_eq!(keys, vec![key(3), key(2)]);
    }

    #[test]
    fn remove_absent_peer_is_noop() {
        let engine = engine_with("wg0");
        apply(&engine, "wg0", DeviceUpdate::peer(PeerUpdate::remove(key(7))));
        assert!(engine.snapshot("wg0").expect("device").peers.is_empty());
    }

    #[test]
    fn unknown_device_returns_eio() {
        let engine = MemoryEngine::new();
        assert_eq!(engine.respond("nope", Request::Get), uapi::encode_errno(EIO));
    }

    #[test]
    fn traffic_is_reported() {
        let engine = engine_with("wg0");
        apply(&engine, "wg0", DeviceUpdate::peer(PeerUpdate::upsert(key(1), Vec::new())));
        let stats = TransferStats {
            rx_bytes: 100,
            tx_bytes: 50,
        };
        assert!(engine.record_traffic("wg0", &key(1), SystemTime::now(), stats));
        assert!(!engine.record_traffic("wg0", &key(2), SystemTime::now(), stats));

        let info = engine.snapshot("wg0").expect("device");
        assert_eq!(info.peers[0].transfer, stats);
        assert!(info.peers[0].last_handshake.is_some());
    }

    #[tokio::test]
    async fn serves_control_connection() {
        let engine = engine_with("wg0");
        let (mut client, server) = UnixStream::pair().expect("pair");

        let serving = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.serve_connection("wg0", server).await })
        };

        let update = DeviceUpdate {
            listen_port: Some(51820),
            ..DeviceUpdate::default()
        };
        client.write_all(update.encode().as_bytes()).await.expect("write");
        client.shutdown().await.expect("shutdown");
        let mut response = String::new();
        client.read_to_string(&mut response).await.expect("read");

        assert_eq!(response, "errno=0\n\n");
        serving.await.expect("join").expect("serve");
        assert_eq!(engine.snapshot("wg0").expect("device").listen_port, Some(51820));
    }

    #[tokio::test]
    async fn malformed_request_returns_einval() {
        let engine = engine_with("wg0");
        let (mut client, server) = UnixStream::pair().expect("pair");
        let serving = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.serve_connection("wg0", server).await })
        };

        client.write_all(b"set=1\nbogus=1\n\n").await.expect("write");
        client.shutdown().await.expect("shutdown");
        let mut response = String::new();
        client.read_to_string(&mut response).await.expect("read");

        assert_eq!(response, uapi::encode_errno(EINVAL));
        serving.await.expect("join").expect("serve");
    }
}
