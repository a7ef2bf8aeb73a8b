//! Core types shared across the configuration and runtime layers.

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::keys::PublicKey;

/// Names a configuration field in validation errors.
///
/// `Display` yields the key as written in the configuration file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigField {
    /// `[Interface] PrivateKey`.
    PrivateKey,
    /// `[Interface] Address`.
    Address,
    /// `[Interface] ListenPort`.
    ListenPort,
    /// `[Interface] DNS`.
    Dns,
    /// `[Interface] MTU`.
    Mtu,
    /// `[Peer] PublicKey`.
    PublicKey,
    /// `[Peer] PresharedKey`.
    PresharedKey,
    /// `[Peer] AllowedIPs`.
    AllowedIps,
    /// `[Peer] Endpoint`.
    Endpoint,
    /// `[Peer] PersistentKeepalive`.
    PersistentKeepalive,
}

impl ConfigField {
    /// Returns the configuration file key for this field.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::PrivateKey => "PrivateKey",
            Self::Address => "Address",
            Self::ListenPort => "ListenPort",
            Self::Dns => "DNS",
            Self::Mtu => "MTU",
            Self::PublicKey => "PublicKey",
            Self::PresharedKey => "PresharedKey",
            Self::AllowedIps => "AllowedIPs",
            Self::Endpoint => "Endpoint",
            Self::PersistentKeepalive => "PersistentKeepalive",
        }
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Byte counters for a peer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    /// Bytes received from this peer.
    pub rx_bytes: u64,
    /// Bytes transmitted to this peer.
    pub tx_bytes: u64,
}

/// Live, read-only view of a peer as reported by the device.
///
/// Never cached: every call that returns one re-queries the device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// The peer's public key.
    pub public_key: PublicKey,
    /// Configured allowed IPs, in device order.
    pub allowed_ips: Vec<IpNet>,
    /// Current endpoint, if known.
    pub endpoint: Option<SocketAddr>,
    /// Time of the last completed handshake.
    pub last_handshake: Option<SystemTime>,
    /// Persistent keepalive interval.
    pub persistent_keepalive: Option<u16>,
    /// Transfer counters.
    pub transfer: TransferStats,
}

impl PeerRecord {
    /// Creates a record with no traffic and no handshake.
    #[must_use]
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            allowed_ips: Vec::new(),
            endpoint: None,
            last_handshake: None,
            persistent_keepalive: None,
            transfer: TransferStats::default(),
        }
    }

    /// Seconds since the last handshake, if there has been one.
    #[must_use]
    pub fn handshake_age(&self, now: SystemTime) -> Option<Duration> {
        self.last_handshake
            .and_then(|t| now.duration_since(t).ok())
    }

    /// Unix timestamp of the last handshake, if any.
    #[must_use]
    pub fn last_handshake_unix(&self) -> Option<u64> {
        self.last_handshake
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
    }
}

/// Live device state returned by a device query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Interface name.
    pub name: String,
    /// Public key derived from the configured private key.
    pub public_key: Option<PublicKey>,
    /// Listen port (if bound).
    pub listen_port: Option<u16>,
    /// Peers in the order the device reports them.
    pub peers: Vec<PeerRecord>,
}

impl DeviceInfo {
    /// Creates an empty device view.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public_key: None,
            listen_port: None,
            peers: Vec::new(),
        }
    }

    /// Looks up a peer by public key.
    #[must_use]
    pub fn peer(&self, public_key: &PublicKey) -> Option<&PeerRecord> {
        self.peers.iter().find(|p| &p.public_key == public_key)
    }
}
