//! The parsed-but-unvalidated configuration document.
//!
//! Field values are kept as the text the caller wrote. Integers are the only
//! values decoded at parse time; everything else is checked by
//! [`normalize`](crate::config::normalize).

use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// The `[Interface]` section.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSection {
    /// Base64 private key. Empty when the key was not given.
    pub private_key: String,
    /// Interface addresses in CIDR notation, in input order.
    pub addresses: Vec<String>,
    /// Listen port.
    pub listen_port: Option<i64>,
    /// DNS servers, in input order.
    pub dns: Vec<String>,
    /// Link MTU.
    pub mtu: Option<i64>,
}

impl InterfaceSection {
    /// Creates a section with the given private key.
    #[must_use]
    pub fn new(private_key: impl Into<String>) -> Self {
        Self {
            private_key: private_key.into(),
            ..Self::default()
        }
    }

    /// Adds an address.
    #[must_use]
    pub fn with_address(mut self, cidr: impl Into<String>) -> Self {
        self.addresses.push(cidr.into());
        self
    }

    /// Sets the listen port.
    #[must_use]
    pub fn with_listen_port(mut self, port: i64) -> Self {
        self.listen_port = Some(port);
        self
    }

    /// Adds a DNS server.
    #[must_use]
    pub fn with_dns(mut self, server: impl Into<String>) -> Self {
        self.dns.push(server.into());
        self
    }

    /// Sets the MTU.
    #[must_use]
    pub fn with_mtu(mut self, mtu: i64) -> Self {
        self.mtu = Some(mtu);
        self
    }
}

/// One `[Peer]` section.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSection {
    /// Base64 public key. Empty when the key was not given.
    pub public_key: String,
    /// Optional base64 preshared key.
    pub preshared_key: Option<String>,
    /// Allowed IPs in CIDR notation, in input order.
    pub allowed_ips: Vec<String>,
    /// Optional `host:port` endpoint.
    pub endpoint: Option<String>,
    /// Persistent keepalive interval in seconds.
    pub persistent_keepalive: Option<i64>,
}

impl PeerSection {
    /// Creates a peer section with the given public key.
    #[must_use]
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            ..Self::default()
        }
    }

    /// Adds an allowed IP.
    #[must_use]
    pub fn with_allowed_ip(mut self, cidr: impl Into<String>) -> Self {
        self.allowed_ips.push(cidr.into());
        self
    }

    /// Sets the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the preshared key.
    #[must_use]
    pub fn with_preshared_key(mut self, key: impl Into<String>) -> Self {
        self.preshared_key = Some(key.into());
        self
    }

    /// Sets the persistent keepalive interval.
    #[must_use]
    pub fn with_persistent_keepalive(mut self, seconds: i64) -> Self {
        self.persistent_keepalive = Some(seconds);
        self
    }
}

/// A parsed configuration file: at most one interface and any number of
/// independent peers.
///
/// Immutable once produced by the parser; later stages derive new values
/// from it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationDocument {
    /// The `[Interface]` section, if present.
    pub interface: Option<InterfaceSection>,
    /// Every `[Peer]` section, in file order.
    pub peers: Vec<PeerSection>,
}

impl ConfigurationDocument {
    /// Creates a document with the given interface section and no peers.
    #[must_use]
    pub fn new(interface: InterfaceSection) -> Self {
        Self {
            interface: Some(interface),
            peers: Vec::new(),
        }
    }

    /// Adds a peer.
    #[must_use]
    pub fn with_peer(mut self, peer: PeerSection) -> Self {
        self.peers.push(peer);
        self
    }

    /// Parses configuration text.
    ///
    /// # Errors
    ///
    /// Returns a `Parse` error for malformed text.
    pub fn parse(text: &str) -> crate::error::Result<Self> {
        super::parser::parse(text)
    }
}

/// Renders the document in the configuration file format.
///
/// Multi-valued fields are written as one comma-separated line; empty and
/// unset fields are omitted.
impl fmt::Display for ConfigurationDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut output = String::new();

        if let Some(iface) = &self.interface {
            output.push_str("[Interface]\n");
            if !iface.private_key.is_empty() {
                let _ = writeln!(output, "PrivateKey = {}", iface.private_key);
            }
            if !iface.addresses.is_empty() {
                let _ = writeln!(output, "Address = {}", iface.addresses.join(", "));
            }
            if let Some(port) = iface.listen_port {
                let _ = writeln!(output, "ListenPort = {port}");
            }
            if !iface.dns.is_empty() {
                let _ = writeln!(output, "DNS = {}", iface.dns.join(", "));
            }
            if let Some(mtu) = iface.mtu {
                let _ = writeln!(output, "MTU = {mtu}");
            }
        }

        for peer in &self.peers {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str("[Peer]\n");
            if !peer.public_key.is_empty() {
                let _ = writeln!(output, "PublicKey = {}", peer.public_key);
            }
            if let Some(psk) = &peer.preshared_key {
                let _ = writeln!(output, "PresharedKey = {psk}");
            }
            if !peer.allowed_ips.is_empty() {
                let _ = writeln!(output, "AllowedIPs = {}", peer.allowed_ips.join(", "));
            }
            if let Some(endpoint) = &peer.endpoint {
                let _ = writeln!(output, "Endpoint = {endpoint}");
            }
            if let Some(keepalive) = peer.persistent_keepalive {
                let _ = writeln!(output, "PersistentKeepalive = {keepalive}");
            }
        }

        f.write_str(&output)
    }
}
