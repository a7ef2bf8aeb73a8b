//! Validation and normalization of parsed configuration documents.
//!
//! Pure data transformation: no device or link I/O happens here. The only
//! outside lookup is hostname resolution for `Endpoint` values that are not
//! literal socket addresses. [`normalize`] resolves on the calling thread;
//! async callers use [`normalize_async`], which resolves on the runtime under
//! a deadline.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use ipnet::IpNet;
use serde::Serialize;

use crate::config::document::{ConfigurationDocument, InterfaceSection, PeerSection};
use crate::error::{Result, WgEmbedError};
use crate::keys::{PresharedKey, PrivateKey, PublicKey};
use crate::types::ConfigField;
use crate::uapi::{DeviceUpdate, PeerUpdate};

/// A validated peer ready to be applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NormalizedPeer {
    /// Decoded public key.
    pub public_key: PublicKey,
    /// Decoded preshared key.
    #[serde(skip)]
    pub preshared_key: Option<PresharedKey>,
    /// Allowed networks, in input order and multiplicity.
    pub allowed_ips: Vec<IpNet>,
    /// Resolved endpoint.
    pub endpoint: Option<SocketAddr>,
    /// Persistent keepalive interval in seconds.
    pub persistent_keepalive: Option<u16>,
}

impl NormalizedPeer {
    /// Creates a peer with no allowed IPs.
    #[must_use]
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            preshared_key: None,
            allowed_ips: Vec::new(),
            endpoint: None,
            persistent_keepalive: None,
        }
    }

    /// Builds the upsert delta for this peer.
    #[must_use]
    pub fn to_update(&self) -> PeerUpdate {
        PeerUpdate {
            public_key: self.public_key,
            remove: false,
            preshared_key: self.preshared_key.clone(),
            endpoint: self.endpoint,
            persistent_keepalive: self.persistent_keepalive,
            replace_allowed_ips: true,
            allowed_ips: self.allowed_ips.clone(),
        }
    }
}

/// A validated configuration ready to be applied to a device.
///
/// Replaced wholesale on every reconfiguration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NormalizedConfiguration {
    /// Decoded private key.
    #[serde(skip)]
    pub private_key: PrivateKey,
    /// Listen port.
    pub listen_port: Option<u16>,
    /// Link MTU.
    pub mtu: Option<u16>,
    /// Interface addresses, in input order.
    pub addresses: Vec<IpNet>,
    /// DNS servers, in input order.
    pub dns: Vec<IpAddr>,
    /// DNS search domains: `DNS` entries that are not IP addresses.
    pub dns_search: Vec<String>,
    /// Peers, in input order.
    pub peers: Vec<NormalizedPeer>,
}

impl NormalizedConfiguration {
    /// Creates a configuration with only a private key.
    #[must_use]
    pub fn new(private_key: PrivateKey) -> Self {
        Self {
            private_key,
            listen_port: None,
            mtu: None,
            addresses: Vec::new(),
            dns: Vec::new(),
            dns_search: Vec::new(),
            peers: Vec::new(),
        }
    }

    /// Public key derived from the private key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.private_key.public_key()
    }

    /// Builds the full device update: replaces every existing peer.
    #[must_use]
    pub fn to_update(&self) -> DeviceUpdate {
        DeviceUpdate {
            private_key: Some(self.private_key.clone()),
            listen_port: self.listen_port,
            replace_peers: true,
            peers: self.peers.iter().map(NormalizedPeer::to_update).collect(),
        }
    }

    /// Converts back to a document with canonical text values.
    #[must_use]
    pub fn to_document(&self) -> ConfigurationDocument {
        let interface = InterfaceSection {
            private_key: self.private_key.to_base64(),
            addresses: self.addresses.iter().map(ToString::to_string).collect(),
            listen_port: self.listen_port.map(i64::from),
            dns: self
                .dns
                .iter()
                .map(ToString::to_string)
                .chain(self.dns_search.iter().cloned())
                .collect(),
            mtu: self.mtu.map(i64::from),
        };
        let peers = self
            .peers
            .iter()
            .map(|peer| PeerSection {
                public_key: peer.public_key.to_base64(),
                preshared_key: peer.preshared_key.as_ref().map(PresharedKey::to_base64),
                allowed_ips: peer.allowed_ips.iter().map(ToString::to_string).collect(),
                endpoint: peer.endpoint.map(|e| e.to_string()),
                persistent_keepalive: peer.persistent_keepalive.map(i64::from),
            })
            .collect();
        ConfigurationDocument {
            interface: Some(interface),
            peers,
        }
    }
}

/// Key decoding reports through `Protocol`; keep only its message.
fn key_message(error: WgEmbedError) -> String {
    match error {
        WgEmbedError::Protocol(message) => message,
        other => other.to_string(),
    }
}

/// Decodes a base64 public key.
///
/// # Errors
///
/// Returns a `Validation` error on field `PublicKey` naming the input when
/// the text is not base64 or does not decode to exactly 32 bytes.
pub fn parse_public_key(text: &str) -> Result<PublicKey> {
    if text.is_empty() {
        return Err(WgEmbedError::invalid(ConfigField::PublicKey, "missing public key"));
    }
    PublicKey::from_base64(text)
        .map_err(|e| WgEmbedError::invalid_peer(ConfigField::PublicKey, text, key_message(e)))
}

/// Parses one CIDR entry.
fn parse_cidr(field: ConfigField, peer: Option<&str>, text: &str) -> Result<IpNet> {
    text.trim().parse::<IpNet>().map_err(|e| {
        let message = format!("{text}: {e}");
        match peer {
            Some(key) => WgEmbedError::invalid_peer(field, key, message),
            None => WgEmbedError::invalid(field, message),
        }
    })
}

/// Parses a peer's allowed IPs, keeping order and duplicates.
///
/// # Errors
///
/// Returns a `Validation` error on field `AllowedIPs` naming the peer.
pub fn parse_allowed_ips<S: AsRef<str>>(peer: &str, entries: &[S]) -> Result<Vec<IpNet>> {
    entries
        .iter()
        .map(|entry| parse_cidr(ConfigField::AllowedIps, Some(peer), entry.as_ref()))
        .collect()
}

/// Splits and parses a comma-separated allowed IP list. A blank list is
/// empty.
///
/// # Errors
///
/// Returns a `Validation` error on field `AllowedIPs` naming the peer.
pub fn parse_allowed_ip_list(peer: &str, list: &str) -> Result<Vec<IpNet>> {
    if list.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<&str> = list.split(',').map(str::trim).collect();
    parse_allowed_ips(peer, &entries)
}

/// Resolves a `host:port` endpoint to a concrete socket address.
///
/// Literal addresses are used as-is; hostnames take the first address the
/// resolver returns.
///
/// # Errors
///
/// Returns a `Validation` error on field `Endpoint` naming the peer.
pub fn resolve_endpoint(peer: &str, text: &str) -> Result<SocketAddr> {
    if let Ok(addr) = text.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let invalid = |message: String| WgEmbedError::invalid_peer(ConfigField::Endpoint, peer, message);
    let mut addrs = text
        .to_socket_addrs()
        .map_err(|e| invalid(format!("{text}: {e}")))?;
    addrs
        .next()
        .ok_or_else(|| invalid(format!("{text}: no addresses found")))
}

fn to_u16(field: ConfigField, peer: Option<&str>, value: i64) -> Result<u16> {
    u16::try_from(value).map_err(|_| {
        let message = format!("{value} is out of range 0-65535");
        match peer {
            Some(key) => WgEmbedError::invalid_peer(field, key, message),
            None => WgEmbedError::invalid(field, message),
        }
    })
}

/// Looks up a `host:port` endpoint on the runtime, bounded by `timeout`.
async fn lookup_endpoint(peer: &str, text: &str, timeout: Duration) -> Result<SocketAddr> {
    let invalid = |message: String| WgEmbedError::invalid_peer(ConfigField::Endpoint, peer, message);
    let mut addrs = match tokio::time::timeout(timeout, tokio::net::lookup_host(text)).await {
        Ok(Ok(addrs)) => addrs,
        Ok(Err(e)) => return Err(invalid(format!("{text}: {e}"))),
        Err(_) => {
            return Err(WgEmbedError::Timeout {
                operation: format!("resolve endpoint {text}"),
                timeout,
            });
        }
    };
    addrs
        .next()
        .ok_or_else(|| invalid(format!("{text}: no addresses found")))
}

fn normalize_peer<F>(peer: &PeerSection, resolve: &mut F) -> Result<NormalizedPeer>
where
    F: FnMut(&str, &str) -> Result<SocketAddr>,
{
    let public_key = parse_public_key(&peer.public_key)?;
    let key_text = peer.public_key.as_str();

    let preshared_key = peer
        .preshared_key
        .as_deref()
        .map(|psk| {
            PresharedKey::from_base64(psk).map_err(|e| {
                WgEmbedError::invalid_peer(ConfigField::PresharedKey, key_text, key_message(e))
            })
        })
        .transpose()?;

    let allowed_ips = parse_allowed_ips(key_text, &peer.allowed_ips)?;

    let endpoint = peer
        .endpoint
        .as_deref()
        .map(|endpoint| resolve(key_text, endpoint))
        .transpose()?;

    let persistent_keepalive = peer
        .persistent_keepalive
        .map(|value| to_u16(ConfigField::PersistentKeepalive, Some(key_text), value))
        .transpose()?;

    Ok(NormalizedPeer {
        public_key,
        preshared_key,
        allowed_ips,
        endpoint,
        persistent_keepalive,
    })
}

/// Validates a document and produces the normalized configuration.
///
/// Hostname endpoints are resolved with a blocking lookup on the calling
/// thread; inside a runtime use [`normalize_async`].
///
/// # Errors
///
/// Returns a `Validation` error identifying the first offending field (and
/// peer, for peer fields). Peer public keys must be unique.
pub fn normalize(document: &ConfigurationDocument) -> Result<NormalizedConfiguration> {
    normalize_with(document, &mut resolve_endpoint)
}

/// Validates a document like [`normalize`], resolving hostname endpoints on
/// the runtime. Each lookup is bounded by `timeout` and runs only after every
/// other field has validated.
///
/// # Errors
///
/// As [`normalize`], plus `Timeout` when a lookup exceeds `timeout`.
pub async fn normalize_async(
    document: &ConfigurationDocument,
    timeout: Duration,
) -> Result<NormalizedConfiguration> {
    // Hostnames get a placeholder here and are looked up below.
    let mut config = normalize_with(document, &mut |_: &str, text: &str| {
        Ok(text
            .parse::<SocketAddr>()
            .unwrap_or(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))))
    })?;

    for (section, peer) in document.peers.iter().zip(config.peers.iter_mut()) {
        let Some(text) = section.endpoint.as_deref() else {
            continue;
        };
        if text.parse::<SocketAddr>().is_err() {
            peer.endpoint = Some(lookup_endpoint(&section.public_key, text, timeout).await?);
        }
    }
    Ok(config)
}

fn normalize_with<F>(
    document: &ConfigurationDocument,
    resolve: &mut F,
) -> Result<NormalizedConfiguration>
where
    F: FnMut(&str, &str) -> Result<SocketAddr>,
{
    let iface = document.interface.as_ref().ok_or_else(|| {
        WgEmbedError::invalid(ConfigField::PrivateKey, "missing [Interface] section")
    })?;

    if iface.private_key.is_empty() {
        return Err(WgEmbedError::invalid(ConfigField::PrivateKey, "missing private key"));
    }
    let private_key = PrivateKey::from_base64(&iface.private_key)
        .map_err(|e| WgEmbedError::invalid(ConfigField::PrivateKey, key_message(e)))?;

    let addresses = iface
        .addresses
        .iter()
        .map(|addr| parse_cidr(ConfigField::Address, None, addr))
        .collect::<Result<Vec<_>>>()?;

    let listen_port = iface
        .listen_port
        .map(|port| to_u16(ConfigField::ListenPort, None, port))
        .transpose()?;

    let mut dns = Vec::new();
    let mut dns_search = Vec::new();
    for entry in &iface.dns {
        match entry.parse::<IpAddr>() {
            Ok(server) => dns.push(server),
            Err(_) => dns_search.push(entry.clone()),
        }
    }

    let mtu = iface
        .mtu
        .map(|mtu| to_u16(ConfigField::Mtu, None, mtu))
        .transpose()?;

    let mut seen = HashSet::new();
    let mut peers = Vec::with_capacity(document.peers.len());
    for section in &document.peers {
        let peer = normalize_peer(section, resolve)?;
        if !seen.insert(peer.public_key) {
            return Err(WgEmbedError::invalid_peer(
                ConfigField::PublicKey,
                section.public_key.as_str(),
                "duplicate peer",
            ));
        }
        peers.push(peer);
    }

    Ok(NormalizedConfiguration {
        private_key,
        listen_port,
        mtu,
        addresses,
        dns,
        dns_search,
        peers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse;
    use test_case::test_case;

    const PRIVATE: &str = "wPNV/LaCgF5yx7bAotuxaaQ6jxsy1H7zs8LuNYzOXHQ=";
    const PEER_A: &str = "gysKSkCS/VeAyHIAVtf8B/sbQnEd5FYogtj7kO4d4zY=";
    const PEER_B: &str = "bcEwHLic4PW9O3qECsbUWuD4PeU3NfRl5Cmiz+e/p3o=";

    fn base() -> InterfaceSection {
        InterfaceSection::new(PRIVATE)
    }

    #[test]
    fn normalizes_dual_stack_document() {
        let doc = ConfigurationDocument::new(
            base()
                .with_address("10.44.0.1/24")
                .with_address("fd48:4c4:7aa9::1/64")
                .with_listen_port(51820)
                .with_dns("1.1.1.1"),
        )
        .with_peer(
            PeerSection::new(PEER_A)
                .with_allowed_ip("10.44.0.2/32")
                .with_allowed_ip("fd48:4c4:7aa9::2/128")
                .with_endpoint("127.0.0.1:51821")
                .with_persistent_keepalive(25),
        )
        .with_peer(PeerSection::new(PEER_B).with_allowed_ip("10.44.0.3/32"));

        let config = normalize(&doc).expect("normalize");
        assert_eq!(config.private_key.to_base64(), PRIVATE);
        assert_eq!(config.listen_port, Some(51820));
        assert_eq!(config.addresses.len(), 2);
        assert_eq!(config.addresses[1].to_string(), "fd48:4c4:7aa9::1/64");
        assert_eq!(config.dns, vec!["1.1.1.1".parse::<IpAddr>().expect("ip")]);
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.peers[0].public_key.to_base64(), PEER_A);
        assert_eq!(
            config.peers[0].endpoint,
            Some("127.0.0.1:51821".parse().expect("addr"))
        );
        assert_eq!(config.peers[0].persistent_keepalive, Some(25));
        assert_eq!(config.peers[1].public_key.to_base64(), PEER_B);
    }

    #[test]
    fn allowed_ips_keep_order_and_duplicates() {
        let doc = ConfigurationDocument::new(base()).with_peer(
            PeerSection::new(PEER_A)
                .with_allowed_ip("10.0.0.9/32")
                .with_allowed_ip("10.0.0.1/32")
                .with_allowed_ip("10.0.0.9/32"),
        );
        let config = normalize(&doc).expect("normalize");
        let ips: Vec<String> = config.peers[0]
            .allowed_ips
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(ips, vec!["10.0.0.9/32", "10.0.0.1/32", "10.0.0.9/32"]);
    }

    #[test]
    fn bad_allowed_ip_names_field_and_peer() {
        let text = format!(
            "[Interface]\nPrivateKey = {PRIVATE}\n[Peer]\nPublicKey = {PEER_A}\nAllowedIPs = not-a-cidr\n"
        );
        let err = normalize(&parse(&text).expect("parse")).expect_err("should fail");
        match err {
            WgEmbedError::Validation { field, peer, .. } => {
                assert_eq!(field, ConfigField::AllowedIps);
                assert_eq!(peer.as_deref(), Some(PEER_A));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test_case("" ; "missing")]
    #[test_case("not base64!" ; "malformed")]
    #[test_case("AAAAAAAAAAAAAAAAAAAAAA==" ; "sixteen bytes")]
    #[test_case("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=" ; "thirty five bytes")]
    fn bad_private_key_rejected(key: &str) {
        let doc = ConfigurationDocument::new(InterfaceSection::new(key));
        assert_eq!(
            normalize(&doc).expect_err("should fail").field(),
            Some(ConfigField::PrivateKey)
        );
    }

    #[test_case("" ; "missing")]
    #[test_case("AAAAAAAAAAAAAAAAAAAAAA==" ; "sixteen bytes")]
    fn bad_public_key_rejected(key: &str) {
        let doc = ConfigurationDocument::new(base()).with_peer(PeerSection::new(key));
        assert_eq!(
            normalize(&doc).expect_err("should fail").field(),
            Some(ConfigField::PublicKey)
        );
    }

    #[test]
    fn duplicate_peer_keys_rejected() {
        let doc = ConfigurationDocument::new(base())
            .with_peer(PeerSection::new(PEER_A))
            .with_peer(PeerSection::new(PEER_A));
        let err = normalize(&doc).expect_err("should fail");
        assert_eq!(err.field(), Some(ConfigField::PublicKey));
        assert!(err.to_string().contains("duplicate peer"));
    }

    #[test]
    fn missing_interface_rejected() {
        let doc = ConfigurationDocument::default().with_peer(PeerSection::new(PEER_A));
        assert_eq!(
            normalize(&doc).expect_err("should fail").field(),
            Some(ConfigField::PrivateKey)
        );
    }

    #[test_case(base().with_listen_port(70000), ConfigField::ListenPort ; "port too large")]
    #[test_case(base().with_listen_port(-1), ConfigField::ListenPort ; "negative port")]
    #[test_case(base().with_mtu(100_000), ConfigField::Mtu ; "mtu too large")]
    #[test_case(base().with_address("10.0.0.1"), ConfigField::Address ; "address without prefix")]
    #[test_case(base().with_address("10.0.0.1/33"), ConfigField::Address ; "prefix too long")]
    fn bad_interface_fields_rejected(iface: InterfaceSection, field: ConfigField) {
        let doc = ConfigurationDocument::new(iface);
        assert_eq!(normalize(&doc).expect_err("should fail").field(), Some(field));
    }

    #[test]
    fn dns_splits_servers_and_search_domains() {
        let text = format!(
            "[Interface]\nPrivateKey = {PRIVATE}\nDNS = 10.44.0.1, corp.internal, fd00::53\n"
        );
        let config = normalize(&parse(&text).expect("parse")).expect("normalize");
        let servers: Vec<String> = config.dns.iter().map(ToString::to_string).collect();
        assert_eq!(servers, vec!["10.44.0.1", "fd00::53"]);
        assert_eq!(config.dns_search, vec!["corp.internal"]);

        let dns = config.to_document().interface.expect("interface").dns;
        assert_eq!(dns, vec!["10.44.0.1", "fd00::53", "corp.internal"]);
    }

    #[tokio::test]
    async fn async_normalize_resolves_hostnames() {
        let doc = ConfigurationDocument::new(base())
            .with_peer(PeerSection::new(PEER_A).with_endpoint("localhost:51820"))
            .with_peer(PeerSection::new(PEER_B).with_endpoint("192.0.2.7:51821"));
        let config = normalize_async(&doc, Duration::from_secs(5))
            .await
            .expect("normalize");

        let first = config.peers[0].endpoint.expect("endpoint");
        assert!(first.ip().is_loopback());
        assert_eq!(first.port(), 51820);
        assert_eq!(
            config.peers[1].endpoint,
            Some("192.0.2.7:51821".parse().expect("addr"))
        );
    }

    #[tokio::test]
    async fn async_normalize_reports_field_errors_first() {
        let doc = ConfigurationDocument::new(base())
            .with_peer(PeerSection::new(PEER_A).with_endpoint("no-port-here"))
            .with_peer(PeerSection::new(PEER_B).with_allowed_ip("bad"));
        let err = normalize_async(&doc, Duration::from_secs(5))
            .await
            .expect_err("should fail");
        assert_eq!(err.field(), Some(ConfigField::AllowedIps));

        let doc = ConfigurationDocument::new(base())
            .with_peer(PeerSection::new(PEER_A).with_endpoint("no-port-here"));
        let err = normalize_async(&doc, Duration::from_secs(5))
            .await
            .expect_err("should fail");
        assert_eq!(err.field(), Some(ConfigField::Endpoint));
    }

    #[test]
    fn unresolvable_endpoint_is_validation_error() {
        let doc = ConfigurationDocument::new(base())
            .with_peer(PeerSection::new(PEER_A).with_endpoint("no-port-here"));
        let err = normalize(&doc).expect_err("should fail");
        assert_eq!(err.field(), Some(ConfigField::Endpoint));
    }

    #[test]
    fn bracketed_ipv6_endpoint_resolves() {
        let addr = resolve_endpoint(PEER_A, "[fd00::1]:51820").expect("resolve");
        assert_eq!(addr.port(), 51820);
        assert!(addr.is_ipv6());
    }

    #[test]
    fn full_update_replaces_peers() {
        let doc = ConfigurationDocument::new(base().with_listen_port(51820))
            .with_peer(PeerSection::new(PEER_A).with_allowed_ip("10.0.0.2/32"));
        let update = normalize(&doc).expect("normalize").to_update();
        assert!(update.replace_peers);
        assert_eq!(update.listen_port, Some(51820));
        assert_eq!(update.peers.len(), 1);
        assert!(update.peers[0].replace_allowed_ips);
        assert!(!update.peers[0].remove);
    }

    #[test]
    fn allowed_ip_list_splits_commas() {
        let ips = parse_allowed_ip_list(PEER_A, "10.0.0.2/32, fd00::2/128").expect("parse");
        assert_eq!(ips.len(), 2);
        assert!(parse_allowed_ip_list(PEER_A, "10.0.0.2/32,").is_err());
        assert!(parse_allowed_ip_list(PEER_A, " ").expect("blank").is_empty());
    }

    mod proptest_tests {
        use super::*;
        use crate::keys::KEY_SIZE;
        use proptest::prelude::*;
        use std::net::Ipv4Addr;

        fn key_text() -> impl Strategy<Value = String> {
            prop::array::uniform32(any::<u8>())
                .prop_map(|bytes| PublicKey::from_bytes_array(bytes).to_base64())
        }

        fn cidr_v4() -> impl Strategy<Value = String> {
            (any::<u32>(), 0u8..=32).prop_map(|(ip, prefix)| {
                format!("{}/{prefix}", Ipv4Addr::from(ip))
            })
        }

        fn peer_section() -> impl Strategy<Value = PeerSection> {
            (
                key_text(),
                prop::collection::vec(cidr_v4(), 0..4),
                prop::option::of((any::<u32>(), 1u16..)),
                prop::option::of(0i64..=65535),
            )
                .prop_map(|(key, ips, endpoint, keepalive)| PeerSection {
                    public_key: key,
                    preshared_key: None,
                    allowed_ips: ips,
                    endpoint: endpoint.map(|(ip, port)| format!("{}:{port}", Ipv4Addr::from(ip))),
                    persistent_keepalive: keepalive,
                })
        }

        fn document() -> impl Strategy<Value = ConfigurationDocument> {
            (
                prop::array::uniform32(any::<u8>()),
                prop::collection::vec(cidr_v4(), 0..3),
                prop::option::of(0i64..=65535),
                prop::collection::vec(peer_section(), 0..4),
            )
                .prop_map(|(private, addresses, port, peers)| ConfigurationDocument {
                    interface: Some(InterfaceSection {
                        private_key: PrivateKey::from_bytes_array(private).to_base64(),
                        addresses,
                        listen_port: port,
                        dns: Vec::new(),
                        mtu: None,
                    }),
                    peers,
                })
        }

        proptest! {
            #[test]
            fn serialize_parse_roundtrip(doc in document()) {
                let reparsed = parse(&doc.to_string()).expect("reparse");
                prop_assert_eq!(&reparsed, &doc);
                // Random keys may collide only with negligible probability.
                prop_assert_eq!(normalize(&reparsed).ok(), normalize(&doc).ok());
            }

            #[test]
            fn wrong_length_peer_key_rejected(len in 0usize..64) {
                prop_assume!(len != KEY_SIZE);
                use base64::Engine;
                let key = base64::engine::general_purpose::STANDARD.encode(vec![1u8; len]);
                let doc = ConfigurationDocument::new(base()).with_peer(PeerSection::new(key));
                prop_assert_eq!(
                    normalize(&doc).err().and_then(|e| e.field()),
                    Some(ConfigField::PublicKey)
                );
            }
        }
    }
}
