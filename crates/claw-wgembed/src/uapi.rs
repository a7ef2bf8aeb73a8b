//! Userspace control protocol codec.
//!
//! Devices are driven over a Unix socket with newline-delimited `key=value`
//! messages. A request starts with `set=1` or `get=1` and ends with a blank
//! line; every response ends with `errno=N` and a blank line. Keys travel as
//! lowercase hex.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ipnet::IpNet;

use crate::error::{Result, WgEmbedError};
use crate::keys::{PresharedKey, PrivateKey, PublicKey};
use crate::types::{DeviceInfo, PeerRecord};

/// Errno reported for a malformed or rejected request.
pub const EINVAL: i32 = 22;

/// Errno reported for an I/O failure inside the engine.
pub const EIO: i32 = 5;

/// A change to one peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerUpdate {
    /// The peer the update applies to.
    pub public_key: PublicKey,
    /// Remove the peer instead of updating it.
    pub remove: bool,
    /// New preshared key.
    pub preshared_key: Option<PresharedKey>,
    /// New endpoint.
    pub endpoint: Option<SocketAddr>,
    /// New persistent keepalive interval; `Some(0)` disables it.
    pub persistent_keepalive: Option<u16>,
    /// Clear the existing allowed IPs before adding `allowed_ips`.
    pub replace_allowed_ips: bool,
    /// Allowed IPs to add.
    pub allowed_ips: Vec<IpNet>,
}

impl PeerUpdate {
    /// Creates or updates a peer, replacing its allowed IPs.
    #[must_use]
    pub fn upsert(public_key: PublicKey, allowed_ips: Vec<IpNet>) -> Self {
        Self {
            public_key,
            remove: false,
            preshared_key: None,
            endpoint: None,
            persistent_keepalive: None,
            replace_allowed_ips: true,
            allowed_ips,
        }
    }

    /// Removes a peer.
    #[must_use]
    pub fn remove(public_key: PublicKey) -> Self {
        Self {
            public_key,
            remove: true,
            preshared_key: None,
            endpoint: None,
            persistent_keepalive: None,
            replace_allowed_ips: false,
            allowed_ips: Vec::new(),
        }
    }

    fn encode_into(&self, out: &mut String) {
        let _ = writeln!(out, "public_key={}", self.public_key.to_hex());
        if self.remove {
            out.push_str("remove=true\n");
            return;
        }
        if let Some(psk) = &self.preshared_key {
            let _ = writeln!(out, "preshared_key={}", psk.to_hex());
        }
        if let Some(endpoint) = self.endpoint {
            let _ = writeln!(out, "endpoint={endpoint}");
        }
        if let Some(keepalive) = self.persistent_keepalive {
            let _ = writeln!(out, "persistent_keepalive_interval={keepalive}");
        }
        if self.replace_allowed_ips {
            out.push_str("replace_allowed_ips=true\n");
        }
        for ip in &self.allowed_ips {
            let _ = writeln!(out, "allowed_ip={ip}");
        }
        out.push_str("protocol_version=1\n");
    }
}

/// A `set` request: device-level changes plus peer deltas.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceUpdate {
    /// New private key.
    pub private_key: Option<PrivateKey>,
    /// New listen port.
    pub listen_port: Option<u16>,
    /// Drop every existing peer before applying `peers`.
    pub replace_peers: bool,
    /// Peer deltas, applied in order.
    pub peers: Vec<PeerUpdate>,
}

impl DeviceUpdate {
    /// An update touching only the given peer.
    #[must_use]
    pub fn peer(update: PeerUpdate) -> Self {
        Self {
            peers: vec![update],
            ..Self::default()
        }
    }

    /// Encodes the update as a complete `set` request.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::from("set=1\n");
        if let Some(key) = &self.private_key {
            let _ = writeln!(out, "private_key={}", key.to_hex());
        }
        if let Some(port) = self.listen_port {
            let _ = writeln!(out, "listen_port={port}");
        }
        if self.replace_peers {
            out.push_str("replace_peers=true\n");
        }
        for peer in &self.peers {
            peer.encode_into(&mut out);
        }
        out.push('\n');
        out
    }
}

/// A decoded control request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Read the device state.
    Get,
    /// Apply an update.
    Set(DeviceUpdate),
}

/// The `get` request.
pub const GET_REQUEST: &str = "get=1\n\n";

fn protocol(message: impl Into<String>) -> WgEmbedError {
    WgEmbedError::Protocol(message.into())
}

/// Iterates `key=value` pairs up to the terminating blank line.
fn pairs(text: &str) -> impl Iterator<Item = Result<(&str, &str)>> {
    text.lines()
        .take_while(|line| !line.is_empty())
        .map(|line| {
            line.split_once('=')
                .ok_or_else(|| protocol(format!("malformed line: {line}")))
        })
}

fn flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(protocol(format!("{key} must be true or false, got: {value}"))),
    }
}

fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| protocol(format!("invalid {key}: {value}")))
}

fn allowed_ip(value: &str) -> Result<IpNet> {
    value
        .parse()
        .map_err(|_| protocol(format!("invalid allowed_ip: {value}")))
}

fn endpoint(value: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|_| protocol(format!("invalid endpoint: {value}")))
}

impl Request {
    /// Decodes a request as read from the control socket.
    ///
    /// # Errors
    ///
    /// Returns a `Protocol` error for unknown operations, unknown keys and
    /// malformed values.
    pub fn decode(text: &str) -> Result<Self> {
        let mut lines = pairs(text);
        match lines.next().transpose()? {
            Some(("get", "1")) => Ok(Self::Get),
            Some(("set", "1")) => decode_set(lines).map(Self::Set),
            Some((op, _)) => Err(protocol(format!("unknown operation: {op}"))),
            None => Err(protocol("empty request")),
        }
    }
}

fn decode_set<'a>(lines: impl Iterator<Item = Result<(&'a str, &'a str)>>) -> Result<DeviceUpdate> {
    let mut update = DeviceUpdate::default();
    let mut current: Option<PeerUpdate> = None;

    for pair in lines {
        let (key, value) = pair?;
        if key == "public_key" {
            if let Some(done) = current.take() {
                update.peers.push(done);
            }
            let mut peer = PeerUpdate::upsert(PublicKey::from_hex(value)?, Vec::new());
            peer.replace_allowed_ips = false;
            current = Some(peer);
            continue;
        }

        match (current.as_mut(), key) {
            (None, "private_key") => update.private_key = Some(PrivateKey::from_hex(value)?),
            (None, "listen_port") => update.listen_port = Some(number(key, value)?),
            (None, "replace_peers") => update.replace_peers = flag(key, value)?,
            (None, "fwmark") => {}
            (Some(peer), "remove") => peer.remove = flag(key, value)?,
            (Some(peer), "preshared_key") => {
                peer.preshared_key = Some(PresharedKey::from_hex(value)?);
            }
            (Some(peer), "endpoint") => peer.endpoint = Some(endpoint(value)?),
            (Some(peer), "persistent_keepalive_interval") => {
                peer.persistent_keepalive = Some(number(key, value)?);
            }
            (Some(peer), "replace_allowed_ips") => peer.replace_allowed_ips = flag(key, value)?,
            (Some(peer), "allowed_ip") => peer.allowed_ips.push(allowed_ip(value)?),
            (Some(_), "protocol_version") => {
                if value != "1" {
                    return Err(protocol(format!("unsupported protocol_version: {value}")));
                }
            }
            _ => return Err(protocol(format!("unexpected key: {key}"))),
        }
    }

    if let Some(done) = current {
        update.peers.push(done);
    }
    Ok(update)
}

/// Encodes a response carrying only an errno.
#[must_use]
pub fn encode_errno(errno: i32) -> String {
    format!("errno={errno}\n\n")
}

/// Extracts the errno from a response.
///
/// # Errors
///
/// Returns a `Protocol` error when the response has no `errno` line.
pub fn response_errno(text: &str) -> Result<i32> {
    for pair in pairs(text) {
        if let ("errno", value) = pair? {
            return number("errno", value);
        }
    }
    Err(protocol("response is missing errno"))
}

/// Encodes the response to a `get` request.
#[must_use]
pub fn encode_get_response(
    private_key: Option<&PrivateKey>,
    listen_port: Option<u16>,
    peers: &[PeerRecord],
) -> String {
    let mut out = String::new();
    if let Some(key) = private_key {
        let _ = writeln!(out, "private_key={}", key.to_hex());
    }
    if let Some(port) = listen_port {
        let _ = writeln!(out, "listen_port={port}");
    }
    for peer in peers {
        let _ = writeln!(out, "public_key={}", peer.public_key.to_hex());
        if let Some(endpoint) = peer.endpoint {
            let _ = writeln!(out, "endpoint={endpoint}");
        }
        let since_epoch = peer
            .last_handshake
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();
        let _ = writeln!(out, "last_handshake_time_sec={}", since_epoch.as_secs());
        let _ = writeln!(out, "last_handshake_time_nsec={}", since_epoch.subsec_nanos());
        let _ = writeln!(out, "rx_bytes={}", peer.transfer.rx_bytes);
        let _ = writeln!(out, "tx_bytes={}", peer.transfer.tx_bytes);
        let _ = writeln!(
            out,
            "persistent_keepalive_interval={}",
            peer.persistent_keepalive.unwrap_or(0)
        );
        for ip in &peer.allowed_ips {
            let _ = writeln!(out, "allowed_ip={ip}");
        }
    }
    out.push_str(&encode_errno(0));
    out
}

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Converts a reported handshake time; `(0, 0)` means no handshake yet.
fn handshake_time(secs: u64, nanos: u32) -> Result<Option<SystemTime>> {
    if (secs, nanos) == (0, 0) {
        return Ok(None);
    }
    UNIX_EPOCH
        .checked_add(Duration::new(secs, nanos))
        .map(Some)
        .ok_or_else(|| protocol(format!("last_handshake_time_sec out of range: {secs}")))
}

/// Decodes the response to a `get` request.
///
/// A zero handshake time or keepalive interval means "none".
///
/// # Errors
///
/// Returns a `Protocol` error for malformed responses or a non-zero errno.
pub fn decode_get_response(name: &str, text: &str) -> Result<DeviceInfo> {
    let mut info = DeviceInfo::new(name);
    let mut current: Option<PeerRecord> = None;
    let mut handshake = (0u64, 0u32);
    let mut errno = None;

    let finish = |peer: Option<PeerRecord>, (secs, nanos): (u64, u32), info: &mut DeviceInfo| {
        if let Some(mut peer) = peer {
            peer.last_handshake = handshake_time(secs, nanos)?;
            info.peers.push(peer);
        }
        Ok::<_, WgEmbedError>(())
    };

    for pair in pairs(text) {
        let (key, value) = pair?;
        match key {
            "errno" => {
                errno = Some(number::<i32>(key, value)?);
                continue;
            }
            "public_key" => {
                finish(current.take(), handshake, &mut info)?;
                handshake = (0, 0);
                current = Some(PeerRecord::new(PublicKey::from_hex(value)?));
                continue;
            }
            _ => {}
        }

        match (current.as_mut(), key) {
            (None, "private_key") => {
                info.public_key = Some(PrivateKey::from_hex(value)?.public_key());
            }
            (None, "listen_port") => info.listen_port = Some(number(key, value)?),
            (Some(peer), "endpoint") => peer.endpoint = Some(endpoint(value)?),
            (Some(_), "last_handshake_time_sec") => handshake.0 = number(key, value)?,
            (Some(_), "last_handshake_time_nsec") => {
                let nanos: u32 = number(key, value)?;
                if nanos >= NANOS_PER_SEC {
                    return Err(protocol(format!("invalid {key}: {value}")));
                }
                handshake.1 = nanos;
            }
            (Some(peer), "rx_bytes") => peer.transfer.rx_bytes = number(key, value)?,
            (Some(peer), "tx_bytes") => peer.transfer.tx_bytes = number(key, value)?,
            (Some(peer), "persistent_keepalive_interval") => {
                let interval: u16 = number(key, value)?;
                peer.persistent_keepalive = (interval != 0).then_some(interval);
            }
            (Some(peer), "allowed_ip") => peer.allowed_ips.push(allowed_ip(value)?),
            // Engines may report extra device or peer attributes.
            _ => {}
        }
    }
    finish(current, handshake, &mut info)?;

    match errno {
        Some(0) => Ok(info),
        Some(code) => Err(protocol(format!("device returned errno={code}"))),
        None => Err(protocol("response is missing errno")),
    }
}
