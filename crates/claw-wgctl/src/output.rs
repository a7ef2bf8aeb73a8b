//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use claw_wgembed::{DeviceInfo, NormalizedConfiguration, PeerRecord};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Result of validating a configuration file.
#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    /// Public key derived from the private key.
    pub public_key: String,
    /// Listen port, if set.
    pub listen_port: Option<u16>,
    /// MTU, if set.
    pub mtu: Option<u16>,
    /// Interface addresses.
    pub addresses: Vec<String>,
    /// DNS servers.
    pub dns: Vec<String>,
    /// DNS search domains.
    pub dns_search: Vec<String>,
    /// Peers in file order.
    pub peers: Vec<PeerSummary>,
}

/// One configured peer.
#[derive(Debug, Clone, Serialize)]
pub struct PeerSummary {
    /// Base64 public key.
    pub public_key: String,
    /// Whether a preshared key is set. The key itself is never printed.
    pub preshared_key: bool,
    /// Allowed IPs.
    pub allowed_ips: Vec<String>,
    /// Resolved endpoint.
    pub endpoint: Option<String>,
    /// Keepalive interval in seconds.
    pub persistent_keepalive: Option<u16>,
}

impl From<&NormalizedConfiguration> for CheckSummary {
    fn from(config: &NormalizedConfiguration) -> Self {
        Self {
            public_key: config.public_key().to_base64(),
            listen_port: config.listen_port,
            mtu: config.mtu,
            addresses: config.addresses.iter().map(ToString::to_string).collect(),
            dns: config.dns.iter().map(ToString::to_string).collect(),
            dns_search: config.dns_search.clone(),
            peers: config
                .peers
                .iter()
                .map(|peer| PeerSummary {
                    public_key: peer.public_key.to_base64(),
                    preshared_key: peer.preshared_key.is_some(),
                    allowed_ips: peer.allowed_ips.iter().map(ToString::to_string).collect(),
                    endpoint: peer.endpoint.map(|e| e.to_string()),
                    persistent_keepalive: peer.persistent_keepalive,
                })
                .collect(),
        }
    }
}

impl TableDisplay for CheckSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Configuration OK")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Public Key:   {}", self.public_key)?;
        writeln!(writer, "Listen Port:  {}", optional(self.listen_port))?;
        writeln!(writer, "MTU:          {}", optional(self.mtu))?;
        writeln!(writer, "Addresses:    {}", list(&self.addresses))?;
        if !self.dns.is_empty() {
            writeln!(writer, "DNS:          {}", self.dns.join(", "))?;
        }
        if !self.dns_search.is_empty() {
            writeln!(writer, "Search:       {}", self.dns_search.join(", "))?;
        }
        writeln!(writer)?;

        if self.peers.is_empty() {
            writeln!(writer, "No peers configured")?;
            return Ok(());
        }

        writeln!(writer, "{:<44}  {:<24}  {:>9}  ALLOWED IPS", "PEER", "ENDPOINT", "KEEPALIVE")?;
        writeln!(writer, "{}", "─".repeat(100))?;
        for peer in &self.peers {
            writeln!(
                writer,
                "{:<44}  {:<24}  {:>9}  {}",
                peer.public_key,
                truncate(peer.endpoint.as_deref().unwrap_or("-"), 24),
                optional(peer.persistent_keepalive),
                list(&peer.allowed_ips)
            )?;
        }
        writeln!(writer)?;
        writeln!(writer, "Total: {} peer(s)", self.peers.len())?;
        Ok(())
    }
}

/// Key material printed by `genkey` and `pubkey`.
#[derive(Debug, Clone, Serialize)]
pub struct KeyOutput {
    /// Base64 private key, only for `genkey`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Base64 public key.
    pub public_key: String,
}

impl TableDisplay for KeyOutput {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        // Bare key on one line so the output pipes into `pubkey`.
        match &self.private_key {
            Some(private) => writeln!(writer, "{private}")?,
            None => writeln!(writer, "{}", self.public_key)?,
        }
        Ok(())
    }
}

/// Live state of one peer.
#[derive(Debug, Clone, Serialize)]
pub struct PeerView {
    /// Base64 public key.
    pub public_key: String,
    /// Current endpoint.
    pub endpoint: Option<String>,
    /// Allowed IPs.
    pub allowed_ips: Vec<String>,
    /// Unix time of the last handshake.
    pub latest_handshake: Option<u64>,
    /// Bytes received.
    pub rx_bytes: u64,
    /// Bytes sent.
    pub tx_bytes: u64,
    /// Keepalive interval in seconds.
    pub persistent_keepalive: Option<u16>,
}

impl From<&PeerRecord> for PeerView {
    fn from(peer: &PeerRecord) -> Self {
        Self {
            public_key: peer.public_key.to_base64(),
            endpoint: peer.endpoint.map(|e| e.to_string()),
            allowed_ips: peer.allowed_ips.iter().map(ToString::to_string).collect(),
            latest_handshake: peer.last_handshake_unix(),
            rx_bytes: peer.transfer.rx_bytes,
            tx_bytes: peer.transfer.tx_bytes,
            persistent_keepalive: peer.persistent_keepalive,
        }
    }
}

/// Peers of one interface.
#[derive(Debug, Clone, Serialize)]
pub struct PeerList {
    /// Interface name.
    pub interface: String,
    /// Peers in device order.
    pub peers: Vec<PeerView>,
}

impl PeerList {
    /// Builds the list from a device query.
    #[must_use]
    pub fn from_device(device: &DeviceInfo) -> Self {
        Self {
            interface: device.name.clone(),
            peers: device.peers.iter().map(PeerView::from).collect(),
        }
    }
}

impl TableDisplay for PeerList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.peers.is_empty() {
            writeln!(writer, "No peers on {}", self.interface)?;
            return Ok(());
        }
        write_peer_rows(writer, &self.peers)?;
        writeln!(writer)?;
        writeln!(writer, "Total: {} peer(s)", self.peers.len())?;
        Ok(())
    }
}

/// Live state of a device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    /// Interface name.
    pub interface: String,
    /// Base64 public key, if a private key is set.
    pub public_key: Option<String>,
    /// Listen port, if bound.
    pub listen_port: Option<u16>,
    /// Peers in device order.
    pub peers: Vec<PeerView>,
}

impl From<&DeviceInfo> for DeviceView {
    fn from(device: &DeviceInfo) -> Self {
        Self {
            interface: device.name.clone(),
            public_key: device.public_key.map(|k| k.to_base64()),
            listen_port: device.listen_port,
            peers: device.peers.iter().map(PeerView::from).collect(),
        }
    }
}

impl TableDisplay for DeviceView {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Interface: {}", self.interface)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Public Key:   {}", self.public_key.as_deref().unwrap_or("(none)"))?;
        writeln!(writer, "Listen Port:  {}", optional(self.listen_port))?;
        writeln!(writer)?;
        if self.peers.is_empty() {
            writeln!(writer, "No peers")?;
            return Ok(());
        }
        write_peer_rows(writer, &self.peers)
    }
}

/// Outcome of a mutating command.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    /// Interface name.
    pub interface: String,
    /// What was done.
    pub action: String,
    /// Peer the action applied to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
}

impl TableDisplay for ActionResult {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        match &self.peer {
            Some(peer) => writeln!(writer, "{}: {} {}", self.interface, self.action, peer)?,
            None => writeln!(writer, "{}: {}", self.interface, self.action)?,
        }
        Ok(())
    }
}

fn write_peer_rows<W: Write>(writer: &mut W, peers: &[PeerView]) -> Result<(), CliError> {
    writeln!(
        writer,
        "{:<44}  {:<24}  {:>14}  {:>10}  {:>10}  ALLOWED IPS",
        "PEER", "ENDPOINT", "HANDSHAKE", "RX", "TX"
    )?;
    writeln!(writer, "{}", "─".repeat(120))?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    for peer in peers {
        let handshake = peer
            .latest_handshake
            .map_or_else(|| "never".to_string(), |t| format!("{}s ago", now.saturating_sub(t)));
        writeln!(
            writer,
            "{:<44}  {:<24}  {:>14}  {:>10}  {:>10}  {}",
            peer.public_key,
            truncate(peer.endpoint.as_deref().unwrap_or("-"), 24),
            handshake,
            format_bytes(peer.rx_bytes),
            format_bytes(peer.tx_bytes),
            list(&peer.allowed_ips)
        )?;
    }
    Ok(())
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn list(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Format a byte count with binary units.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
