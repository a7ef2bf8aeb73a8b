//! Command-line argument parsing with clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use claw_wgembed::interface::{DEFAULT_MTU, DEFAULT_SOCKET_DIR};

/// Clawbernetes `WireGuard` control tool.
#[derive(Parser, Debug, Clone)]
#[command(name = "claw-wgctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding device control sockets.
    #[arg(long, global = true, env = "CLAW_WG_SOCKET_DIR", default_value = DEFAULT_SOCKET_DIR)]
    pub socket_dir: PathBuf,

    /// Deadline in seconds for each device or link call.
    #[arg(long, global = true, env = "CLAW_WG_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Output format.
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Per-call deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Default log filter for the verbosity level.
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Parse and validate a configuration file.
    Check {
        /// Configuration file path.
        path: PathBuf,
    },

    /// Generate a private key.
    Genkey,

    /// Read a private key from stdin and print its public key.
    Pubkey,

    /// Show the live state of a device.
    Show {
        /// Interface name.
        interface: String,
    },

    /// Apply a configuration file to a running device.
    ///
    /// Replaces every peer on the device, assigns the configured addresses
    /// and brings the link up.
    Apply(ApplyArgs),

    /// Peer management commands.
    Peer {
        /// Peer subcommand to execute.
        #[command(subcommand)]
        command: PeerCommands,
    },
}

/// Arguments for the apply command.
#[derive(Parser, Debug, Clone)]
pub struct ApplyArgs {
    /// Interface name.
    pub interface: String,

    /// Configuration file path.
    pub path: PathBuf,

    /// Link MTU when the configuration sets none.
    #[arg(long, default_value_t = DEFAULT_MTU)]
    pub mtu: u16,

    /// Only configure the device; leave addresses and link state alone.
    #[arg(long)]
    pub skip_link: bool,
}

/// Peer subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum PeerCommands {
    /// Add a peer or replace its allowed IPs.
    Add {
        /// Interface name.
        interface: String,
        /// Base64 public key.
        public_key: String,
        /// Comma-separated allowed IPs in CIDR notation.
        #[arg(default_value = "")]
        allowed_ips: String,
    },

    /// Remove a peer. Succeeds if the peer is absent.
    Remove {
        /// Interface name.
        interface: String,
        /// Base64 public key.
        public_key: String,
    },

    /// List peers.
    List {
        /// Interface name.
        interface: String,
    },
}
