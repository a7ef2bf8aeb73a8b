//! # claw-wgctl
//!
//! Command-line control for Clawbernetes `WireGuard` devices.
//!
//! Provides commands for:
//! - Configuration file validation
//! - Key generation and public key derivation
//! - Live device state and peer listing
//! - Full configuration apply and single-peer changes
//!
//! # Architecture
//!
//! The CLI talks to a running device over its control socket using the
//! userspace control protocol from `claw-wgembed`. The
//! [`client::DeviceClient`] wraps each request in a deadline.
//!
//! ```text
//! ┌────────────┐   control protocol    ┌──────────────────┐
//! │ claw-wgctl │◄─────────────────────►│ <socket-dir>/    │
//! └────────────┘    (Unix socket)      │   <name>.sock    │
//!                                      └──────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod client;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{ApplyArgs, Cli, Commands, Format, PeerCommands};
pub use client::DeviceClient;
pub use error::CliError;
pub use output::OutputFormat;
