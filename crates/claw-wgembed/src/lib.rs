//! Embedded `WireGuard` interface management for Clawbernetes.
//!
//! This crate parses `WireGuard` configuration files, validates them into a
//! form a device can apply, and manages the lifecycle and peer set of a
//! running interface through the userspace control protocol.
//!
//! # Layers
//!
//! - [`config`]: tolerant parser, document serializer and validator.
//! - [`InterfaceHandle`]: creation, configuration and teardown of one
//!   interface; peer add/remove/list as single-peer deltas.
//! - [`NoOpInterface`]: the same contract with no host interaction.
//! - [`device`] and [`link`]: the seams to the tunnel engine, the control
//!   socket and the host network stack.
//! - [`apply`]: the configure, address and link sequence shared with
//!   control-socket clients.
//!
//! The parser, validator and [`NoOpInterface`] are portable. Running
//! interfaces are driven over Unix control sockets and exist only on Unix.
//! [`MemoryEngine`] allocates no host link, so the default link backend
//! leaves the host network stack alone when paired with it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use claw_wgembed::{InterfaceHandle, InterfaceOptions, MemoryEngine};
//!
//! # async fn example() -> claw_wgembed::Result<()> {
//! let handle = InterfaceHandle::create(
//!     "wg0",
//!     Arc::new(MemoryEngine::new()),
//!     InterfaceOptions::default(),
//! )
//! .await?;
//!
//! handle.load_config_file("/etc/wireguard/wg0.conf").await?;
//! handle
//!     .add_peer("gysKSkCS/VeAyHIAVtf8B/sbQnEd5FYogtj7kO4d4zY=", "10.44.0.2/32")
//!     .await?;
//! for peer in handle.list_peers().await? {
//!     println!("{} {:?}", peer.public_key, peer.allowed_ips);
//! }
//! handle.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod apply;
pub mod config;
pub mod device;
#[cfg(unix)]
pub mod engine;
pub mod error;
#[cfg(unix)]
mod handle;
pub mod interface;
mod keys;
pub mod link;
pub mod noop;
#[cfg(unix)]
mod peers;
pub mod types;
pub mod uapi;

pub use config::{
    ConfigurationDocument, NormalizedConfiguration, normalize, normalize_async, parse, read_config,
};
#[cfg(unix)]
pub use engine::MemoryEngine;
pub use error::{ApplyStep, Result, WgEmbedError};
#[cfg(unix)]
pub use interface::InterfaceHandle;
pub use interface::{InterfaceOptions, InterfaceState, WireGuardInterface};
pub use keys::{KEY_SIZE, KeyPair, PresharedKey, PrivateKey, PublicKey};
pub use link::LinkBackend;
pub use noop::NoOpInterface;
pub use types::{ConfigField, DeviceInfo, PeerRecord, TransferStats};
