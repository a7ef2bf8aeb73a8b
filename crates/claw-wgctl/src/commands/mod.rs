//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`check`] - Configuration file validation
//! - [`keys`] - Key generation and derivation
//! - [`show`] - Live device state
//! - [`apply`] - Full configuration apply
//! - [`peer`] - Single-peer changes

pub mod apply;
pub mod check;
pub mod keys;
pub mod peer;
pub mod show;

pub use apply::ApplyCommand;
pub use check::CheckCommand;
pub use keys::KeyCommand;
pub use peer::PeerCommand;
pub use show::ShowCommand;
