//! Configuration file model.
//!
//! Text flows through [`parse`] into a [`ConfigurationDocument`], then
//! through [`normalize`] into a [`NormalizedConfiguration`] ready to apply.

mod document;
mod normalize;
mod parser;

use std::path::Path;

use tracing::debug;

pub use document::{ConfigurationDocument, InterfaceSection, PeerSection};
pub use normalize::{
    NormalizedConfiguration, NormalizedPeer, normalize, normalize_async, parse_allowed_ip_list,
    parse_allowed_ips, parse_public_key, resolve_endpoint,
};
pub use parser::parse;

use crate::error::Result;
use crate::interface::DEFAULT_OPERATION_TIMEOUT;

/// Reads and parses a configuration file.
///
/// # Errors
///
/// Returns `Io` if the file cannot be read, or a `Parse` error.
pub async fn read_document(path: impl AsRef<Path>) -> Result<ConfigurationDocument> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path).await?;
    let document = parse(&text)?;
    debug!(path = %path.display(), peers = document.peers.len(), "configuration file parsed");
    Ok(document)
}

/// Reads, parses and validates a configuration file. Hostname endpoints are
/// resolved under [`DEFAULT_OPERATION_TIMEOUT`].
///
/// # Errors
///
/// Returns `Io` if the file cannot be read, a `Parse` or `Validation`
/// error, or `Timeout` if an endpoint lookup hangs.
pub async fn read_config(path: impl AsRef<Path>) -> Result<NormalizedConfiguration> {
    normalize_async(&read_document(path).await?, DEFAULT_OPERATION_TIMEOUT).await
}
