//! Peer management on a running interface.
//!
//! Mutations are single-peer deltas: the rest of the peer set and the
//! interface settings are never resent. Reads always query the device.

use tracing::debug;

use crate::apply;
use crate::config::parse_public_key;
use crate::error::{Result, WgEmbedError};
use crate::interface::InterfaceHandle;
use crate::types::PeerRecord;
use crate::uapi::DeviceUpdate;

impl InterfaceHandle {
    /// Adds a peer, or replaces the allowed IPs of an existing one.
    ///
    /// `allowed_ips` is a comma-separated CIDR list; an empty string leaves
    /// the peer with no allowed IPs. Other peers are untouched.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for a bad key or CIDR, `Closed` after
    /// close, or the device's failure.
    pub async fn add_peer(&self, public_key: &str, allowed_ips: &str) -> Result<()> {
        let update = apply::upsert_peer(public_key, allowed_ips)?;
        let (key, count) = (update.public_key, update.allowed_ips.len());

        let _guard = self.lock_open().await?;
        self.push(&DeviceUpdate::peer(update)).await?;
        debug!(interface = %self.name(), peer = %key.short(), allowed_ips = count, "peer upserted");
        Ok(())
    }

    /// Removes a peer. Removing a peer that is not present succeeds.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for a malformed key, `Closed` after
    /// close, or the device's failure.
    pub async fn remove_peer(&self, public_key: &str) -> Result<()> {
        let update = apply::remove_peer(public_key)?;
        let key = update.public_key;

        let _guard = self.lock_open().await?;
        self.push(&DeviceUpdate::peer(update)).await?;
        debug!(interface = %self.name(), peer = %key.short(), "peer removed");
        Ok(())
    }

    /// Lists peers in the order the device reports them.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close, or the query failure.
    pub async fn list_peers(&self) -> Result<Vec<PeerRecord>> {
        Ok(self.device().await?.peers)
    }

    /// Returns true if a peer with `public_key` is present.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for a malformed key, `Closed` after
    /// close, or the query failure.
    pub async fn has_peer(&self, public_key: &str) -> Result<bool> {
        let key = parse_public_key(public_key)?;
        Ok(self.list_peers().await?.iter().any(|p| p.public_key == key))
    }

    /// Looks up one peer.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no peer has `public_key`, plus the errors of
    /// [`has_peer`](Self::has_peer).
    pub async fn peer(&self, public_key: &str) -> Result<PeerRecord> {
        let key = parse_public_key(public_key)?;
        self.list_peers()
            .await?
            .into_iter()
            .find(|p| p.public_key == key)
            .ok_or_else(|| WgEmbedError::NotFound(public_key.to_string()))
    }
}
