//! An interface that never touches the host.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::apply::{remove_peer, upsert_peer};
use crate::config::{ConfigurationDocument, normalize_async};
use crate::device::BoxFuture;
use crate::error::{Result, WgEmbedError};
use crate::interface::{DEFAULT_OPERATION_TIMEOUT, WireGuardInterface};
use crate::keys::{KEY_SIZE, PublicKey};
use crate::types::PeerRecord;

/// Placeholder public key reported by [`NoOpInterface`].
pub const PLACEHOLDER_PUBLIC_KEY: PublicKey = PublicKey::from_bytes_array([0u8; KEY_SIZE]);

/// Stand-in for a real interface in tests, dry runs and disabled builds.
///
/// Inputs are validated exactly as a real interface would, then dropped. The
/// peer list is always empty and the public key is all zeros.
#[derive(Debug)]
pub struct NoOpInterface {
    name: String,
    closed: AtomicBool,
}

impl NoOpInterface {
    /// Creates a no-op interface called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(WgEmbedError::Closed(self.name.clone()))
        } else {
            Ok(())
        }
    }
}

impl WireGuardInterface for NoOpInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn load_configuration<'a>(
        &'a self,
        document: &'a ConfigurationDocument,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.ensure_open()?;
            let config = normalize_async(document, DEFAULT_OPERATION_TIMEOUT).await?;
            debug!(interface = %self.name, peers = config.peers.len(), "no-op load");
            Ok(())
        })
    }

    fn add_peer<'a>(
        &'a self,
        public_key: &'a str,
        allowed_ips: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.ensure_open()?;
            upsert_peer(public_key, allowed_ips)?;
            Ok(())
        })
    }

    fn remove_peer<'a>(&'a self, public_key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.ensure_open()?;
            remove_peer(public_key)?;
            Ok(())
        })
    }

    fn list_peers(&self) -> BoxFuture<'_, Result<Vec<PeerRecord>>> {
        Box::pin(async move {
            self.ensure_open()?;
            Ok(Vec::new())
        })
    }

    fn public_key(&self) -> BoxFuture<'_, Result<Option<PublicKey>>> {
        Box::pin(async move {
            self.ensure_open()?;
            Ok(Some(PLACEHOLDER_PUBLIC_KEY))
        })
    }

    fn port(&self) -> BoxFuture<'_, Result<Option<u16>>> {
        Box::pin(async move {
            self.ensure_open()?;
            Ok(None)
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::Release);
            Ok(())
        })
    }
}
