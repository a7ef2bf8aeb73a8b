//! Link configuration backends.
//!
//! On Linux the `ip` command assigns addresses and brings links up. Everywhere
//! else link configuration is a documented no-op that returns success, so
//! flows built on [`InterfaceHandle`](crate::InterfaceHandle) stay portable.

use std::sync::Arc;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::device::{BoxFuture, LinkConfigurator};
use crate::error::Result;

/// Selects the link configuration backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkBackend {
    /// `ip` command on Linux, no-op elsewhere.
    #[default]
    Auto,
    /// Always use the `ip` command.
    IpCommand,
    /// Never touch the host network stack.
    Noop,
}

impl LinkBackend {
    /// Builds the selected backend.
    #[must_use]
    pub fn build(self) -> Arc<dyn LinkConfigurator> {
        match self {
            Self::IpCommand => Arc::new(IpCommandLink),
            Self::Noop => Arc::new(NoopLink),
            Self::Auto if cfg!(target_os = "linux") => Arc::new(IpCommandLink),
            Self::Auto => {
                warn!("link configuration is not supported on this platform; using no-op backend");
                Arc::new(NoopLink)
            }
        }
    }

    /// Builds the backend for an engine. `Auto` skips link configuration
    /// when the engine allocates no OS link.
    #[must_use]
    pub fn build_for(self, os_link: bool) -> Arc<dyn LinkConfigurator> {
        if self == Self::Auto && !os_link {
            debug!("engine has no OS link; using no-op link backend");
            return Arc::new(NoopLink);
        }
        self.build()
    }
}

/// Link configuration through the `ip` command.
#[derive(Clone, Copy, Debug, Default)]
pub struct IpCommandLink;

/// Runs `ip` with the given arguments, returning stderr on failure.
async fn run_ip(args: &[&str]) -> std::result::Result<(), String> {
    let output = tokio::process::Command::new("ip")
        .args(args)
        .output()
        .await
        .map_err(|e| format!("failed to run ip: {e}"))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}

fn already_assigned(stderr: &str) -> bool {
    stderr.contains("File exists")
}

fn link_error(message: String) -> crate::error::WgEmbedError {
    std::io::Error::other(message).into()
}

impl LinkConfigurator for IpCommandLink {
    fn set_address<'a>(&'a self, name: &'a str, address: &'a IpNet) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let cidr = address.to_string();
            match run_ip(&["address", "add", &cidr, "dev", name]).await {
                Ok(()) => {
                    debug!(interface = %name, address = %cidr, "address assigned");
                    Ok(())
                }
                // Re-applying a configuration re-adds the same addresses.
                Err(stderr) if already_assigned(&stderr) => {
                    debug!(interface = %name, address = %cidr, "address already assigned");
                    Ok(())
                }
                Err(stderr) => Err(link_error(stderr)),
            }
        })
    }

    fn set_link_up<'a>(&'a self, name: &'a str, mtu: u16) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mtu_text = mtu.to_string();
            run_ip(&["link", "set", "dev", name, "mtu", &mtu_text, "up"])
                .await
                .map_err(link_error)?;
            debug!(interface = %name, mtu, "link up");
            Ok(())
        })
    }
}

/// Link configuration that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLink;

impl LinkConfigurator for NoopLink {
    fn set_address<'a>(&'a self, name: &'a str, address: &'a IpNet) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            debug!(interface = %name, %address, "skipping address assignment");
            Ok(())
        })
    }

    fn set_link_up<'a>(&'a self, name: &'a str, mtu: u16) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            debug!(interface = %name, mtu, "skipping link up");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_link_always_succeeds() {
        let link = LinkBackend::Noop.build();
        let address: IpNet = "10.0.0.1/24".parse().expect("cidr");
        link.set_address("wg-test", &address).await.expect("address");
        link.set_link_up("wg-test", 1420).await.expect("link up");
    }

    #[tokio::test]
    async fn auto_without_os_link_is_noop() {
        let link = LinkBackend::Auto.build_for(false);
        let address: IpNet = "10.0.0.1/24".parse().expect("cidr");
        link.set_address("wg-no-such0", &address).await.expect("address");
        link.set_link_up("wg-no-such0", 1420).await.expect("link up");
    }

    #[test]
    fn existing_address_is_recognized() {
        assert!(already_assigned("RTNETLINK answers: File exists"));
        assert!(!already_assigned("Cannot find device \"wg-missing0\""));
    }

    #[test]
    fn backend_serde_names() {
        let json = serde_json::to_string(&LinkBackend::IpCommand).expect("serialize");
        assert_eq!(json, "\"ip-command\"");
        let backend: LinkBackend = serde_json::from_str("\"noop\"").expect("deserialize");
        assert_eq!(backend, LinkBackend::Noop);
        assert_eq!(LinkBackend::default(), LinkBackend::Auto);
    }

    #[tokio::test]
    #[ignore = "requires root and an existing interface"]
    async fn ip_command_rejects_unknown_interface() {
        let address: IpNet = "10.99.0.1/24".parse().expect("cidr");
        let err = IpCommandLink
            .set_address("wg-missing0", &address)
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("io error"));
    }
}
