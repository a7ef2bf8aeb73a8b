//! Apply sequences shared by in-process handles and control-socket clients.
//!
//! Both paths push the same updates in the same order: the device first, then
//! each address, then the link. Peer mutations are single-peer deltas built
//! from validated text.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::config::{NormalizedConfiguration, parse_allowed_ip_list, parse_public_key};
use crate::device::{DeviceConfigurator, LinkConfigurator};
use crate::error::{ApplyStep, Result, WgEmbedError};
use crate::uapi::PeerUpdate;

/// Runs one external call under `timeout`, tagging a failure with `step`.
///
/// # Errors
///
/// Returns a `DeviceConfiguration` error wrapping the call's failure, or
/// `Timeout` when the deadline passes first.
pub async fn run_step<T>(
    name: &str,
    step: ApplyStep,
    timeout: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(WgEmbedError::configuration(name, step, e)),
        Err(_) => Err(WgEmbedError::Timeout {
            operation: format!("{step} on '{name}'"),
            timeout,
        }),
    }
}

/// Pushes a full configuration, replacing every peer, then assigns each
/// address and brings the link up. With no `link`, only the device is
/// touched. Stops at the first failing step without rolling back.
///
/// # Errors
///
/// Returns the error of the failed step, see [`run_step`].
pub async fn apply_configuration(
    name: &str,
    config: &NormalizedConfiguration,
    device: &dyn DeviceConfigurator,
    link: Option<&dyn LinkConfigurator>,
    default_mtu: u16,
    timeout: Duration,
) -> Result<()> {
    let update = config.to_update();
    run_step(name, ApplyStep::Configure, timeout, device.configure(name, &update)).await?;
    debug!(interface = %name, peers = config.peers.len(), "device configured");

    let Some(link) = link else {
        return Ok(());
    };
    for address in &config.addresses {
        run_step(name, ApplyStep::SetAddress, timeout, link.set_address(name, address)).await?;
    }
    let mtu = config.mtu.unwrap_or(default_mtu);
    run_step(name, ApplyStep::SetLinkUp, timeout, link.set_link_up(name, mtu)).await
}

/// Validates a peer key and comma-separated allowed IP list into an upsert
/// delta that replaces the peer's allowed IPs.
///
/// # Errors
///
/// Returns a `Validation` error for a bad key or CIDR.
pub fn upsert_peer(public_key: &str, allowed_ips: &str) -> Result<PeerUpdate> {
    let key = parse_public_key(public_key)?;
    let ips = parse_allowed_ip_list(public_key, allowed_ips)?;
    Ok(PeerUpdate::upsert(key, ips))
}

/// Validates a peer key into a removal delta.
///
/// # Errors
///
/// Returns a `Validation` error for a malformed key.
pub fn remove_peer(public_key: &str) -> Result<PeerUpdate> {
    Ok(PeerUpdate::remove(parse_public_key(public_key)?))
}
