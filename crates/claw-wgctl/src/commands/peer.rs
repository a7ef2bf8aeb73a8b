//! Peer management commands.

use std::io::Write;

use crate::cli::PeerCommands;
use crate::client::DeviceClient;
use crate::error::CliError;
use crate::output::{ActionResult, OutputFormat, PeerList};

/// Peer command executor.
pub struct PeerCommand<'a> {
    client: &'a DeviceClient,
}

impl<'a> PeerCommand<'a> {
    /// Create a new peer command.
    #[must_use]
    pub const fn new(client: &'a DeviceClient) -> Self {
        Self { client }
    }

    /// Execute a peer subcommand.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed key or CIDR list, or a
    /// device error if the request fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        command: &PeerCommands,
    ) -> Result<(), CliError> {
        match command {
            PeerCommands::Add {
                interface,
                public_key,
                allowed_ips,
            } => {
                self.client.add_peer(interface, public_key, allowed_ips).await?;
                format.write(writer, &action(interface, "added peer", public_key))
            }
            PeerCommands::Remove {
                interface,
                public_key,
            } => {
                self.client.remove_peer(interface, public_key).await?;
                format.write(writer, &action(interface, "removed peer", public_key))
            }
            PeerCommands::List { interface } => {
                let device = self.client.query(interface).await?;
                format.write(writer, &PeerList::from_device(&device))
            }
        }
    }
}

fn action(interface: &str, action: &str, peer: &str) -> ActionResult {
    ActionResult {
        interface: interface.to_string(),
        action: action.to_string(),
        peer: Some(peer.trim().to_string()),
    }
}
