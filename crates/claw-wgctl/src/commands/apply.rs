//! Configuration apply command.

use std::io::Write;

use tracing::info;

use crate::cli::ApplyArgs;
use crate::client::DeviceClient;
use crate::error::CliError;
use crate::output::{ActionResult, OutputFormat};

/// Apply command executor.
pub struct ApplyCommand<'a> {
    client: &'a DeviceClient,
}

impl<'a> ApplyCommand<'a> {
    /// Create a new apply command.
    #[must_use]
    pub const fn new(client: &'a DeviceClient) -> Self {
        Self { client }
    }

    /// Validates the file, then applies it to the running device.
    ///
    /// Nothing is sent to the device if validation fails.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a bad file, or a device error naming
    /// the failed step.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &ApplyArgs,
    ) -> Result<(), CliError> {
        let config = claw_wgembed::read_config(&args.path)
            .await
            .map_err(CliError::Config)?;
        self.client
            .apply(&args.interface, &config, args.mtu, args.skip_link)
            .await?;
        info!(interface = %args.interface, path = %args.path.display(), "applied");

        let result = ActionResult {
            interface: args.interface.clone(),
            action: format!("applied configuration with {} peer(s)", config.peers.len()),
            peer: None,
        };
        format.write(writer, &result)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::path::PathBuf;

    use claw_wgembed::KeyPair;

    use super::*;
    use crate::commands::testing::{PEER_A, PEER_B, output, serve};

    fn args(interface: &str, path: PathBuf) -> ApplyArgs {
        ApplyArgs {
            interface: interface.into(),
            path,
            mtu: 1420,
            skip_link: false,
        }
    }

    #[tokio::test]
    async fn apply_replaces_device_peers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (handle, client) = serve("wgctl-apply0", dir.path()).await;
        handle.add_peer(PEER_B, "10.0.0.3/32").await.expect("stale peer");

        let keys = KeyPair::generate().expect("keys");
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            "[Interface]\nPrivateKey = {}\nListenPort = 51900\nAddress = 10.0.0.1/24\n\n\
             [Peer]\nPublicKey = {PEER_A}\nAllowedIPs = 10.0.0.2/32\n",
            keys.private_key().to_base64()
        )
        .expect("write");

        let mut buf = Vec::new();
        ApplyCommand::new(&client)
            .execute(&mut buf, &OutputFormat::default(), &args("wgctl-apply0", file.path().into()))
            .await
            .expect("apply");
        assert_eq!(output(buf), "wgctl-apply0: applied configuration with 1 peer(s)\n");

        let device = handle.device().await.expect("device");
        assert_eq!(device.public_key, Some(*keys.public_key()));
        assert_eq!(device.listen_port, Some(51900));
        assert_eq!(device.peers.len(), 1);
        assert_eq!(device.peers[0].public_key.to_base64(), PEER_A);
        handle.close().await.expect("close");
    }

    #[tokio::test]
    async fn invalid_file_leaves_device_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (handle, client) = serve("wgctl-apply1", dir.path()).await;
        handle.add_peer(PEER_A, "10.0.0.2/32").await.expect("add");

        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "[Interface]\nPrivateKey = \n").expect("write");

        let err = ApplyCommand::new(&client)
            .execute(&mut Vec::new(), &OutputFormat::default(), &args("wgctl-apply1", file.path().into()))
            .await
            .expect_err("invalid");
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(handle.list_peers().await.expect("list").len(), 1);
        handle.close().await.expect("close");
    }
}
