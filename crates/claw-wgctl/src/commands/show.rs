//! Device state command.

use std::io::Write;

use crate::client::DeviceClient;
use crate::error::CliError;
use crate::output::{DeviceView, OutputFormat};

/// Show command executor.
pub struct ShowCommand<'a> {
    client: &'a DeviceClient,
}

impl<'a> ShowCommand<'a> {
    /// Create a new show command.
    #[must_use]
    pub const fn new(client: &'a DeviceClient) -> Self {
        Self { client }
    }

    /// Execute the show command.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be queried or output fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        interface: &str,
    ) -> Result<(), CliError> {
        let device = self.client.query(interface).await?;
        format.write(writer, &DeviceView::from(&device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use crate::commands::testing::{PEER_A, output, serve};

    #[tokio::test]
    async fn shows_live_peers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (handle, client) = serve("wgctl-show0", dir.path()).await;
        handle.add_peer(PEER_A, "10.0.0.2/32").await.expect("add");

        let mut buf = Vec::new();
        ShowCommand::new(&client)
            .execute(&mut buf, &OutputFormat::new(Format::Json), "wgctl-show0")
            .await
            .expect("show");
        let value: serde_json::Value = serde_json::from_slice(&buf).expect("json");
        assert_eq!(value["interface"], "wgctl-show0");
        assert_eq!(value["peers"][0]["public_key"], PEER_A);
        assert_eq!(value["peers"][0]["allowed_ips"][0], "10.0.0.2/32");

        let mut buf = Vec::new();
        ShowCommand::new(&client)
            .execute(&mut buf, &OutputFormat::default(), "wgctl-show0")
            .await
            .expect("show");
        assert!(output(buf).contains("Interface: wgctl-show0"));
        handle.close().await.expect("close");
    }

    #[tokio::test]
    async fn unknown_interface_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (handle, client) = serve("wgctl-show1", dir.path()).await;
        let err = ShowCommand::new(&client)
            .execute(&mut Vec::new(), &OutputFormat::default(), "wgctl-none")
            .await
            .expect_err("no device");
        assert!(matches!(err, CliError::Device(_)));
        handle.close().await.expect("close");
    }
}
