//! Configuration check command.

use std::io::Write;
use std::path::PathBuf;

use tracing::debug;

use crate::error::CliError;
use crate::output::{CheckSummary, OutputFormat};

/// Parses and validates a configuration file without touching any device.
pub struct CheckCommand {
    path: PathBuf,
}

impl CheckCommand {
    /// Create a new check command.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Execute the check command.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read, parsed or
    /// validated.
    pub async fn execute<W: Write>(&self, writer: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let config = claw_wgembed::read_config(&self.path)
            .await
            .map_err(CliError::Config)?;
        debug!(path = %self.path.display(), peers = config.peers.len(), "configuration valid");
        format.write(writer, &CheckSummary::from(&config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use claw_wgembed::{ConfigField, KeyPair};

    use super::*;
    use crate::cli::Format;
    use crate::commands::testing::{PEER_A, output};

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(text.as_bytes()).expect("write");
        file
    }

    #[tokio::test]
    async fn valid_file_prints_summary() {
        let keys = KeyPair::generate().expect("keys");
        let file = write_config(&format!(
            "[Interface]\nPrivateKey = {}\nAddress = 10.0.0.1/24\nListenPort = 51820\n\n\
             [Peer]\nPublicKey = {PEER_A}\nAllowedIPs = 10.0.0.2/32\nPersistentKeepalive = 25\n",
            keys.private_key().to_base64()
        ));

        let mut buf = Vec::new();
        CheckCommand::new(file.path())
            .execute(&mut buf, &OutputFormat::default())
            .await
            .expect("check");
        let out = output(buf);
        assert!(out.contains("Configuration OK"));
        assert!(out.contains(&keys.public_key().to_base64()));
        assert!(out.contains("51820"));
        assert!(out.contains(PEER_A));
    }

    #[tokio::test]
    async fn dns_search_domains_are_accepted() {
        let keys = KeyPair::generate().expect("keys");
        let file = write_config(&format!(
            "[Interface]\nPrivateKey = {}\nDNS = 10.44.0.1, corp.internal\n",
            keys.private_key().to_base64()
        ));

        let mut buf = Vec::new();
        CheckCommand::new(file.path())
            .execute(&mut buf, &OutputFormat::new(Format::Json))
            .await
            .expect("check");
        let value: serde_json::Value = serde_json::from_slice(&buf).expect("json");
        assert_eq!(value["dns"], serde_json::json!(["10.44.0.1"]));
        assert_eq!(value["dns_search"], serde_json::json!(["corp.internal"]));
    }

    #[tokio::test]
    async fn json_output_never_contains_private_key() {
        let keys = KeyPair::generate().expect("keys");
        let private = keys.private_key().to_base64();
        let file = write_config(&format!("[Interface]\nPrivateKey = {private}\n"));

        let mut buf = Vec::new();
        CheckCommand::new(file.path())
            .execute(&mut buf, &OutputFormat::new(Format::Json))
            .await
            .expect("check");
        let out = output(buf);
        assert!(!out.contains(&private));
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(value["public_key"], keys.public_key().to_base64());
    }

    #[tokio::test]
    async fn invalid_file_is_config_error() {
        let file = write_config("[Interface]\nPrivateKey = short\n");
        let err = CheckCommand::new(file.path())
            .execute(&mut Vec::new(), &OutputFormat::default())
            .await
            .expect_err("invalid");
        match err {
            CliError::Config(inner) => assert_eq!(inner.field(), Some(ConfigField::PrivateKey)),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = CheckCommand::new(dir.path().join("absent.conf"))
            .execute(&mut Vec::new(), &OutputFormat::default())
            .await
            .expect_err("missing");
        assert!(matches!(err, CliError::Config(_)));
    }
}
