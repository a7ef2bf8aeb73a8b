//! Key generation and public key derivation.

use std::io::{BufRead, Write};

use claw_wgembed::{KeyPair, PrivateKey};

use crate::error::CliError;
use crate::output::{KeyOutput, OutputFormat};

/// Key command executor.
#[derive(Debug, Default)]
pub struct KeyCommand;

impl KeyCommand {
    /// Create a new key command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Generates a key pair. Table output prints only the private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS random source fails or output fails.
    pub fn genkey<W: Write>(&self, writer: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let keys = KeyPair::generate()?;
        let out = KeyOutput {
            private_key: Some(keys.private_key().to_base64()),
            public_key: keys.public_key().to_base64(),
        };
        format.write(writer, &out)
    }

    /// Reads a base64 private key from the first line of `reader` and writes
    /// its public key.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if the input is empty or not a
    /// 32-byte base64 key.
    pub fn pubkey<R: BufRead, W: Write>(
        &self,
        reader: &mut R,
        writer: &mut W,
        format: &OutputFormat,
    ) -> Result<(), CliError> {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let text = line.trim();
        if text.is_empty() {
            return Err(CliError::InvalidArgument("no private key on input".into()));
        }

        let private = PrivateKey::from_base64(text)
            .map_err(|_| CliError::InvalidArgument("private key is not 32 bytes of base64".into()))?;
        let out = KeyOutput {
            private_key: None,
            public_key: private.public_key().to_base64(),
        };
        format.write(writer, &out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use crate::commands::testing::output;

    #[test]
    fn genkey_then_pubkey_matches_pair() {
        let cmd = KeyCommand::new();
        let mut generated = Vec::new();
        cmd.genkey(&mut generated, &OutputFormat::new(Format::Json))
            .expect("genkey");
        let value: serde_json::Value = serde_json::from_slice(&generated).expect("json");
        let private = value["private_key"].as_str().expect("private");
        let public = value["public_key"].as_str().expect("public");

        let input = format!("{private}\n").into_bytes();
        let mut buf = Vec::new();
        cmd.pubkey(&mut input.as_slice(), &mut buf, &OutputFormat::default())
            .expect("pubkey");
        assert_eq!(output(buf), format!("{public}\n"));
    }

    #[test]
    fn genkey_table_is_single_line() {
        let mut buf = Vec::new();
        KeyCommand::new()
            .genkey(&mut buf, &OutputFormat::default())
            .expect("genkey");
        let out = output(buf);
        assert_eq!(out.lines().count(), 1);
        assert_eq!(out.trim().len(), 44);
    }

    #[test]
    fn pubkey_known_vector() {
        // RFC 7748 section 6.1, Alice.
        let private = PrivateKey::from_hex(
            "77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a",
        )
        .expect("private");
        let input = private.to_base64().into_bytes();
        let mut buf = Vec::new();
        KeyCommand::new()
            .pubkey(&mut input.as_slice(), &mut buf, &OutputFormat::default())
            .expect("pubkey");
        let public = claw_wgembed::PublicKey::from_hex(
            "8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a",
        )
        .expect("public");
        assert_eq!(output(buf).trim(), public.to_base64());
    }

    #[test]
    fn pubkey_rejects_bad_input() {
        let cmd = KeyCommand::new();
        let err = cmd
            .pubkey(&mut "".as_bytes(), &mut Vec::new(), &OutputFormat::default())
            .expect_err("empty");
        assert!(matches!(err, CliError::InvalidArgument(_)));

        let err = cmd
            .pubkey(&mut "dG9vIHNob3J0\n".as_bytes(), &mut Vec::new(), &OutputFormat::default())
            .expect_err("short");
        assert!(matches!(err, CliError::InvalidArgument(_)));
    }
}
