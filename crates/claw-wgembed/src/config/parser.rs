//! Parser for the INI-style `WireGuard` configuration format.
//!
//! The text is first split on section headers, then every chunk is decoded on
//! its own into a tagged record. Repeated `[Peer]` headers therefore always
//! yield independent peers instead of one merged section.
//!
//! Rules:
//! - `#` and `;` start a comment that runs to the end of the line.
//! - Section names and keys match case-insensitively.
//! - Unknown sections and unknown keys inside a known section are skipped
//!   with a warning.
//! - Multi-valued keys (`Address`, `DNS`, `AllowedIPs`) may repeat and may
//!   hold a comma-separated list; values keep their input order.
//! - Single-valued keys may appear once per section.
//! - A document is returned only when the whole text parses.

use tracing::warn;

use crate::config::document::{ConfigurationDocument, InterfaceSection, PeerSection};
use crate::error::{Result, WgEmbedError};

/// One `key = value` line.
#[derive(Debug)]
struct Entry<'a> {
    line: usize,
    key: &'a str,
    value: &'a str,
}

/// A header and the entries up to the next header.
#[derive(Debug)]
struct Chunk<'a> {
    line: usize,
    name: &'a str,
    entries: Vec<Entry<'a>>,
}

fn strip_comment(line: &str) -> &str {
    let end = line.find(['#', ';']).unwrap_or(line.len());
    line[..end].trim()
}

fn split_chunks(text: &str) -> Result<Vec<Chunk<'_>>> {
    let mut chunks: Vec<Chunk<'_>> = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = strip_comment(raw);
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let name = rest
                .strip_suffix(']')
                .ok_or_else(|| {
                    WgEmbedError::parse(line_number, format!("unterminated section header: {line}"))
                })?
                .trim();
            if name.is_empty() {
                return Err(WgEmbedError::parse(line_number, "empty section name"));
            }
            chunks.push(Chunk {
                line: line_number,
                name,
                entries: Vec::new(),
            });
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(WgEmbedError::parse(
                line_number,
                format!("expected `key = value`, got: {line}"),
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(WgEmbedError::parse(line_number, "missing key before `=`"));
        }
        let entry = Entry {
            line: line_number,
            key,
            value: value.trim(),
        };

        match chunks.last_mut() {
            Some(chunk) => chunk.entries.push(entry),
            None => warn!(line = line_number, key, "ignoring key outside of any section"),
        }
    }

    Ok(chunks)
}

fn set_once<T>(slot: &mut Option<T>, value: T, entry: &Entry<'_>) -> Result<()> {
    if slot.is_some() {
        return Err(WgEmbedError::parse(
            entry.line,
            format!("duplicate key: {}", entry.key),
        ));
    }
    *slot = Some(value);
    Ok(())
}

fn single_value(entry: &Entry<'_>) -> Result<String> {
    if entry.value.is_empty() {
        return Err(WgEmbedError::parse(
            entry.line,
            format!("empty value for {}", entry.key),
        ));
    }
    Ok(entry.value.to_string())
}

fn integer(entry: &Entry<'_>) -> Result<i64> {
    entry.value.parse().map_err(|_| {
        WgEmbedError::parse(
            entry.line,
            format!("{} must be an integer, got: {}", entry.key, entry.value),
        )
    })
}

fn push_list(list: &mut Vec<String>, value: &str) {
    list.extend(
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(ToString::to_string),
    );
}

fn warn_unknown_key(section: &str, entry: &Entry<'_>) {
    warn!(section, key = entry.key, line = entry.line, "ignoring unknown config key");
}

fn decode_interface(chunk: &Chunk<'_>) -> Result<InterfaceSection> {
    let mut private_key = None;
    let mut listen_port = None;
    let mut mtu = None;
    let mut section = InterfaceSection::default();

    for entry in &chunk.entries {
        match entry.key.to_ascii_lowercase().as_str() {
            "privatekey" => set_once(&mut private_key, single_value(entry)?, entry)?,
            "address" => push_list(&mut section.addresses, entry.value),
            "listenport" => set_once(&mut listen_port, integer(entry)?, entry)?,
            "dns" => push_list(&mut section.dns, entry.value),
            "mtu" => set_once(&mut mtu, integer(entry)?, entry)?,
            _ => warn_unknown_key(chunk.name, entry),
        }
    }

    section.private_key = private_key.unwrap_or_default();
    section.listen_port = listen_port;
    section.mtu = mtu;
    Ok(section)
}

fn decode_peer(chunk: &Chunk<'_>) -> Result<PeerSection> {
    let mut public_key = None;
    let mut keepalive = None;
    let mut section = PeerSection::default();

    for entry in &chunk.entries {
        match entry.key.to_ascii_lowercase().as_str() {
            "publickey" => set_once(&mut public_key, single_value(entry)?, entry)?,
            "presharedkey" => set_once(&mut section.preshared_key, single_value(entry)?, entry)?,
            "allowedips" => push_list(&mut section.allowed_ips, entry.value),
            "endpoint" => set_once(&mut section.endpoint, single_value(entry)?, entry)?,
            "persistentkeepalive" => {
                // `off` is the documented spelling for "disabled".
                if entry.value.eq_ignore_ascii_case("off") {
                    set_once(&mut keepalive, None, entry)?;
                } else {
                    set_once(&mut keepalive, Some(integer(entry)?), entry)?;
                }
            }
            _ => warn_unknown_key(chunk.name, entry),
        }
    }

    section.public_key = public_key.unwrap_or_default();
    section.persistent_keepalive = keepalive.flatten();
    Ok(section)
}

/// Parses configuration text into a [`ConfigurationDocument`].
///
/// # Errors
///
/// Returns a `Parse` error carrying the 1-based line number for malformed
/// headers, lines without `=`, non-integer numeric values, duplicate
/// single-valued keys and a second `[Interface]` section.
pub fn parse(text: &str) -> Result<ConfigurationDocument> {
    let mut document = ConfigurationDocument::default();

    for chunk in split_chunks(text)? {
        if chunk.name.eq_ignore_ascii_case("Interface") {
            if document.interface.is_some() {
                return Err(WgEmbedError::parse(chunk.line, "duplicate [Interface] section"));
            }
            document.interface = Some(decode_interface(&chunk)?);
        } else if chunk.name.eq_ignore_ascii_case("Peer") {
            document.peers.push(decode_peer(&chunk)?);
        } else {
            warn!(section = chunk.name, line = chunk.line, "skipping unknown config section");
        }
    }

    Ok(document)
}
