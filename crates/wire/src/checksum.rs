// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checksum manifest parsing (§4.1): the Download Manager fetches a text
//! manifest alongside the update artifact and selects the hash for the
//! file it downloaded before verifying (C1).
//!
//! Accepted formats:
//! - `sha256sum`-style lines: `<64-hex-hash>  [*]<filename>`
//! - a single bare 64-hex-char line with no filename at all

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChecksumError {
    #[error("checksum manifest was empty")]
    Empty,
    #[error("no entry in the manifest matched filename {0:?}")]
    NotFound(String),
    #[error("manifest line {0:?} did not contain a valid 64-character hex hash")]
    Malformed(String),
}

fn is_hex64(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse one manifest line into `(hash, filename)`. `filename` is `None`
/// for a bare hash line. The optional binary-mode marker (`*`) preceding
/// the filename is stripped.
pub fn parse_checksum_line(line: &str) -> Result<(String, Option<String>), ChecksumError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ChecksumError::Malformed(line.to_string()));
    }
    if is_hex64(line) {
        return Ok((line.to_ascii_lowercase(), None));
    }
    let mut parts = line.splitn(2, char::is_whitespace);
    let hash = parts.next().unwrap_or_default();
    if !is_hex64(hash) {
        return Err(ChecksumError::Malformed(line.to_string()));
    }
    let rest = parts.next().unwrap_or_default().trim_start();
    let filename = rest.strip_prefix('*').unwrap_or(rest);
    if filename.is_empty() {
        return Ok((hash.to_ascii_lowercase(), None));
    }
    Ok((hash.to_ascii_lowercase(), Some(filename.to_string())))
}

/// Select the hash for `target` out of a whole checksum manifest body.
///
/// - A manifest consisting of exactly one bare-hash line (no filename)
///   always matches, regardless of `target`.
/// - If `target` is empty, the first parseable line's hash is returned.
/// - Otherwise the filename must match exactly.
pub fn select_checksum(manifest: &str, target: &str) -> Result<String, ChecksumError> {
    let mut saw_any = false;
    let mut entries = Vec::new();
    for line in manifest.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(entry) = parse_checksum_line(line) {
            saw_any = true;
            entries.push(entry);
        }
    }
    if !saw_any {
        return Err(ChecksumError::Empty);
    }

    if entries.len() == 1 {
        if let (hash, None) = &entries[0] {
            return Ok(hash.clone());
        }
    }

    if target.is_empty() {
        return entries.into_iter().next().map(|(hash, _)| hash).ok_or(ChecksumError::Empty);
    }

    entries
        .into_iter()
        .find(|(_, filename)| filename.as_deref() == Some(target))
        .map(|(hash, _)| hash)
        .ok_or_else(|| ChecksumError::NotFound(target.to_string()))
}
