use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::errors::EngineError;

static HEX_DIGEST: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{64}$").unwrap());

/// Expected SHA-256 digests of the article's audio parts, by part index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumManifest {
    entries: Vec<Option<String>>,
}

impl ChecksumManifest {
    /// Parse a `;`-delimited manifest. Entries are trimmed; empty ones mean
    /// "no digest published for this part".
    pub fn parse(manifest: Option<&str>) -> Self {
        let entries = match manifest {
            Some(text) if !text.trim().is_empty() => text
                .split(';')
                .enumerate()
                .map(|(i, entry)| {
                    let entry = entry.trim();
                    if entry.is_empty() {
                        return None;
                    }
                    if !HEX_DIGEST.is_match(entry) {
                        warn!("Checksum for part {} does not look like a SHA-256 digest", i + 1);
                    }
                    Some(entry.to_lowercase())
                })
                .collect(),
            _ => Vec::new(),
        };
        Self { entries }
    }

    /// Expected digest for a part, if one was published
    pub fn expected_for(&self, part_index: usize) -> Option<&str> {
        self.entries.get(part_index).and_then(|e| e.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }
}

/// Lowercase hex SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Compare bytes against a published digest, ignoring case
pub fn verify(part_index: usize, bytes: &[u8], expected: &str) -> Result<(), EngineError> {
    let actual = sha256_hex(bytes);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(EngineError::ChecksumMismatch {
            part_index,
            expected: expected.trim().to_lowercase(),
            actual,
        })
    }
}

/// Hash a local file in a blocking task
pub async fn sha256_file(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open file for hashing: {:?}", path))?;

        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .context("File hashing task panicked")?
}
