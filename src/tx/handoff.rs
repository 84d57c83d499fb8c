//! Handoff files between the watch, keygen and sign processes
//!
//! File name: `{action}_{txID}_{txType}_{signedCount}_{unixNanos}.psbt`,
//! content: base64 PSBT.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{WalletError, WalletResult};
use crate::types::{ActionType, TxType};
use crate::utils::json::write_private_file;
use crate::utils::unix_nanos;

pub const PSBT_EXTENSION: &str = "psbt";

/// Identity of a handoff artifact, as encoded in its file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffFile {
    pub action: ActionType,
    pub tx_id: i64,
    pub tx_type: TxType,
    pub signed_count: u32,
    pub timestamp: i64,
}

impl HandoffFile {
    /// New artifact identity stamped with the current time
    pub fn new(action: ActionType, tx_id: i64, tx_type: TxType, signed_count: u32) -> Self {
        Self {
            action,
            tx_id,
            tx_type,
            signed_count,
            timestamp: unix_nanos(),
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}.{}",
            self.action, self.tx_id, self.tx_type, self.signed_count, self.timestamp, PSBT_EXTENSION
        )
    }

    /// Parse the file name part of `path`
    pub fn parse(path: &Path) -> WalletResult<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| WalletError::validation(format!("invalid file path {}", path.display())))?;

        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() != 5 {
            return Err(WalletError::validation(format!(
                "file name {} must have 5 parts, found {}",
                stem,
                parts.len()
            )));
        }
        let bad = |what: &str, value: &str| WalletError::validation(format!("invalid {} in file name: {}", what, value));

        Ok(Self {
            action: parts[0].parse().map_err(|_| bad("action", parts[0]))?,
            tx_id: parts[1].parse().map_err(|_| bad("tx id", parts[1]))?,
            tx_type: parts[2].parse().map_err(|_| bad("tx type", parts[2]))?,
            signed_count: parts[3].parse().map_err(|_| bad("signed count", parts[3]))?,
            timestamp: parts[4].parse().map_err(|_| bad("timestamp", parts[4]))?,
        })
    }
}

/// Parse `path` and require the artifact to be in `expected` state
pub fn validate_file_path(path: &Path, expected: TxType) -> WalletResult<HandoffFile> {
    let file = HandoffFile::parse(path)?;
    if file.tx_type != expected {
        return Err(WalletError::state_mismatch(format!(
            "{} is {}, expected {}",
            path.display(),
            file.tx_type,
            expected
        )));
    }
    Ok(file)
}

fn check_base64(content: &str) -> WalletResult<()> {
    STANDARD
        .decode(content)
        .map(|_| ())
        .map_err(|e| WalletError::validation(format!("content is not base64: {}", e)))
}

/// Read a handoff file and return its trimmed base64 content
pub fn read_psbt_file(path: &Path) -> WalletResult<String> {
    let is_psbt = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(PSBT_EXTENSION))
        .unwrap_or(false);
    if !is_psbt {
        return Err(WalletError::validation(format!(
            "{} is not a .{} file",
            path.display(),
            PSBT_EXTENSION
        )));
    }
    let content = fs::read_to_string(path)?;
    let content = content.trim();
    check_base64(content)?;
    Ok(content.to_string())
}

/// Write base64 `content` under `dir`; returns the new path
pub fn write_psbt_file(dir: &Path, file: &HandoffFile, content: &str) -> WalletResult<PathBuf> {
    let content = content.trim();
    check_base64(content)?;
    let path = dir.join(file.file_name());
    write_private_file(&path, content.as_bytes())?;
    Ok(path)
}
