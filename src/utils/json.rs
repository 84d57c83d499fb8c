//! JSON and private-file helpers
//!
//! Everything the wallet writes to disk may hold keys or signed
//! transactions, so files are created owner-only on Unix.

use crate::error::{WalletError, WalletResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Parse a JSON string into a type
pub fn parse_json<T: DeserializeOwned>(json_str: &str) -> WalletResult<T> {
    serde_json::from_str(json_str)
        .map_err(|e| WalletError::parse_error(format!("JSON parse error: {}", e)))
}

/// Read and parse a JSON file
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> WalletResult<T> {
    let text = fs::read_to_string(path)?;
    parse_json(&text).map_err(|e| e.with_details(path.display().to_string()))
}

/// Create a directory tree, owner-only on Unix
pub fn create_private_dir(dir: &Path) -> WalletResult<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Write `contents` to a new owner-only file, replacing any existing one
pub fn write_private_file(path: &Path, contents: &[u8]) -> WalletResult<()> {
    if let Some(parent) = path.parent() {
        create_private_dir(parent)?;
    }
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}

/// Serialize `value` next to `path` and rename it into place
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> WalletResult<()> {
    let body = serde_json::to_vec_pretty(value)?;
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);

    write_private_file(tmp, &body)?;
    fs::rename(tmp, path).map_err(|e| {
        let _ = fs::remove_file(tmp);
        WalletError::persistence(format!("failed to replace {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_json_error_code() {
        let err = parse_json::<BTreeMap<String, u32>>("{not json").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Parse);
    }

    #[test]
    fn test_atomic_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let mut value = BTreeMap::new();
        value.insert("a".to_string(), 1u32);

        write_json_atomic(&path, &value).unwrap();
        value.insert("b".to_string(), 2);
        write_json_atomic(&path, &value).unwrap();

        let loaded: BTreeMap<String, u32> = read_json_file(&path).unwrap();
        assert_eq!(loaded, value);
        assert!(!dir.path().join("nested").join("state.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_private_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("secret.txt");
        write_private_file(&path, b"x").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let dir_mode = fs::metadata(dir.path().join("sub")).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }
}
