//! Key Derivation Paths
//!
//! Every wallet key lives at `m/purpose'/coinType'/account'/0/index`.
//! This module builds, parses and range-checks those paths.

use crate::error::{WalletError, WalletResult};
use bitcoin::bip32::{ChildNumber, DerivationPath};
use std::fmt;
use std::str::FromStr;

/// Standard BIP purposes
pub mod bip_purposes {
    pub const BIP44: u32 = 44; // Legacy (P2PKH)
    pub const BIP49: u32 = 49; // SegWit compatible (P2SH-P2WPKH)
    pub const BIP84: u32 = 84; // Native SegWit (P2WPKH)
    pub const BIP86: u32 = 86; // Taproot (P2TR)
}

/// Hardened offset for BIP-32 derivation
pub const HARDENED: u32 = 0x80000000;

/// Highest non-hardened child index
pub const MAX_NORMAL_INDEX: u32 = HARDENED - 1;

/// Upper bound on keys generated in one call
pub const MAX_KEY_COUNT: u32 = 10_000;

/// Accepted seed lengths in bytes
pub const MIN_SEED_LEN: usize = 16;
pub const MAX_SEED_LEN: usize = 64;

/// Fully specified wallet key path; only the external chain is used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPath {
    pub purpose: u32,
    pub coin_type: u32,
    pub account: u32,
    pub change: u32,
    pub index: u32,
}

impl KeyPath {
    pub fn new(purpose: u32, coin_type: u32, account: u32, index: u32) -> Self {
        Self {
            purpose,
            coin_type,
            account,
            change: 0,
            index,
        }
    }

    /// Convert to a rust-bitcoin path
    pub fn to_bip32(&self) -> WalletResult<DerivationPath> {
        let children = vec![
            ChildNumber::from_hardened_idx(self.purpose)?,
            ChildNumber::from_hardened_idx(self.coin_type)?,
            ChildNumber::from_hardened_idx(self.account)?,
            ChildNumber::from_normal_idx(self.change)?,
            ChildNumber::from_normal_idx(self.index)?,
        ];
        Ok(DerivationPath::from(children))
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m/{}'/{}'/{}'/{}/{}",
            self.purpose, self.coin_type, self.account, self.change, self.index
        )
    }
}

impl FromStr for KeyPath {
    type Err = WalletError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let trimmed = path.trim();
        let body = trimmed
            .strip_prefix("m/")
            .or_else(|| trimmed.strip_prefix("M/"))
            .ok_or_else(|| WalletError::validation("Derivation path must start with 'm/'"))?;

        let components = body
            .split('/')
            .map(parse_component)
            .collect::<WalletResult<Vec<_>>>()?;

        match components.as_slice() {
            [(purpose, true), (coin_type, true), (account, true), (change, false), (index, false)] => {
                Ok(KeyPath {
                    purpose: *purpose,
                    coin_type: *coin_type,
                    account: *account,
                    change: *change,
                    index: *index,
                })
            }
            _ => Err(WalletError::validation(format!(
                "'{}' is not of the form m/purpose'/coin'/account'/change/index",
                path
            ))),
        }
    }
}

/// Parse a single path component into (index, hardened)
fn parse_component(s: &str) -> WalletResult<(u32, bool)> {
    let trimmed = s.trim();

    if trimmed.is_empty() {
        return Err(WalletError::validation("Empty path component"));
    }

    let (number_str, hardened) = match trimmed.strip_suffix(['\'', 'h', 'H']) {
        Some(number) => (number, true),
        None => (trimmed, false),
    };

    let index: u32 = number_str
        .parse()
        .map_err(|e| WalletError::validation(format!("Invalid path component '{}': {}", s, e)))?;

    if index >= HARDENED {
        return Err(WalletError::validation(format!(
            "Path component {} exceeds maximum value",
            index
        )));
    }

    Ok((index, hardened))
}

/// Check a seed length against the accepted range
pub fn validate_seed_len(len: usize) -> WalletResult<()> {
    if !(MIN_SEED_LEN..=MAX_SEED_LEN).contains(&len) {
        return Err(WalletError::validation(format!(
            "seed must be {}-{} bytes, got {}",
            MIN_SEED_LEN, MAX_SEED_LEN, len
        )));
    }
    Ok(())
}

/// Check that `[idx_from, idx_from + count)` stays below the hardened threshold
pub fn validate_index_range(idx_from: u32, count: u32) -> WalletResult<()> {
    if count == 0 || count > MAX_KEY_COUNT {
        return Err(WalletError::validation(format!(
            "count must be between 1 and {}, got {}",
            MAX_KEY_COUNT, count
        )));
    }
    if idx_from > MAX_NORMAL_INDEX {
        return Err(WalletError::validation(format!(
            "index {} is in the hardened range",
            idx_from
        )));
    }
    let last = u64::from(idx_from) + u64::from(count) - 1;
    if last > u64::from(MAX_NORMAL_INDEX) {
        return Err(WalletError::validation(format!(
            "index range {}..{} crosses the hardened threshold",
            idx_from, last
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_display() {
        let path = KeyPath::new(bip_purposes::BIP84, 0, 2, 7);
        assert_eq!(path.to_string(), "m/84'/0'/2'/0/7");
    }

    #[test]
    fn test_parse_standard_path() {
        let path: KeyPath = "m/86'/1'/11'/0/42".parse().unwrap();
        assert_eq!(path.purpose, bip_purposes::BIP86);
        assert_eq!(path.coin_type, 1);
        assert_eq!(path.account, 11);
        assert_eq!(path.index, 42);

        let h_notation: KeyPath = "m/44h/0h/0h/0/0".parse().unwrap();
        assert_eq!(h_notation, KeyPath::new(44, 0, 0, 0));
    }

    #[test]
    fn test_invalid_paths() {
        assert!("84'/0'/0'/0/0".parse::<KeyPath>().is_err());
        assert!("m/84'/0'/0'/0".parse::<KeyPath>().is_err());
        assert!("m/84/0'/0'/0/0".parse::<KeyPath>().is_err());
        assert!("m/84'/0'/0'/0/0'".parse::<KeyPath>().is_err());
        assert!("m/84'/0'/0'/0/2147483648".parse::<KeyPath>().is_err());
        assert!("m/84'/abc'/0'/0/0".parse::<KeyPath>().is_err());
    }

    #[test]
    fn test_to_bip32_children() {
        let path = KeyPath::new(49, 1, 3, 9).to_bip32().unwrap();
        let children: Vec<ChildNumber> = path.into_iter().copied().collect();
        assert_eq!(children.len(), 5);
        assert_eq!(children[0], ChildNumber::Hardened { index: 49 });
        assert_eq!(children[3], ChildNumber::Normal { index: 0 });
        assert_eq!(children[4], ChildNumber::Normal { index: 9 });
    }

    #[test]
    fn test_seed_len_bounds() {
        assert!(validate_seed_len(15).is_err());
        assert!(validate_seed_len(16).is_ok());
        assert!(validate_seed_len(64).is_ok());
        assert!(validate_seed_len(65).is_err());
    }

    #[test]
    fn test_index_range_bounds() {
        assert!(validate_index_range(0, 1).is_ok());
        assert!(validate_index_range(0, MAX_KEY_COUNT).is_ok());
        assert!(validate_index_range(0, 0).is_err());
        assert!(validate_index_range(0, MAX_KEY_COUNT + 1).is_err());
        assert!(validate_index_range(MAX_NORMAL_INDEX, 1).is_ok());
        assert!(validate_index_range(MAX_NORMAL_INDEX, 2).is_err());
        assert!(validate_index_range(HARDENED, 1).is_err());
    }
}
