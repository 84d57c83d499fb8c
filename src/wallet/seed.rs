//! Seed handling
//!
//! SECURITY: seed bytes live in `Zeroizing` buffers and are cleared on drop.

use bip39::Mnemonic;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{WalletError, WalletResult};

use super::derivation_path::validate_seed_len;

/// Length of a freshly generated seed
pub const GENERATED_SEED_LEN: usize = 32;

/// A validated HD seed
pub struct Seed(Zeroizing<Vec<u8>>);

impl Seed {
    /// Wrap raw bytes, enforcing the accepted length range
    pub fn from_bytes(bytes: &[u8]) -> WalletResult<Self> {
        validate_seed_len(bytes.len())?;
        Ok(Seed(Zeroizing::new(bytes.to_vec())))
    }

    /// Random seed from the operating system RNG
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new(vec![0u8; GENERATED_SEED_LEN]);
        OsRng.fill_bytes(bytes.as_mut_slice());
        Seed(bytes)
    }

    /// Decode a hex-encoded seed as stored by the key store
    pub fn from_hex(hex_seed: &str) -> WalletResult<Self> {
        let bytes = Zeroizing::new(hex::decode(hex_seed.trim())?);
        Self::from_bytes(&bytes)
    }

    /// BIP39 seed (64 bytes) from a mnemonic phrase and optional passphrase
    pub fn from_mnemonic(phrase: &str, passphrase: &str) -> WalletResult<Self> {
        let mnemonic = Mnemonic::parse(phrase)
            .map_err(|e| WalletError::validation(format!("Invalid mnemonic: {}", e)))?;
        let seed = Zeroizing::new(mnemonic.to_seed(passphrase));
        Self::from_bytes(seed.as_ref())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hex encoding for persistence; callers must treat the result as secret
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0.as_slice()))
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Seed([REDACTED:{}bytes])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_seed() {
        let a = Seed::generate();
        let b = Seed::generate();
        assert_eq!(a.len(), GENERATED_SEED_LEN);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_hex_round_trip() {
        let seed = Seed::from_bytes(&[7u8; 32]).unwrap();
        let restored = Seed::from_hex(&seed.to_hex()).unwrap();
        assert_eq!(seed.as_bytes(), restored.as_bytes());
    }

    #[test]
    fn test_length_limits() {
        assert!(Seed::from_bytes(&[0u8; 15]).is_err());
        assert!(Seed::from_bytes(&[0u8; 65]).is_err());
        assert!(Seed::from_hex("zz").is_err());
    }

    #[test]
    fn test_from_mnemonic() {
        let mnemonic = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
        let seed = Seed::from_mnemonic(mnemonic, "").unwrap();
        assert_eq!(seed.len(), 64);
        assert!(hex::encode(seed.as_bytes()).starts_with("5eb00bbddcf069084889a8ab9155568165f5c453"));
        assert!(Seed::from_mnemonic("not a mnemonic", "").is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let seed = Seed::from_bytes(&[1u8; 16]).unwrap();
        assert_eq!(format!("{:?}", seed), "Seed([REDACTED:16bytes])");
    }
}
