//! Unified error types for the cold wallet
//!
//! Every operation reports failures through [`WalletError`] so the CLI and
//! the handoff pipeline can classify them consistently.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all wallet operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl WalletError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, msg)
    }

    pub fn insufficient_funds(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientFunds, msg)
    }

    pub fn fee_exceeds_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::FeeExceedsInput, msg)
    }

    pub fn duplicate_transaction(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::DuplicateTransaction, msg)
    }

    pub fn partial_failure(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::PartialFailure, msg)
    }

    pub fn incomplete_signature(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::IncompleteSignature, msg)
    }

    pub fn state_mismatch(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::StateMismatch, msg)
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Persistence, msg)
    }

    pub fn crypto_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Crypto, msg)
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Parse, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Config, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }

    /// True for errors that abort a single batch item but not the batch
    pub fn is_skippable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::Validation | ErrorCode::Crypto | ErrorCode::Parse | ErrorCode::NotFound
        )
    }
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for WalletError {}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Input errors
    Validation,
    Parse,
    Config,

    // Transaction construction
    InsufficientFunds,
    FeeExceedsInput,
    DuplicateTransaction,

    // Signing pipeline
    PartialFailure,
    IncompleteSignature,
    StateMismatch,
    Crypto,

    // Storage
    Persistence,
    NotFound,
    Io,

    // Internal
    Internal,
}

/// Result type alias for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;

// Conversions from common error types

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::new(ErrorCode::Parse, format!("JSON error: {}", e))
    }
}

impl From<toml::de::Error> for WalletError {
    fn from(e: toml::de::Error) -> Self {
        WalletError::new(ErrorCode::Config, format!("TOML error: {}", e))
    }
}

impl From<hex::FromHexError> for WalletError {
    fn from(e: hex::FromHexError) -> Self {
        WalletError::new(ErrorCode::Parse, format!("Hex error: {}", e))
    }
}

impl From<base64::DecodeError> for WalletError {
    fn from(e: base64::DecodeError) -> Self {
        WalletError::new(ErrorCode::Parse, format!("Base64 error: {}", e))
    }
}

impl From<std::io::Error> for WalletError {
    fn from(e: std::io::Error) -> Self {
        WalletError::new(ErrorCode::Io, e.to_string())
    }
}

impl From<bitcoin::bip32::Error> for WalletError {
    fn from(e: bitcoin::bip32::Error) -> Self {
        WalletError::new(ErrorCode::Crypto, format!("BIP32 error: {}", e))
    }
}

impl From<bitcoin::secp256k1::Error> for WalletError {
    fn from(e: bitcoin::secp256k1::Error) -> Self {
        WalletError::new(ErrorCode::Crypto, format!("Secp256k1 error: {}", e))
    }
}

impl From<bitcoin::psbt::Error> for WalletError {
    fn from(e: bitcoin::psbt::Error) -> Self {
        WalletError::new(ErrorCode::Parse, format!("PSBT error: {}", e))
    }
}

impl From<bitcoin::psbt::ExtractTxError> for WalletError {
    fn from(e: bitcoin::psbt::ExtractTxError) -> Self {
        WalletError::new(ErrorCode::IncompleteSignature, format!("PSBT extract error: {}", e))
    }
}

impl From<bitcoin::address::ParseError> for WalletError {
    fn from(e: bitcoin::address::ParseError) -> Self {
        WalletError::new(ErrorCode::Validation, format!("Address error: {}", e))
    }
}

impl From<bitcoin::consensus::encode::Error> for WalletError {
    fn from(e: bitcoin::consensus::encode::Error) -> Self {
        WalletError::new(ErrorCode::Parse, format!("Consensus decode error: {}", e))
    }
}

impl From<bip39::Error> for WalletError {
    fn from(e: bip39::Error) -> Self {
        WalletError::new(ErrorCode::Validation, format!("BIP39 error: {}", e))
    }
}
