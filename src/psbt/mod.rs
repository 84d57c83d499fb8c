//! PSBT Module
//!
//! Creates, inspects, signs and finalizes BIP174 envelopes. Pure compute:
//! nothing here touches the filesystem or the network.

pub mod coordinator;
pub mod finalizer;

pub use coordinator::{
    attach_script, classify_input, create_psbt, input_is_complete, parse_psbt, psbt_fee,
    sign_with_keys, summarize, validate_psbt, InputScript, PsbtSummary, SignOutcome,
};
pub use finalizer::{extract_tx, finalize_psbt};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bitcoin::psbt::Psbt;

use crate::error::{ErrorCode, WalletError, WalletResult};

/// Failures specific to PSBT processing
#[derive(Debug, thiserror::Error)]
pub enum PsbtError {
    #[error("Input {0} has no previous output attached")]
    MissingPrevout(usize),

    #[error("Input {index}: unsupported script ({reason})")]
    UnsupportedScript { index: usize, reason: String },

    #[error("Input {index}: script does not match scriptPubKey")]
    ScriptMismatch { index: usize },

    #[error("Input {0} is not fully signed")]
    Incomplete(usize),

    #[error("Input {0} is not finalized")]
    NotFinalized(usize),

    #[error("Sighash computation failed: {0}")]
    Sighash(String),

    #[error("None of the provided keys can sign this transaction")]
    NoMatchingKey,
}

impl From<PsbtError> for WalletError {
    fn from(e: PsbtError) -> Self {
        let code = match &e {
            PsbtError::MissingPrevout(_) | PsbtError::ScriptMismatch { .. } => ErrorCode::Validation,
            PsbtError::UnsupportedScript { .. } => ErrorCode::Validation,
            PsbtError::Incomplete(_) | PsbtError::NotFinalized(_) => ErrorCode::IncompleteSignature,
            PsbtError::Sighash(_) => ErrorCode::Crypto,
            PsbtError::NoMatchingKey => ErrorCode::Validation,
        };
        WalletError::new(code, e.to_string())
    }
}

/// Base64 encoding of the serialized envelope
pub fn encode_psbt(psbt: &Psbt) -> String {
    STANDARD.encode(psbt.serialize())
}

/// Decode a base64 envelope, ignoring surrounding whitespace
pub fn decode_psbt(encoded: &str) -> WalletResult<Psbt> {
    let bytes = STANDARD.decode(encoded.trim())?;
    Ok(Psbt::deserialize(&bytes)?)
}
