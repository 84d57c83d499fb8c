//! Multisig Module
//!
//! M-of-N `OP_CHECKMULTISIG` scripts and the batch builder that assigns a
//! multisig address to every imported key of a multisig account.

pub mod builder;
pub mod script;

pub use builder::{MultisigAddressBuilder, MultisigPolicy, MultisigReport, SkippedRecord};
pub use script::{
    build_multisig_script, multisig_address, parse_full_pubkey, parse_multisig_script,
    MultisigAddress,
};
