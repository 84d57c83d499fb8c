//! Wallet Module
//!
//! Seeds, HD derivation, key lifecycle operations, address exchange and
//! UTXO accumulation.

pub mod derivation;
pub mod derivation_path;
pub mod export;
pub mod keygen;
pub mod seed;
pub mod utxo;

pub use derivation::{deriver_for, parse_wif, AddressEncodings, HdKeyDeriver, AccountChainDeriver, KeyDeriver, WalletKey};
pub use derivation_path::KeyPath;
pub use export::{export_addresses, import_addresses};
pub use keygen::{
    create_hd_keys, create_seed, export_full_pubkey, generate_mnemonic, import_full_pubkey,
    import_private_keys, KeyBatch, Role, SeedSource,
};
pub use seed::Seed;
pub use utxo::{accumulate_unspent, select_unspent, Accumulation, UnspentOutput};
