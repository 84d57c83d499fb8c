//! Cold Wallet Core Library
//!
//! Custody toolkit for UTXO coins split across three processes that only
//! share files:
//! - **keygen** (offline): account keys, multisig addresses, first signature
//! - **sign** (offline): authorization keys and the remaining signatures
//! - **watch** (online): address book, unsigned transactions, broadcast, tracking
//!
//! # Architecture
//!
//! - **wallet**: seeds, BIP32/44/49/84/86 derivation, UTXO selection, address exchange
//! - **multisig**: M-of-N scripts and the multisig address builder
//! - **tx**: transaction builder, signing rounds, broadcaster, tracker, handoff files
//! - **psbt**: PSBT creation, signing, finalization and extraction
//! - **chain**: [`chain::ChainAdapter`] and the offline snapshot node
//! - **storage**: persistence traits and the JSON store
//!
//! # Security
//!
//! Seeds are held in `zeroize` buffers and WIFs pass through `secrecy`
//! wrappers. Log fields named after secrets are redacted.
//!
//! # Example
//!
//! ```rust,ignore
//! use cold_wallet::{chain::{BitcoinAdapter, SnapshotNode}, storage::JsonStore, tx::TxBuilder, WalletConfig};
//!
//! let config = WalletConfig::load("watch.toml")?;
//! let chain = BitcoinAdapter::new(SnapshotNode::from_config(&config.node), &config)?;
//! let mut store = JsonStore::open("watch.json")?;
//! let outcome = TxBuilder::new(&chain, &config).create_deposit_tx(&mut store, None)?;
//! ```

pub mod chain;
pub mod config;
pub mod error;
pub mod multisig;
pub mod psbt;
pub mod storage;
pub mod tx;
pub mod types;
pub mod utils;
pub mod wallet;

pub use config::WalletConfig;
pub use error::{ErrorCode, WalletError, WalletResult};
pub use types::{AccountType, ActionType, AddressStatus, AddressType, CoinTypeCode, TxType};
