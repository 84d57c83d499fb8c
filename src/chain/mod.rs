//! Chain Module
//!
//! Everything the wallet needs from a blockchain goes through
//! [`ChainAdapter`]; callers never branch on coin type. [`NodeClient`] is the
//! narrower transport seam an adapter talks to.

pub mod bitcoin;
pub mod fee;
pub mod snapshot;

pub use self::bitcoin::BitcoinAdapter;
pub use fee::{FeeEstimator, InputKind, TxSizeConstants, DUST_LIMIT};
pub use snapshot::SnapshotNode;

use ::bitcoin::{Address, Amount, Network, Transaction, Txid};

use crate::error::WalletResult;
use crate::types::{AccountType, CoinTypeCode};
use crate::wallet::utxo::UnspentOutput;

/// Chain capability used by the transaction builder, broadcaster and tracker
pub trait ChainAdapter {
    fn coin_type(&self) -> CoinTypeCode;

    fn network(&self) -> Network;

    /// Spendable outputs filed under `account`, in node order
    fn list_unspent(&self, account: AccountType) -> WalletResult<Vec<UnspentOutput>>;

    /// Fee for `tx` spending `prevouts`, optionally scaled by `adjustment`
    fn estimate_fee(
        &self,
        tx: &Transaction,
        prevouts: &[UnspentOutput],
        adjustment: Option<f64>,
    ) -> WalletResult<Amount>;

    /// Parse an address and check it belongs to this network
    fn decode_address(&self, address: &str) -> WalletResult<Address>;

    fn build_unsigned_tx(
        &self,
        inputs: &[UnspentOutput],
        outputs: &[(Address, Amount)],
    ) -> WalletResult<Transaction>;

    fn broadcast(&self, tx: &Transaction) -> WalletResult<Txid>;

    fn confirmations(&self, txid: &Txid) -> WalletResult<u64>;
}

/// Minimal node interface, shaped after the JSON-RPC calls it stands for
pub trait NodeClient {
    /// `listunspent` for one account label
    fn list_unspent(&self, account: AccountType) -> WalletResult<Vec<UnspentOutput>>;

    /// `sendrawtransaction`; returns the txid hex
    fn send_raw_transaction(&self, tx_hex: &str) -> WalletResult<String>;

    /// Confirmations of a wallet transaction; 0 when unknown
    fn confirmations(&self, txid: &str) -> WalletResult<u64>;

    /// `estimatesmartfee` in sat/vB, when the node has an estimate
    fn estimate_fee_rate(&self) -> WalletResult<Option<f64>>;
}
