//! Persistence capabilities
//!
//! The offline roles (keygen, sign) need a [`KeyStore`]; the online watch
//! role needs a [`WatchStore`]. [`JsonStore`] implements both.

pub mod json_store;
pub mod records;

pub use json_store::JsonStore;
pub use records::{
    AccountKeyRecord, AuthPubkeyRecord, PaymentRequest, TxBundle, TxInputRecord, TxOutputRecord,
    TxRecord, WatchAddress,
};

use crate::error::WalletResult;
use crate::types::{AccountType, ActionType, AddressStatus, CoinTypeCode, TxType};
use crate::wallet::derivation::WalletKey;

/// Key material held by keygen and sign processes
pub trait KeyStore {
    /// Hex seed, if one was stored
    fn seed(&self) -> WalletResult<Option<String>>;

    /// Store the seed; a second seed is rejected
    fn insert_seed(&mut self, seed_hex: &str) -> WalletResult<()>;

    /// One past the highest stored index for `account`
    fn next_index(&self, account: AccountType) -> WalletResult<u32>;

    fn insert_keys(
        &mut self,
        coin: CoinTypeCode,
        account: AccountType,
        keys: &[WalletKey],
    ) -> WalletResult<usize>;

    fn keys_by_status(
        &self,
        account: AccountType,
        status: AddressStatus,
    ) -> WalletResult<Vec<AccountKeyRecord>>;

    /// Move the listed keys (by full pubkey) to `status`; returns rows touched
    fn update_status(
        &mut self,
        account: AccountType,
        full_pubkeys: &[String],
        status: AddressStatus,
    ) -> WalletResult<usize>;

    /// Record a multisig address and advance to `MultisigAddressGenerated`
    fn update_multisig(
        &mut self,
        account: AccountType,
        full_pubkey: &str,
        multisig_address: &str,
        redeem_script: &str,
    ) -> WalletResult<()>;

    /// Keys controlling any of `addresses`
    fn keys_by_addresses(&self, addresses: &[String]) -> WalletResult<Vec<AccountKeyRecord>>;

    fn auth_pubkey(&self, account: AccountType) -> WalletResult<Option<AuthPubkeyRecord>>;

    /// Store an imported authorization pubkey; one per account
    fn insert_auth_pubkey(&mut self, record: AuthPubkeyRecord) -> WalletResult<()>;

    /// Keys of every authorization account this process holds
    fn owned_auth_keys(&self) -> WalletResult<Vec<AccountKeyRecord>>;
}

/// Addresses, payment queue and transaction rows held by the watch process
pub trait WatchStore {
    /// Insert addresses, skipping ones already present; returns count added
    fn insert_addresses(&mut self, addresses: Vec<WatchAddress>) -> WalletResult<usize>;

    fn addresses(&self, account: AccountType) -> WalletResult<Vec<WatchAddress>>;

    fn one_unallocated(&self, account: AccountType) -> WalletResult<Option<WatchAddress>>;

    fn mark_allocated(&mut self, address: &str) -> WalletResult<()>;

    fn insert_payment_request(
        &mut self,
        sender: AccountType,
        receiver_address: &str,
        amount: u64,
    ) -> WalletResult<u64>;

    fn pending_payment_requests(&self) -> WalletResult<Vec<PaymentRequest>>;

    fn count_by_unsigned_hex(&self, action: ActionType, unsigned_hex: &str) -> WalletResult<usize>;

    /// Atomically insert a tx with its rows and settle payment requests.
    /// Returns the new tx id.
    fn insert_tx_bundle(&mut self, bundle: TxBundle) -> WalletResult<i64>;

    fn tx(&self, id: i64) -> WalletResult<Option<TxRecord>>;

    fn tx_outputs(&self, id: i64) -> WalletResult<Vec<TxOutputRecord>>;

    fn txs_by_type(&self, action: ActionType, tx_type: TxType) -> WalletResult<Vec<TxRecord>>;

    fn update_tx_type(&mut self, id: i64, tx_type: TxType) -> WalletResult<()>;

    /// Record broadcast results and move the tx to `Sent`
    fn update_sent(&mut self, id: i64, signed_hex: &str, sent_hash: &str) -> WalletResult<()>;
}
