//! Persisted record shapes

use serde::{Deserialize, Serialize};

use crate::types::{AccountType, ActionType, AddressStatus, CoinTypeCode, TxType};
use crate::wallet::derivation::{AddressEncodings, WalletKey};

/// One derived (or imported) account key held by an offline wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountKeyRecord {
    pub coin: CoinTypeCode,
    pub account: AccountType,
    pub index: u32,
    pub path: String,
    /// WIF (or hex secret for account-based chains)
    pub private_key: String,
    pub full_pubkey: String,
    /// Address under the configured encoding
    pub address: String,
    #[serde(default)]
    pub encodings: Option<AddressEncodings>,
    #[serde(default)]
    pub redeem_script: Option<String>,
    #[serde(default)]
    pub multisig_address: Option<String>,
    #[serde(default)]
    pub multisig_redeem_script: Option<String>,
    pub status: AddressStatus,
    pub updated_at: i64,
}

impl AccountKeyRecord {
    pub fn from_key(coin: CoinTypeCode, account: AccountType, key: &WalletKey, now: i64) -> Self {
        Self {
            coin,
            account,
            index: key.index,
            path: key.path.clone(),
            private_key: key.private_key.clone(),
            full_pubkey: key.full_pubkey.clone(),
            address: key.address.clone(),
            encodings: key.encodings.clone(),
            redeem_script: key.redeem_script.clone(),
            multisig_address: None,
            multisig_redeem_script: None,
            status: AddressStatus::HdKeyGenerated,
            updated_at: now,
        }
    }

    /// True when `address` is any address this key controls
    pub fn owns_address(&self, address: &str) -> bool {
        self.address == address
            || self.multisig_address.as_deref() == Some(address)
            || self
                .encodings
                .as_ref()
                .map(|e| e.contains(address))
                .unwrap_or(false)
    }

    /// Address handed to the watch wallet: multisig when one exists
    pub fn exported_address(&self) -> &str {
        self.multisig_address.as_deref().unwrap_or(&self.address)
    }
}

/// Authorization public key imported from the signing wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPubkeyRecord {
    pub coin: CoinTypeCode,
    pub account: AccountType,
    pub full_pubkey: String,
}

/// Receiving address known to the online wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchAddress {
    pub coin: CoinTypeCode,
    pub account: AccountType,
    pub address: String,
    pub index: u32,
    pub is_allocated: bool,
}

/// A withdrawal queued for the next payment batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: u64,
    pub sender: AccountType,
    pub receiver_address: String,
    /// Satoshis
    pub amount: u64,
    pub is_done: bool,
    #[serde(default)]
    pub tx_id: Option<i64>,
}

/// Transaction header row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub id: i64,
    pub action: ActionType,
    pub unsigned_hex: String,
    #[serde(default)]
    pub signed_hex: Option<String>,
    #[serde(default)]
    pub sent_hash: Option<String>,
    pub total_input: u64,
    pub total_output: u64,
    pub fee: u64,
    pub tx_type: TxType,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInputRecord {
    pub tx_id: i64,
    pub input_txid: String,
    pub input_vout: u32,
    pub input_address: String,
    #[serde(default)]
    pub input_account: Option<AccountType>,
    pub input_amount: u64,
    pub input_confirmations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutputRecord {
    pub tx_id: i64,
    pub output_address: String,
    #[serde(default)]
    pub output_account: Option<AccountType>,
    pub output_amount: u64,
    pub is_change: bool,
}

/// Everything written when a new unsigned transaction is recorded.
/// `tx.id` and the row `tx_id`s are assigned by the store.
#[derive(Debug, Clone)]
pub struct TxBundle {
    pub tx: TxRecord,
    pub inputs: Vec<TxInputRecord>,
    pub outputs: Vec<TxOutputRecord>,
    /// Payment requests settled by this transaction
    pub payment_request_ids: Vec<u64>,
}
