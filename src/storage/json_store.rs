//! JSON-file store
//!
//! State is held in memory and, when backed by a file, rewritten whole on
//! every mutation. A mutation runs against a clone; the clone is persisted
//! with write-to-temp + rename and only then replaces the live state, so a
//! failed write leaves both disk and memory untouched.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::chain::DUST_LIMIT;
use crate::error::{WalletError, WalletResult};
use crate::types::{AccountType, ActionType, AddressStatus, CoinTypeCode, TxType};
use crate::utils::json::{read_json_file, write_json_atomic};
use crate::wallet::derivation::WalletKey;

use super::records::*;
use super::{KeyStore, WatchStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoreState {
    seed: Option<String>,
    account_keys: Vec<AccountKeyRecord>,
    auth_pubkeys: Vec<AuthPubkeyRecord>,
    addresses: Vec<WatchAddress>,
    payment_requests: Vec<PaymentRequest>,
    txs: Vec<TxRecord>,
    tx_inputs: Vec<TxInputRecord>,
    tx_outputs: Vec<TxOutputRecord>,
    last_tx_id: i64,
    last_payment_id: u64,
}

/// [`KeyStore`] and [`WatchStore`] over a single JSON document
#[derive(Debug)]
pub struct JsonStore {
    path: Option<PathBuf>,
    state: StoreState,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl JsonStore {
    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: StoreState::default(),
        }
    }

    /// Open `path`, starting empty when it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> WalletResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            read_json_file(&path)?
        } else {
            StoreState::default()
        };
        Ok(Self {
            path: Some(path),
            state,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Apply `f` to a copy of the state and persist it as one unit
    fn commit<T, F>(&mut self, f: F) -> WalletResult<T>
    where
        F: FnOnce(&mut StoreState) -> WalletResult<T>,
    {
        let mut next = self.state.clone();
        let out = f(&mut next)?;
        if let Some(path) = &self.path {
            write_json_atomic(path, &next)
                .map_err(|e| WalletError::persistence(e.message.clone()).with_details(path.display().to_string()))?;
        }
        self.state = next;
        Ok(out)
    }
}

// =============================================================================
// KeyStore
// =============================================================================

impl KeyStore for JsonStore {
    fn seed(&self) -> WalletResult<Option<String>> {
        Ok(self.state.seed.clone())
    }

    fn insert_seed(&mut self, seed_hex: &str) -> WalletResult<()> {
        if self.state.seed.is_some() {
            return Err(WalletError::validation("seed already exists"));
        }
        let seed_hex = seed_hex.to_string();
        self.commit(move |state| {
            state.seed = Some(seed_hex);
            Ok(())
        })
    }

    fn next_index(&self, account: AccountType) -> WalletResult<u32> {
        Ok(self
            .state
            .account_keys
            .iter()
            .filter(|r| r.account == account)
            .map(|r| r.index.saturating_add(1))
            .max()
            .unwrap_or(0))
    }

    fn insert_keys(
        &mut self,
        coin: CoinTypeCode,
        account: AccountType,
        keys: &[WalletKey],
    ) -> WalletResult<usize> {
        let stamp = now();
        self.commit(|state| {
            for key in keys {
                let clash = state
                    .account_keys
                    .iter()
                    .any(|r| r.account == account && (r.index == key.index || r.full_pubkey == key.full_pubkey));
                if clash {
                    return Err(WalletError::validation(format!(
                        "{} key at index {} already stored",
                        account, key.index
                    )));
                }
                state
                    .account_keys
                    .push(AccountKeyRecord::from_key(coin, account, key, stamp));
            }
            Ok(keys.len())
        })
    }

    fn keys_by_status(
        &self,
        account: AccountType,
        status: AddressStatus,
    ) -> WalletResult<Vec<AccountKeyRecord>> {
        Ok(self
            .state
            .account_keys
            .iter()
            .filter(|r| r.account == account && r.status == status)
            .cloned()
            .collect())
    }

    fn update_status(
        &mut self,
        account: AccountType,
        full_pubkeys: &[String],
        status: AddressStatus,
    ) -> WalletResult<usize> {
        let stamp = now();
        self.commit(|state| {
            let mut touched = 0;
            for record in state.account_keys.iter_mut() {
                if record.account == account
                    && record.status < status
                    && full_pubkeys.iter().any(|k| *k == record.full_pubkey)
                {
                    record.status = status;
                    record.updated_at = stamp;
                    touched += 1;
                }
            }
            Ok(touched)
        })
    }

    fn update_multisig(
        &mut self,
        account: AccountType,
        full_pubkey: &str,
        multisig_address: &str,
        redeem_script: &str,
    ) -> WalletResult<()> {
        let stamp = now();
        self.commit(|state| {
            let record = state
                .account_keys
                .iter_mut()
                .find(|r| r.account == account && r.full_pubkey == full_pubkey)
                .ok_or_else(|| {
                    WalletError::not_found(format!("no {} key with pubkey {}", account, full_pubkey))
                })?;
            record.multisig_address = Some(multisig_address.to_string());
            record.multisig_redeem_script = Some(redeem_script.to_string());
            if record.status < AddressStatus::MultisigAddressGenerated {
                record.status = AddressStatus::MultisigAddressGenerated;
            }
            record.updated_at = stamp;
            Ok(())
        })
    }

    fn keys_by_addresses(&self, addresses: &[String]) -> WalletResult<Vec<AccountKeyRecord>> {
        Ok(self
            .state
            .account_keys
            .iter()
            .filter(|r| addresses.iter().any(|a| r.owns_address(a)))
            .cloned()
            .collect())
    }

    fn auth_pubkey(&self, account: AccountType) -> WalletResult<Option<AuthPubkeyRecord>> {
        Ok(self
            .state
            .auth_pubkeys
            .iter()
            .find(|r| r.account == account)
            .cloned())
    }

    fn insert_auth_pubkey(&mut self, record: AuthPubkeyRecord) -> WalletResult<()> {
        if !record.account.is_authorization() {
            return Err(WalletError::validation(format!(
                "{} is not an authorization account",
                record.account
            )));
        }
        if self.state.auth_pubkeys.iter().any(|r| r.account == record.account) {
            return Err(WalletError::validation(format!(
                "full pubkey for {} already imported",
                record.account
            )));
        }
        self.commit(move |state| {
            state.auth_pubkeys.push(record);
            Ok(())
        })
    }

    fn owned_auth_keys(&self) -> WalletResult<Vec<AccountKeyRecord>> {
        Ok(self
            .state
            .account_keys
            .iter()
            .filter(|r| r.account.is_authorization())
            .cloned()
            .collect())
    }
}

// =============================================================================
// WatchStore
// =============================================================================

impl WatchStore for JsonStore {
    fn insert_addresses(&mut self, addresses: Vec<WatchAddress>) -> WalletResult<usize> {
        self.commit(move |state| {
            let mut added = 0;
            for address in addresses {
                if state.addresses.iter().any(|a| a.address == address.address) {
                    continue;
                }
                state.addresses.push(address);
                added += 1;
            }
            Ok(added)
        })
    }

    fn addresses(&self, account: AccountType) -> WalletResult<Vec<WatchAddress>> {
        Ok(self
            .state
            .addresses
            .iter()
            .filter(|a| a.account == account)
            .cloned()
            .collect())
    }

    fn one_unallocated(&self, account: AccountType) -> WalletResult<Option<WatchAddress>> {
        Ok(self
            .state
            .addresses
            .iter()
            .filter(|a| a.account == account && !a.is_allocated)
            .min_by_key(|a| a.index)
            .cloned())
    }

    fn mark_allocated(&mut self, address: &str) -> WalletResult<()> {
        self.commit(|state| {
            let entry = state
                .addresses
                .iter_mut()
                .find(|a| a.address == address)
                .ok_or_else(|| WalletError::not_found(format!("unknown address {}", address)))?;
            entry.is_allocated = true;
            Ok(())
        })
    }

    fn insert_payment_request(
        &mut self,
        sender: AccountType,
        receiver_address: &str,
        amount: u64,
    ) -> WalletResult<u64> {
        if amount < DUST_LIMIT {
            return Err(WalletError::validation(format!(
                "payment amount {} is below dust {}",
                amount, DUST_LIMIT
            )));
        }
        self.commit(|state| {
            state.last_payment_id += 1;
            let id = state.last_payment_id;
            state.payment_requests.push(PaymentRequest {
                id,
                sender,
                receiver_address: receiver_address.to_string(),
                amount,
                is_done: false,
                tx_id: None,
            });
            Ok(id)
        })
    }

    fn pending_payment_requests(&self) -> WalletResult<Vec<PaymentRequest>> {
        Ok(self
            .state
            .payment_requests
            .iter()
            .filter(|p| !p.is_done)
            .cloned()
            .collect())
    }

    fn count_by_unsigned_hex(&self, action: ActionType, unsigned_hex: &str) -> WalletResult<usize> {
        Ok(self
            .state
            .txs
            .iter()
            .filter(|t| t.action == action && t.unsigned_hex == unsigned_hex)
            .count())
    }

    fn insert_tx_bundle(&mut self, bundle: TxBundle) -> WalletResult<i64> {
        let stamp = now();
        self.commit(move |state| {
            state.last_tx_id += 1;
            let id = state.last_tx_id;

            for request_id in &bundle.payment_request_ids {
                let request = state
                    .payment_requests
                    .iter_mut()
                    .find(|p| p.id == *request_id)
                    .ok_or_else(|| WalletError::not_found(format!("payment request {}", request_id)))?;
                if request.is_done {
                    return Err(WalletError::validation(format!(
                        "payment request {} already settled",
                        request_id
                    )));
                }
                request.is_done = true;
                request.tx_id = Some(id);
            }

            let mut tx = bundle.tx;
            tx.id = id;
            tx.created_at = stamp;
            tx.updated_at = stamp;
            state.txs.push(tx);
            state
                .tx_inputs
                .extend(bundle.inputs.into_iter().map(|row| TxInputRecord { tx_id: id, ..row }));
            state
                .tx_outputs
                .extend(bundle.outputs.into_iter().map(|row| TxOutputRecord { tx_id: id, ..row }));
            Ok(id)
        })
    }

    fn tx(&self, id: i64) -> WalletResult<Option<TxRecord>> {
        Ok(self.state.txs.iter().find(|t| t.id == id).cloned())
    }

    fn tx_outputs(&self, id: i64) -> WalletResult<Vec<TxOutputRecord>> {
        Ok(self
            .state
            .tx_outputs
            .iter()
            .filter(|o| o.tx_id == id)
            .cloned()
            .collect())
    }

    fn txs_by_type(&self, action: ActionType, tx_type: TxType) -> WalletResult<Vec<TxRecord>> {
        Ok(self
            .state
            .txs
            .iter()
            .filter(|t| t.action == action && t.tx_type == tx_type)
            .cloned()
            .collect())
    }

    fn update_tx_type(&mut self, id: i64, tx_type: TxType) -> WalletResult<()> {
        let stamp = now();
        self.commit(|state| {
            let tx = find_tx(state, id)?;
            tx.tx_type = tx_type;
            tx.updated_at = stamp;
            Ok(())
        })
    }

    fn update_sent(&mut self, id: i64, signed_hex: &str, sent_hash: &str) -> WalletResult<()> {
        let stamp = now();
        self.commit(|state| {
            let tx = find_tx(state, id)?;
            tx.signed_hex = Some(signed_hex.to_string());
            tx.sent_hash = Some(sent_hash.to_string());
            tx.tx_type = TxType::Sent;
            tx.updated_at = stamp;
            Ok(())
        })
    }
}

fn find_tx(state: &mut StoreState, id: i64) -> WalletResult<&mut TxRecord> {
    state
        .txs
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or_else(|| WalletError::not_found(format!("tx {} not found", id)))
}
