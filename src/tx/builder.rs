//! Transaction Builder
//!
//! Builds the unsigned deposit, payment and transfer transactions on the
//! watch side, records them and hands them off as PSBT files.

use bitcoin::consensus::encode::serialize_hex;
use bitcoin::{Amount, Transaction};
use serde::Serialize;
use std::path::PathBuf;

use crate::chain::{ChainAdapter, DUST_LIMIT};
use crate::config::WalletConfig;
use crate::error::{WalletError, WalletResult};
use crate::psbt::{create_psbt, encode_psbt};
use crate::storage::{TxBundle, TxInputRecord, TxOutputRecord, TxRecord, WatchStore};
use crate::types::{AccountType, ActionType, TxType};
use crate::wallet::utxo::{select_unspent, UnspentOutput};
use crate::{log_info, log_warn};

use super::handoff::{write_psbt_file, HandoffFile};

// =============================================================================
// Types
// =============================================================================

/// Result of a build request; `tx_id == 0` means nothing was created
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildOutcome {
    pub action: ActionType,
    pub tx_id: i64,
    pub file_path: Option<PathBuf>,
    pub input_total: u64,
    pub output_total: u64,
    pub fee: u64,
}

impl BuildOutcome {
    fn noop(action: ActionType) -> Self {
        Self {
            action,
            tx_id: 0,
            file_path: None,
            input_total: 0,
            output_total: 0,
            fee: 0,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.tx_id == 0
    }
}

#[derive(Debug, Clone)]
struct PlannedOutput {
    address: String,
    account: Option<AccountType>,
    amount: u64,
    is_change: bool,
}

/// Sum amounts per receiver, keeping first-appearance order
pub fn merge_payments<'a, I>(requests: I) -> Vec<(String, u64)>
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    let mut merged: Vec<(String, u64)> = Vec::new();
    for (address, amount) in requests {
        match merged.iter_mut().find(|(a, _)| a == address) {
            Some((_, total)) => *total = total.saturating_add(amount),
            None => merged.push((address.to_string(), amount)),
        }
    }
    merged
}

// =============================================================================
// Builder
// =============================================================================

/// Unsigned transaction factory over a chain adapter
pub struct TxBuilder<'a, C: ChainAdapter> {
    chain: &'a C,
    config: &'a WalletConfig,
}

impl<'a, C: ChainAdapter> TxBuilder<'a, C> {
    pub fn new(chain: &'a C, config: &'a WalletConfig) -> Self {
        Self { chain, config }
    }

    /// Sweep every client output into one unallocated deposit address
    pub fn create_deposit_tx<S: WatchStore>(
        &self,
        store: &mut S,
        adjustment: Option<f64>,
    ) -> WalletResult<BuildOutcome> {
        self.create_internal_tx(store, ActionType::Deposit, AccountType::Client, AccountType::Deposit, 0, adjustment)
    }

    /// Move funds between two internal accounts; `amount == 0` sweeps
    pub fn create_transfer_tx<S: WatchStore>(
        &self,
        store: &mut S,
        sender: AccountType,
        receiver: AccountType,
        amount: u64,
        adjustment: Option<f64>,
    ) -> WalletResult<BuildOutcome> {
        if !sender.is_transferable() || !receiver.is_transferable() {
            return Err(WalletError::validation(format!(
                "transfer from {} to {} is not allowed",
                sender, receiver
            )));
        }
        if sender == receiver {
            return Err(WalletError::validation("sender and receiver must differ"));
        }
        self.create_internal_tx(store, ActionType::Transfer, sender, receiver, amount, adjustment)
    }

    /// Queue a withdrawal for the next payment batch; returns the request id
    pub fn add_payment_request<S: WatchStore>(
        &self,
        store: &mut S,
        receiver_address: &str,
        amount: u64,
    ) -> WalletResult<u64> {
        // A dust output would make every later batch unbuildable
        if amount < DUST_LIMIT {
            return Err(WalletError::validation(format!(
                "payment amount {} is below dust {}",
                amount, DUST_LIMIT
            )));
        }
        let address = self.chain.decode_address(receiver_address)?;
        let id = store.insert_payment_request(AccountType::Payment, &address.to_string(), amount)?;
        log_info!("tx", "payment request queued", id = id, address = address, amount = amount);
        Ok(id)
    }

    /// Pay every pending request from the payment account
    pub fn create_payment_tx<S: WatchStore>(
        &self,
        store: &mut S,
        adjustment: Option<f64>,
    ) -> WalletResult<BuildOutcome> {
        let action = ActionType::Payment;
        let requests = store.pending_payment_requests()?;
        if requests.is_empty() {
            log_info!("tx", "no pending payment requests");
            return Ok(BuildOutcome::noop(action));
        }

        let utxos = self.chain.list_unspent(AccountType::Payment)?;
        if utxos.is_empty() {
            log_info!("tx", "no unspent outputs", account = AccountType::Payment);
            return Ok(BuildOutcome::noop(action));
        }

        let merged = merge_payments(requests.iter().map(|r| (r.receiver_address.as_str(), r.amount)));
        let requested: u64 = merged.iter().map(|(_, amount)| amount).sum();
        let selection = select_unspent(&utxos, requested)?;

        let mut outputs: Vec<PlannedOutput> = merged
            .into_iter()
            .map(|(address, amount)| PlannedOutput {
                address,
                account: None,
                amount,
                is_change: false,
            })
            .collect();
        if let Some(change_address) = selection.first_address() {
            outputs.push(PlannedOutput {
                address: change_address.to_string(),
                account: Some(AccountType::Payment),
                amount: selection.input_total - requested,
                is_change: true,
            });
        }

        let request_ids = requests.iter().map(|r| r.id).collect();
        self.finish(store, action, &selection.selected, selection.input_total, outputs, request_ids, adjustment)
    }

    fn create_internal_tx<S: WatchStore>(
        &self,
        store: &mut S,
        action: ActionType,
        sender: AccountType,
        receiver: AccountType,
        amount: u64,
        adjustment: Option<f64>,
    ) -> WalletResult<BuildOutcome> {
        let utxos = self.chain.list_unspent(sender)?;
        if utxos.is_empty() {
            log_info!("tx", "no unspent outputs", account = sender);
            return Ok(BuildOutcome::noop(action));
        }

        let receiver_address = store.one_unallocated(receiver)?.ok_or_else(|| {
            WalletError::validation(format!("no unallocated {} address left", receiver))
        })?;
        let selection = select_unspent(&utxos, amount)?;

        let mut outputs = Vec::with_capacity(2);
        if amount == 0 {
            outputs.push(PlannedOutput {
                address: receiver_address.address,
                account: Some(receiver),
                amount: selection.input_total,
                is_change: false,
            });
        } else {
            outputs.push(PlannedOutput {
                address: receiver_address.address,
                account: Some(receiver),
                amount,
                is_change: false,
            });
            if let Some(change_address) = selection.first_address() {
                outputs.push(PlannedOutput {
                    address: change_address.to_string(),
                    account: Some(sender),
                    amount: selection.input_total - amount,
                    is_change: true,
                });
            }
        }

        self.finish(store, action, &selection.selected, selection.input_total, outputs, Vec::new(), adjustment)
    }

    fn build_tx(&self, inputs: &[UnspentOutput], outputs: &[PlannedOutput]) -> WalletResult<Transaction> {
        let pairs = outputs
            .iter()
            .map(|o| Ok((self.chain.decode_address(&o.address)?, Amount::from_sat(o.amount))))
            .collect::<WalletResult<Vec<_>>>()?;
        self.chain.build_unsigned_tx(inputs, &pairs)
    }

    /// Take the fee out of the sole output, or else the change output
    fn deduct_fee(outputs: &mut [PlannedOutput], fee: u64) -> WalletResult<()> {
        let index = if outputs.len() == 1 {
            0
        } else {
            outputs
                .iter()
                .position(|o| o.is_change)
                .ok_or_else(|| WalletError::internal("no output can carry the fee"))?
        };
        let target = &mut outputs[index];
        let remaining = target.amount.saturating_sub(fee);
        if remaining < DUST_LIMIT {
            return Err(WalletError::fee_exceeds_input(format!(
                "fee {} leaves {} sats on output {}, below dust {}",
                fee, remaining, index, DUST_LIMIT
            )));
        }
        target.amount = remaining;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn finish<S: WatchStore>(
        &self,
        store: &mut S,
        action: ActionType,
        inputs: &[UnspentOutput],
        input_total: u64,
        mut outputs: Vec<PlannedOutput>,
        payment_request_ids: Vec<u64>,
        adjustment: Option<f64>,
    ) -> WalletResult<BuildOutcome> {
        // Provisional amounts may sit below dust before the fee is known
        let provisional = self.build_provisional(inputs, &outputs)?;
        let fee = self.chain.estimate_fee(&provisional, inputs, adjustment)?.to_sat();
        Self::deduct_fee(&mut outputs, fee)?;

        let tx = self.build_tx(inputs, &outputs)?;
        let output_total: u64 = outputs.iter().map(|o| o.amount).sum();
        debug_assert_eq!(output_total + fee, input_total);

        let unsigned_hex = serialize_hex(&tx);
        if store.count_by_unsigned_hex(action, &unsigned_hex)? > 0 {
            log_warn!("tx", "unsigned transaction already recorded, skipped", action = action);
            return Ok(BuildOutcome::noop(action));
        }

        let psbt = create_psbt(tx, inputs)?;

        let bundle = TxBundle {
            tx: TxRecord {
                id: 0,
                action,
                unsigned_hex,
                signed_hex: None,
                sent_hash: None,
                total_input: input_total,
                total_output: output_total,
                fee,
                tx_type: TxType::Unsigned,
                created_at: 0,
                updated_at: 0,
            },
            inputs: inputs
                .iter()
                .map(|u| TxInputRecord {
                    tx_id: 0,
                    input_txid: u.txid.clone(),
                    input_vout: u.vout,
                    input_address: u.address.clone(),
                    input_account: u.account,
                    input_amount: u.amount,
                    input_confirmations: u.confirmations,
                })
                .collect(),
            outputs: outputs
                .iter()
                .map(|o| TxOutputRecord {
                    tx_id: 0,
                    output_address: o.address.clone(),
                    output_account: o.account,
                    output_amount: o.amount,
                    is_change: o.is_change,
                })
                .collect(),
            payment_request_ids,
        };
        let tx_id = store.insert_tx_bundle(bundle)?;

        let handoff = HandoffFile::new(action, tx_id, TxType::Unsigned, 0);
        let path = write_psbt_file(&self.config.file_path.tx, &handoff, &encode_psbt(&psbt))?;
        log_info!(
            "tx",
            "unsigned transaction created",
            action = action,
            tx_id = tx_id,
            inputs = inputs.len(),
            fee = fee,
            file = path.display(),
        );

        Ok(BuildOutcome {
            action,
            tx_id,
            file_path: Some(path),
            input_total,
            output_total,
            fee,
        })
    }

    /// Same shape as the final transaction, without the dust check on
    /// amounts that the fee has not been taken from yet
    fn build_provisional(&self, inputs: &[UnspentOutput], outputs: &[PlannedOutput]) -> WalletResult<Transaction> {
        let padded: Vec<PlannedOutput> = outputs
            .iter()
            .cloned()
            .map(|mut o| {
                o.amount = o.amount.max(DUST_LIMIT);
                o
            })
            .collect();
        self.build_tx(inputs, &padded)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chain::bitcoin::tests::MockNode;
    use crate::chain::BitcoinAdapter;
    use crate::error::ErrorCode;
    use crate::storage::{JsonStore, WatchAddress};
    use crate::types::CoinTypeCode;
    use bitcoin::key::CompressedPublicKey;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};
    use bitcoin::{Address, Network};

    pub(crate) fn testnet_address(n: u8) -> Address {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[n; 32]).unwrap();
        Address::p2wpkh(&CompressedPublicKey(sk.public_key(&secp)), Network::Testnet)
    }

    pub(crate) fn funded_utxo(amount: u64, n: u8, account: AccountType) -> UnspentOutput {
        let address = testnet_address(n);
        let mut u = crate::wallet::utxo::tests::utxo(amount, n);
        u.address = address.to_string();
        u.script_pubkey = hex::encode(address.script_pubkey().as_bytes());
        u.account = Some(account);
        u
    }

    fn setup(
        unspent: Vec<(AccountType, Vec<UnspentOutput>)>,
    ) -> (tempfile::TempDir, WalletConfig, BitcoinAdapter<MockNode>, JsonStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WalletConfig::default();
        config.file_path.tx = dir.path().join("tx");
        let mut node = MockNode::default();
        for (account, list) in unspent {
            node.unspent.insert(account, list);
        }
        let adapter = BitcoinAdapter::new(node, &config).unwrap();

        let mut store = JsonStore::in_memory();
        let addresses = [(AccountType::Deposit, 50u8), (AccountType::Stored, 60u8)]
            .into_iter()
            .map(|(account, n)| WatchAddress {
                coin: CoinTypeCode::Btc,
                account,
                address: testnet_address(n).to_string(),
                index: 0,
                is_allocated: false,
            })
            .collect();
        store.insert_addresses(addresses).unwrap();
        (dir, config, adapter, store)
    }

    #[test]
    fn test_merge_payments_keeps_order() {
        let merged = merge_payments(vec![("b", 1), ("a", 2), ("b", 3)]);
        assert_eq!(merged, vec![("b".to_string(), 4), ("a".to_string(), 2)]);
    }

    #[test]
    fn test_deposit_sweeps_all() {
        let utxos = vec![
            funded_utxo(30_000_000, 1, AccountType::Client),
            funded_utxo(40_000_000, 2, AccountType::Client),
        ];
        let (_dir, config, adapter, mut store) = setup(vec![(AccountType::Client, utxos)]);
        let outcome = TxBuilder::new(&adapter, &config)
            .create_deposit_tx(&mut store, None)
            .unwrap();

        assert_eq!(outcome.tx_id, 1);
        assert_eq!(outcome.input_total, 70_000_000);
        assert_eq!(outcome.output_total + outcome.fee, outcome.input_total);
        let path = outcome.file_path.unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("deposit_1_unsigned_0_"));

        let outputs = store.tx_outputs(1).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].output_address, testnet_address(50).to_string());
        assert!(!outputs[0].is_change);
    }

    #[test]
    fn test_transfer_with_change() {
        let utxos = vec![
            funded_utxo(30_000_000, 1, AccountType::Deposit),
            funded_utxo(40_000_000, 2, AccountType::Deposit),
            funded_utxo(50_000_000, 3, AccountType::Deposit),
        ];
        let (_dir, config, adapter, mut store) = setup(vec![(AccountType::Deposit, utxos)]);
        let outcome = TxBuilder::new(&adapter, &config)
            .create_transfer_tx(&mut store, AccountType::Deposit, AccountType::Stored, 50_000_000, None)
            .unwrap();

        assert_eq!(outcome.input_total, 70_000_000);
        let outputs = store.tx_outputs(outcome.tx_id).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].output_amount, 50_000_000);
        assert!(outputs[1].is_change);
        assert_eq!(outputs[1].output_address, testnet_address(1).to_string());
        assert_eq!(outputs[1].output_amount, 20_000_000 - outcome.fee);
    }

    #[test]
    fn test_transfer_rules() {
        let (_dir, config, adapter, mut store) = setup(vec![]);
        let builder = TxBuilder::new(&adapter, &config);
        for (from, to) in [
            (AccountType::Client, AccountType::Stored),
            (AccountType::Deposit, AccountType::Auth1),
            (AccountType::Stored, AccountType::Stored),
        ] {
            let err = builder.create_transfer_tx(&mut store, from, to, 0, None).unwrap_err();
            assert_eq!(err.code, ErrorCode::Validation);
        }
    }

    #[test]
    fn test_empty_unspent_is_noop() {
        let (dir, config, adapter, mut store) = setup(vec![]);
        let outcome = TxBuilder::new(&adapter, &config)
            .create_deposit_tx(&mut store, None)
            .unwrap();
        assert!(outcome.is_noop());
        assert!(!dir.path().join("tx").exists());
    }

    #[test]
    fn test_insufficient_funds_writes_nothing() {
        let utxos = vec![funded_utxo(10_000, 1, AccountType::Deposit)];
        let (_dir, config, adapter, mut store) = setup(vec![(AccountType::Deposit, utxos)]);
        let err = TxBuilder::new(&adapter, &config)
            .create_transfer_tx(&mut store, AccountType::Deposit, AccountType::Stored, 10_000, None)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientFunds);
        assert!(store.tx(1).unwrap().is_none());
    }

    #[test]
    fn test_fee_exceeds_tiny_sweep() {
        let utxos = vec![funded_utxo(1_200, 1, AccountType::Client)];
        let (_dir, config, adapter, mut store) = setup(vec![(AccountType::Client, utxos)]);
        let err = TxBuilder::new(&adapter, &config)
            .create_deposit_tx(&mut store, None)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::FeeExceedsInput);
        assert!(err.message.ends_with("below dust 546"));
    }

    #[test]
    fn test_payment_batch_and_dedup() {
        let utxos = vec![funded_utxo(100_000_000, 1, AccountType::Payment)];
        let (_dir, config, adapter, mut store) = setup(vec![(AccountType::Payment, utxos)]);
        let a = testnet_address(70).to_string();
        let b = testnet_address(71).to_string();
        store.insert_payment_request(AccountType::Payment, &a, 1_000_000).unwrap();
        store.insert_payment_request(AccountType::Payment, &b, 2_000_000).unwrap();
        store.insert_payment_request(AccountType::Payment, &a, 500_000).unwrap();

        let builder = TxBuilder::new(&adapter, &config);
        let outcome = builder.create_payment_tx(&mut store, None).unwrap();
        assert_eq!(outcome.tx_id, 1);
        let outputs = store.tx_outputs(1).unwrap();
        assert_eq!(outputs.len(), 3);
        assert_eq!((outputs[0].output_address.as_str(), outputs[0].output_amount), (a.as_str(), 1_500_000));
        assert_eq!((outputs[1].output_address.as_str(), outputs[1].output_amount), (b.as_str(), 2_000_000));
        assert!(outputs[2].is_change);
        assert!(store.pending_payment_requests().unwrap().is_empty());

        // Nothing left to pay
        assert!(builder.create_payment_tx(&mut store, None).unwrap().is_noop());
    }

    #[test]
    fn test_add_payment_request_checks_input() {
        let (_dir, config, adapter, mut store) = setup(vec![]);
        let builder = TxBuilder::new(&adapter, &config);
        let receiver = testnet_address(70).to_string();

        assert_eq!(builder.add_payment_request(&mut store, &receiver, 0).unwrap_err().code, ErrorCode::Validation);
        assert!(builder.add_payment_request(&mut store, "not-an-address", 1_000).is_err());
        let mainnet = Address::p2wpkh(
            &CompressedPublicKey(SecretKey::from_slice(&[9; 32]).unwrap().public_key(&Secp256k1::new())),
            Network::Bitcoin,
        );
        assert!(builder.add_payment_request(&mut store, &mainnet.to_string(), 1_000).is_err());

        let id = builder.add_payment_request(&mut store, &receiver, 25_000).unwrap();
        let pending = store.pending_payment_requests().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].amount, 25_000);
    }

    #[test]
    fn test_dust_request_never_reaches_the_batch() {
        let utxos = vec![funded_utxo(100_000_000, 1, AccountType::Payment)];
        let (_dir, config, adapter, mut store) = setup(vec![(AccountType::Payment, utxos)]);
        let builder = TxBuilder::new(&adapter, &config);

        let dust = builder.add_payment_request(&mut store, &testnet_address(70).to_string(), 500);
        assert_eq!(dust.unwrap_err().code, ErrorCode::Validation);
        builder
            .add_payment_request(&mut store, &testnet_address(71).to_string(), 1_000_000)
            .unwrap();

        let outcome = builder.create_payment_tx(&mut store, None).unwrap();
        assert_eq!(outcome.tx_id, 1);
        assert!(store.pending_payment_requests().unwrap().is_empty());
    }

    #[test]
    fn test_rebuild_of_recorded_tx_is_noop() {
        let utxos = vec![funded_utxo(30_000_000, 1, AccountType::Client)];
        let (dir, config, adapter, mut store) = setup(vec![(AccountType::Client, utxos)]);
        let builder = TxBuilder::new(&adapter, &config);
        let first = builder.create_deposit_tx(&mut store, None).unwrap();
        assert_eq!(first.tx_id, 1);

        let second = builder.create_deposit_tx(&mut store, None).unwrap();
        assert!(second.is_noop());
        assert!(store.tx(2).unwrap().is_none());
        assert_eq!(std::fs::read_dir(dir.path().join("tx")).unwrap().count(), 1);
    }

    #[test]
    fn test_adjustment_scales_fee() {
        let utxos = vec![funded_utxo(30_000_000, 1, AccountType::Client)];
        let (_dir, config, adapter, mut store) = setup(vec![(AccountType::Client, utxos.clone())]);
        let plain = TxBuilder::new(&adapter, &config)
            .create_deposit_tx(&mut store, None)
            .unwrap();

        let (_dir2, config2, adapter2, mut store2) = setup(vec![(AccountType::Client, utxos)]);
        let doubled = TxBuilder::new(&adapter2, &config2)
            .create_deposit_tx(&mut store2, Some(2.0))
            .unwrap();
        assert_eq!(doubled.fee, plain.fee * 2);
    }
}
