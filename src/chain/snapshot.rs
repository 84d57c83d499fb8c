//! Offline node backed by exported JSON files
//!
//! Layout of the snapshot directory:
//! - `listunspent_{account}.json`: `listunspent` output, amounts in BTC
//! - `confirmations.json`: `{ "<txid>": <confirmations> }`
//! - `fee.json` (optional): `estimatesmartfee` output, `feerate` in BTC/kvB
//!
//! Broadcast transactions are written to the outbox as `{txid}.hex` for an
//! operator to relay.

use bitcoin::{Amount, Transaction};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::NodeConfig;
use crate::error::{WalletError, WalletResult};
use crate::log_info;
use crate::types::AccountType;
use crate::utils::json::{read_json_file, write_private_file};
use crate::wallet::utxo::UnspentOutput;

use super::NodeClient;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListUnspentEntry {
    txid: String,
    vout: u32,
    address: String,
    #[serde(default)]
    label: Option<String>,
    amount: f64,
    confirmations: u64,
    script_pub_key: String,
    #[serde(default)]
    redeem_script: Option<String>,
    #[serde(default)]
    witness_script: Option<String>,
    #[serde(default = "default_true")]
    spendable: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SmartFee {
    #[serde(default)]
    feerate: Option<f64>,
}

/// File-backed [`NodeClient`]
#[derive(Debug, Clone)]
pub struct SnapshotNode {
    snapshot_dir: PathBuf,
    outbox_dir: PathBuf,
}

impl SnapshotNode {
    pub fn new(snapshot_dir: impl Into<PathBuf>, outbox_dir: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_dir: snapshot_dir.into(),
            outbox_dir: outbox_dir.into(),
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(&config.snapshot_dir, &config.outbox_dir)
    }

    pub fn outbox_dir(&self) -> &Path {
        &self.outbox_dir
    }

    fn unspent_path(&self, account: AccountType) -> PathBuf {
        self.snapshot_dir
            .join(format!("listunspent_{}.json", account.as_str()))
    }
}

impl NodeClient for SnapshotNode {
    fn list_unspent(&self, account: AccountType) -> WalletResult<Vec<UnspentOutput>> {
        let path = self.unspent_path(account);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let entries: Vec<ListUnspentEntry> = read_json_file(&path)?;

        entries
            .into_iter()
            .map(|entry| {
                let amount = Amount::from_btc(entry.amount).map_err(|e| {
                    WalletError::parse_error(format!("bad amount {} for {}: {}", entry.amount, entry.txid, e))
                })?;
                let label = match entry.label.as_deref() {
                    Some(label) if !label.is_empty() => label.parse().ok(),
                    _ => None,
                };
                Ok(UnspentOutput {
                    txid: entry.txid,
                    vout: entry.vout,
                    address: entry.address,
                    account: label.or(Some(account)),
                    amount: amount.to_sat(),
                    confirmations: entry.confirmations,
                    script_pubkey: entry.script_pub_key,
                    redeem_script: entry.redeem_script,
                    witness_script: entry.witness_script,
                    spendable: entry.spendable,
                })
            })
            .collect()
    }

    fn send_raw_transaction(&self, tx_hex: &str) -> WalletResult<String> {
        let bytes = hex::decode(tx_hex.trim())?;
        let tx: Transaction = bitcoin::consensus::deserialize(&bytes)
            .map_err(|e| WalletError::parse_error(format!("invalid raw transaction: {}", e)))?;
        let txid = tx.compute_txid().to_string();
        let path = self.outbox_dir.join(format!("{}.hex", txid));
        write_private_file(&path, tx_hex.trim().as_bytes())?;
        log_info!("node", "transaction queued in outbox", txid = txid);
        Ok(txid)
    }

    fn confirmations(&self, txid: &str) -> WalletResult<u64> {
        let path = self.snapshot_dir.join("confirmations.json");
        if !path.exists() {
            return Ok(0);
        }
        let map: BTreeMap<String, u64> = read_json_file(&path)?;
        Ok(map.get(txid).copied().unwrap_or(0))
    }

    fn estimate_fee_rate(&self) -> WalletResult<Option<f64>> {
        let path = self.snapshot_dir.join("fee.json");
        if !path.exists() {
            return Ok(None);
        }
        let fee: SmartFee = read_json_file(&path)?;
        // BTC/kvB to sat/vB
        Ok(fee.feerate.map(|rate| rate * 100_000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn node() -> (tempfile::TempDir, SnapshotNode) {
        let dir = tempfile::tempdir().unwrap();
        let node = SnapshotNode::new(dir.path().join("node"), dir.path().join("outbox"));
        fs::create_dir_all(dir.path().join("node")).unwrap();
        (dir, node)
    }

    #[test]
    fn test_missing_files_mean_empty() {
        let (_dir, node) = node();
        assert!(node.list_unspent(AccountType::Client).unwrap().is_empty());
        assert_eq!(node.confirmations("ab").unwrap(), 0);
        assert_eq!(node.estimate_fee_rate().unwrap(), None);
    }

    #[test]
    fn test_list_unspent_converts_btc() {
        let (dir, node) = node();
        let body = r#"[
            {"txid": "aa", "vout": 1, "address": "tb1qx", "label": "client",
             "amount": 0.3, "confirmations": 4, "scriptPubKey": "0014ab", "spendable": true},
            {"txid": "bb", "vout": 0, "address": "tb1qy",
             "amount": 0.00001, "confirmations": 0, "scriptPubKey": "0014cd", "spendable": false}
        ]"#;
        fs::write(dir.path().join("node/listunspent_client.json"), body).unwrap();

        let list = node.list_unspent(AccountType::Client).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].amount, 30_000_000);
        assert_eq!(list[0].account, Some(AccountType::Client));
        assert_eq!(list[1].amount, 1_000);
        assert!(!list[1].spendable);
    }

    #[test]
    fn test_confirmations_and_fee() {
        let (dir, node) = node();
        fs::write(dir.path().join("node/confirmations.json"), r#"{"ab": 7}"#).unwrap();
        fs::write(dir.path().join("node/fee.json"), r#"{"feerate": 0.0002, "blocks": 6}"#).unwrap();
        assert_eq!(node.confirmations("ab").unwrap(), 7);
        let rate = node.estimate_fee_rate().unwrap().unwrap();
        assert!((rate - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_garbage_broadcast() {
        let (_dir, node) = node();
        assert!(node.send_raw_transaction("zz").is_err());
    }
}
