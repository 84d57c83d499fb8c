//! Transaction Broadcaster
//!
//! Watch side of the final handoff: finalize a fully signed artifact,
//! broadcast it and record the result.

use bitcoin::consensus::encode::serialize_hex;
use serde::Serialize;
use std::path::Path;

use crate::chain::ChainAdapter;
use crate::error::{WalletError, WalletResult};
use crate::psbt::{decode_psbt, extract_tx, finalize_psbt, summarize, validate_psbt};
use crate::storage::WatchStore;
use crate::types::{ActionType, TxType};
use crate::{log_error, log_info};

use super::handoff::{read_psbt_file, validate_file_path};
use super::state::validate_transition;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub tx_id: i64,
    pub action: ActionType,
    pub txid: String,
}

/// Broadcast the signed artifact at `path`
pub fn send_file<C, S>(chain: &C, store: &mut S, path: &Path) -> WalletResult<SendOutcome>
where
    C: ChainAdapter,
    S: WatchStore,
{
    let file = validate_file_path(path, TxType::Signed)?;
    let mut psbt = decode_psbt(&read_psbt_file(path)?)?;
    validate_psbt(&psbt)?;

    let record = store
        .tx(file.tx_id)?
        .ok_or_else(|| WalletError::not_found(format!("tx {} not found", file.tx_id)))?;
    if record.action != file.action {
        return Err(WalletError::state_mismatch(format!(
            "tx {} is a {} transaction, file says {}",
            record.id, record.action, file.action
        )));
    }
    // Signing happens offline, so the row may still read unsigned
    let from = if record.tx_type == TxType::Unsigned {
        validate_transition(TxType::Unsigned, TxType::Signed)?;
        TxType::Signed
    } else {
        record.tx_type
    };
    validate_transition(from, TxType::Sent)?;
    if serialize_hex(&psbt.unsigned_tx) != record.unsigned_hex {
        return Err(WalletError::state_mismatch(format!(
            "file does not carry the transaction recorded as {}",
            record.id
        )));
    }

    if !summarize(&psbt).is_complete {
        return Err(WalletError::incomplete_signature(format!(
            "tx {} is not fully signed",
            record.id
        )));
    }
    finalize_psbt(&mut psbt)?;
    let tx = extract_tx(&psbt)?;

    let txid = match chain.broadcast(&tx) {
        Ok(txid) => txid.to_string(),
        Err(e) => {
            log_error!("broadcaster", "broadcast failed", tx_id = record.id, error = e);
            return Err(e);
        }
    };
    store.update_sent(record.id, &serialize_hex(&tx), &txid)?;

    if matches!(record.action, ActionType::Deposit | ActionType::Transfer) {
        if let Some(receiver) = store.tx_outputs(record.id)?.into_iter().find(|o| !o.is_change) {
            store.mark_allocated(&receiver.output_address)?;
        }
    }

    log_info!("broadcaster", "transaction sent", tx_id = record.id, action = record.action, txid = txid);
    Ok(SendOutcome {
        tx_id: record.id,
        action: record.action,
        txid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::bitcoin::tests::MockNode;
    use crate::chain::BitcoinAdapter;
    use crate::config::WalletConfig;
    use crate::error::ErrorCode;
    use crate::psbt::coordinator::tests::{prev, private_key, spend_tx};
    use crate::psbt::{create_psbt, encode_psbt};
    use crate::storage::{JsonStore, TxBundle, TxRecord};
    use crate::tx::handoff::{write_psbt_file, HandoffFile};
    use bitcoin::key::CompressedPublicKey;
    use bitcoin::secp256k1::Secp256k1;
    use bitcoin::ScriptBuf;

    fn signed_file(dir: &Path, tx_id: i64) -> std::path::PathBuf {
        let key = private_key(1);
        let spk = ScriptBuf::new_p2wpkh(&CompressedPublicKey(key.inner.public_key(&Secp256k1::new())).wpubkey_hash());
        let psbt = create_psbt(spend_tx(1, 9_000), &[prev(10_000, &spk, None)]).unwrap();
        let file = HandoffFile::new(ActionType::Deposit, tx_id, TxType::Signed, 1);
        write_psbt_file(dir, &file, &encode_psbt(&psbt)).unwrap()
    }

    fn record(store: &mut JsonStore, unsigned_hex: &str) -> i64 {
        store
            .insert_tx_bundle(TxBundle {
                tx: TxRecord {
                    id: 0,
                    action: ActionType::Deposit,
                    unsigned_hex: unsigned_hex.to_string(),
                    signed_hex: None,
                    sent_hash: None,
                    total_input: 10_000,
                    total_output: 9_000,
                    fee: 1_000,
                    tx_type: TxType::Unsigned,
                    created_at: 0,
                    updated_at: 0,
                },
                inputs: vec![],
                outputs: vec![],
                payment_request_ids: vec![],
            })
            .unwrap()
    }

    #[test]
    fn test_rejects_before_broadcast() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = BitcoinAdapter::new(MockNode::default(), &WalletConfig::default()).unwrap();
        let mut store = JsonStore::in_memory();

        let unsigned = dir.path().join("deposit_1_unsigned_0_5.psbt");
        std::fs::write(&unsigned, "cHNidP8=").unwrap();
        assert_eq!(send_file(&adapter, &mut store, &unsigned).unwrap_err().code, ErrorCode::StateMismatch);

        let path = signed_file(dir.path(), 1);
        assert_eq!(send_file(&adapter, &mut store, &path).unwrap_err().code, ErrorCode::NotFound);

        // Row exists but records a different transaction
        let id = record(&mut store, "0200");
        assert_eq!(id, 1);
        assert_eq!(send_file(&adapter, &mut store, &path).unwrap_err().code, ErrorCode::StateMismatch);

        // Canceled rows can't be sent
        let unsigned_hex = serialize_hex(&spend_tx(1, 9_000));
        let id = record(&mut store, &unsigned_hex);
        store.update_tx_type(id, TxType::Cancel).unwrap();
        let path = signed_file(dir.path(), id);
        assert_eq!(send_file(&adapter, &mut store, &path).unwrap_err().code, ErrorCode::StateMismatch);
        assert!(adapter.node().sent.borrow().is_empty());
    }

    #[test]
    fn test_unsigned_envelope_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = BitcoinAdapter::new(MockNode::default(), &WalletConfig::default()).unwrap();
        let mut store = JsonStore::in_memory();
        let id = record(&mut store, &serialize_hex(&spend_tx(1, 9_000)));
        let path = signed_file(dir.path(), id);

        let err = send_file(&adapter, &mut store, &path).unwrap_err();
        assert_eq!(err.code, ErrorCode::IncompleteSignature);
        assert_eq!(store.tx(id).unwrap().unwrap().tx_type, TxType::Unsigned);
    }

    #[test]
    fn test_envelope_without_amounts_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = BitcoinAdapter::new(MockNode::default(), &WalletConfig::default()).unwrap();
        let mut store = JsonStore::in_memory();
        let id = record(&mut store, &serialize_hex(&spend_tx(1, 9_000)));

        let bare = bitcoin::Psbt::from_unsigned_tx(spend_tx(1, 9_000)).unwrap();
        let file = HandoffFile::new(ActionType::Deposit, id, TxType::Signed, 1);
        let path = write_psbt_file(dir.path(), &file, &encode_psbt(&bare)).unwrap();

        let err = send_file(&adapter, &mut store, &path).unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);
        assert_eq!(store.tx(id).unwrap().unwrap().tx_type, TxType::Unsigned);
        assert!(adapter.node().sent.borrow().is_empty());
    }
}
