//! Transaction Tracker
//!
//! Moves sent transactions to done once they are buried deep enough, then
//! reports done transactions and marks them notified.

use bitcoin::Txid;
use serde::Serialize;
use std::str::FromStr;

use crate::chain::ChainAdapter;
use crate::error::{WalletError, WalletResult};
use crate::storage::{TxRecord, WatchStore};
use crate::types::{ActionType, TxType};
use crate::{log_debug, log_info, log_warn};

use super::state::transition;

/// What one monitoring pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    pub confirmed: Vec<i64>,
    pub notified: Vec<i64>,
    /// Sent transactions still short of the required depth
    pub pending: usize,
}

fn sent_txid(record: &TxRecord) -> WalletResult<Txid> {
    let hash = record
        .sent_hash
        .as_deref()
        .ok_or_else(|| WalletError::validation(format!("tx {} has no sent hash", record.id)))?;
    Txid::from_str(hash).map_err(|e| WalletError::parse_error(format!("bad sent hash {}: {}", hash, e)))
}

/// One pass over the transactions of `action`
pub fn monitor_action<C, S>(
    chain: &C,
    store: &mut S,
    action: ActionType,
    confirmation_num: u64,
) -> WalletResult<MonitorReport>
where
    C: ChainAdapter,
    S: WatchStore,
{
    let mut report = MonitorReport::default();

    for record in store.txs_by_type(action, TxType::Sent)? {
        let confirmations = match sent_txid(&record).and_then(|txid| chain.confirmations(&txid)) {
            Ok(n) => n,
            Err(e) if e.is_skippable() => {
                log_warn!("tracker", "couldn't check confirmations", tx_id = record.id, error = e);
                continue;
            }
            Err(e) => return Err(e),
        };
        if confirmations >= confirmation_num {
            transition(store, record.id, TxType::Done)?;
            report.confirmed.push(record.id);
        } else {
            log_debug!("tracker", "waiting for confirmations", tx_id = record.id, confirmations = confirmations);
            report.pending += 1;
        }
    }

    for record in store.txs_by_type(action, TxType::Done)? {
        log_info!(
            "tracker",
            "transaction completed",
            action = action,
            tx_id = record.id,
            txid = record.sent_hash.as_deref().unwrap_or(""),
            total_output = record.total_output,
            fee = record.fee,
        );
        transition(store, record.id, TxType::Notified)?;
        report.notified.push(record.id);
    }

    Ok(report)
}

/// Monitor every action type
pub fn monitor_all<C, S>(chain: &C, store: &mut S, confirmation_num: u64) -> WalletResult<MonitorReport>
where
    C: ChainAdapter,
    S: WatchStore,
{
    let mut total = MonitorReport::default();
    for action in [ActionType::Deposit, ActionType::Payment, ActionType::Transfer] {
        let report = monitor_action(chain, store, action, confirmation_num)?;
        total.confirmed.extend(report.confirmed);
        total.notified.extend(report.notified);
        total.pending += report.pending;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::bitcoin::tests::MockNode;
    use crate::chain::BitcoinAdapter;
    use crate::config::WalletConfig;
    use crate::storage::{JsonStore, TxBundle};

    const HASH_A: &str = "aa00000000000000000000000000000000000000000000000000000000000001";
    const HASH_B: &str = "bb00000000000000000000000000000000000000000000000000000000000002";

    fn sent_tx(store: &mut JsonStore, hex: &str, hash: &str) -> i64 {
        let id = store
            .insert_tx_bundle(TxBundle {
                tx: TxRecord {
                    id: 0,
                    action: ActionType::Deposit,
                    unsigned_hex: hex.to_string(),
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
            .unwrap();
        store.update_tx_type(id, TxType::Signed).unwrap();
        store.update_sent(id, "00", hash).unwrap();
        id
    }

    #[test]
    fn test_confirmed_then_notified() {
        let mut node = MockNode::default();
        node.confirmations.insert(HASH_A.to_string(), 6);
        node.confirmations.insert(HASH_B.to_string(), 2);
        let adapter = BitcoinAdapter::new(node, &WalletConfig::default()).unwrap();

        let mut store = JsonStore::in_memory();
        let a = sent_tx(&mut store, "01", HASH_A);
        let b = sent_tx(&mut store, "02", HASH_B);

        let report = monitor_action(&adapter, &mut store, ActionType::Deposit, 6).unwrap();
        assert_eq!(report.confirmed, vec![a]);
        assert_eq!(report.notified, vec![a]);
        assert_eq!(report.pending, 1);
        assert_eq!(store.tx(a).unwrap().unwrap().tx_type, TxType::Notified);
        assert_eq!(store.tx(b).unwrap().unwrap().tx_type, TxType::Sent);

        // Second pass has nothing new
        let again = monitor_all(&adapter, &mut store, 6).unwrap();
        assert!(again.confirmed.is_empty());
        assert!(again.notified.is_empty());
        assert_eq!(again.pending, 1);
    }

    #[test]
    fn test_bad_hash_is_skipped() {
        let adapter = BitcoinAdapter::new(MockNode::default(), &WalletConfig::default()).unwrap();
        let mut store = JsonStore::in_memory();
        let id = sent_tx(&mut store, "01", "not-a-hash");
        let report = monitor_action(&adapter, &mut store, ActionType::Deposit, 1).unwrap();
        assert!(report.confirmed.is_empty());
        assert_eq!(store.tx(id).unwrap().unwrap().tx_type, TxType::Sent);
    }
}
