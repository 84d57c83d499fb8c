//! UTXO accumulation
//!
//! Inputs are taken first-fit in the order the chain reported them. This is
//! not fee-optimal coin selection and is kept that way on purpose: rebuilding
//! the same batch must reproduce the same unsigned transaction.

use crate::error::{WalletError, WalletResult};
use crate::types::AccountType;
use serde::{Deserialize, Serialize};

// =============================================================================
// Types
// =============================================================================

/// Unspent output as reported by the chain adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub txid: String,
    pub vout: u32,
    pub address: String,
    /// Account label the node files this output under
    pub account: Option<AccountType>,
    /// Value in satoshis
    pub amount: u64,
    pub confirmations: u64,
    /// scriptPubKey hex
    pub script_pubkey: String,
    /// P2SH redeem script hex
    #[serde(default)]
    pub redeem_script: Option<String>,
    /// P2WSH witness script hex
    #[serde(default)]
    pub witness_script: Option<String>,
    #[serde(default = "default_spendable")]
    pub spendable: bool,
}

fn default_spendable() -> bool {
    true
}

impl UnspentOutput {
    /// Outpoint key `txid:vout`
    pub fn key(&self) -> String {
        format!("{}:{}", self.txid, self.vout)
    }
}

/// Result of walking an unspent list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulation {
    pub selected: Vec<UnspentOutput>,
    pub input_total: u64,
    /// False when a nonzero target was never exceeded
    pub is_done: bool,
}

impl Accumulation {
    /// Address of the first selected input; change goes back there
    pub fn first_address(&self) -> Option<&str> {
        self.selected.first().map(|u| u.address.as_str())
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Walk `utxos` in order, stopping once the running total strictly exceeds
/// `target`. A zero target consumes the whole list.
pub fn accumulate_unspent(utxos: &[UnspentOutput], target: u64) -> Accumulation {
    let mut selected = Vec::with_capacity(utxos.len());
    let mut input_total: u64 = 0;
    let mut is_done = target == 0;

    for utxo in utxos {
        input_total = input_total.saturating_add(utxo.amount);
        selected.push(utxo.clone());

        if target != 0 && input_total > target {
            is_done = true;
            break;
        }
    }

    Accumulation {
        selected,
        input_total,
        is_done,
    }
}

/// Like [`accumulate_unspent`] but an unmet target is an error
pub fn select_unspent(utxos: &[UnspentOutput], target: u64) -> WalletResult<Accumulation> {
    let accumulation = accumulate_unspent(utxos, target);
    if !accumulation.is_done {
        return Err(WalletError::insufficient_funds(format!(
            "Need more than {} sats, have {} sats",
            target, accumulation.input_total
        )));
    }
    Ok(accumulation)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn utxo(amount: u64, n: u8) -> UnspentOutput {
        UnspentOutput {
            txid: format!("{:064x}", n),
            vout: 0,
            address: format!("addr{}", n),
            account: Some(AccountType::Client),
            amount,
            confirmations: 6,
            script_pubkey: String::new(),
            redeem_script: None,
            witness_script: None,
            spendable: true,
        }
    }

    #[test]
    fn test_first_fit_in_received_order() {
        // 0.3, 0.4, 0.5 BTC with a 0.5 BTC target
        let list = vec![utxo(30_000_000, 1), utxo(40_000_000, 2), utxo(50_000_000, 3)];
        let acc = select_unspent(&list, 50_000_000).unwrap();
        assert_eq!(acc.selected.len(), 2);
        assert_eq!(acc.input_total, 70_000_000);
        assert_eq!(acc.first_address(), Some("addr1"));
    }

    #[test]
    fn test_exact_match_does_not_stop() {
        let list = vec![utxo(50, 1), utxo(50, 2), utxo(10, 3)];
        let acc = select_unspent(&list, 100).unwrap();
        assert_eq!(acc.selected.len(), 3);
        assert_eq!(acc.input_total, 110);
    }

    #[test]
    fn test_zero_target_sweeps_everything() {
        let list = vec![utxo(1, 1), utxo(2, 2), utxo(3, 3)];
        let acc = select_unspent(&list, 0).unwrap();
        assert_eq!(acc.selected.len(), 3);
        assert_eq!(acc.input_total, 6);
    }

    #[test]
    fn test_insufficient_funds() {
        let list = vec![utxo(10, 1), utxo(20, 2)];
        let err = select_unspent(&list, 30).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InsufficientFunds);
        assert!(!accumulate_unspent(&list, 30).is_done);
    }

    #[test]
    fn test_empty_list() {
        let acc = accumulate_unspent(&[], 0);
        assert!(acc.is_done);
        assert!(acc.selected.is_empty());
        assert_eq!(acc.first_address(), None);
    }
}
