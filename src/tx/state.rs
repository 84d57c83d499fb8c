//! Transaction lifecycle
//!
//! ```text
//! unsigned -> signed -> sent -> done -> notified
//!     \          \        \
//!      +----------+--------+--> canceled
//! ```

use crate::error::{WalletError, WalletResult};
use crate::log_info;
use crate::storage::WatchStore;
use crate::types::TxType;

impl TxType {
    /// Legal forward moves; `notified` and `canceled` are terminal
    pub fn can_transition_to(&self, next: TxType) -> bool {
        use TxType::*;
        matches!(
            (self, next),
            (Unsigned, Signed)
                | (Unsigned, Cancel)
                | (Signed, Sent)
                | (Signed, Cancel)
                | (Sent, Done)
                | (Sent, Cancel)
                | (Done, Notified)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TxType::Notified | TxType::Cancel)
    }
}

pub fn validate_transition(from: TxType, to: TxType) -> WalletResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(WalletError::state_mismatch(format!(
            "illegal transition {} -> {}",
            from, to
        )))
    }
}

/// Check the stored state and apply a transition
pub fn transition<S: WatchStore>(store: &mut S, tx_id: i64, to: TxType) -> WalletResult<TxType> {
    let record = store
        .tx(tx_id)?
        .ok_or_else(|| WalletError::not_found(format!("tx {} not found", tx_id)))?;
    validate_transition(record.tx_type, to)?;
    store.update_tx_type(tx_id, to)?;
    Ok(record.tx_type)
}

/// Cancel a transaction that has not reached a terminal or done state
pub fn cancel_tx<S: WatchStore>(store: &mut S, tx_id: i64) -> WalletResult<()> {
    let from = transition(store, tx_id, TxType::Cancel)?;
    log_info!("tx", "transaction canceled", tx_id = tx_id, from = from);
    Ok(())
}
