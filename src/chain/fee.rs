//! Size-based fee estimation
//!
//! Estimates the virtual size of a transaction from per-input and per-output
//! size constants, then prices it at a sat/vB rate.

use bitcoin::{Amount, Script, ScriptBuf, Transaction};

use crate::config::FeeConfig;
use crate::error::{WalletError, WalletResult};
use crate::log_warn;
use crate::multisig::parse_multisig_script;
use crate::wallet::utxo::UnspentOutput;

/// Transaction size constants (in virtual bytes)
pub struct TxSizeConstants;

impl TxSizeConstants {
    /// Version, locktime, counts and segwit marker
    pub const TX_OVERHEAD: u64 = 10;

    pub const P2PKH_INPUT: u64 = 148;
    pub const P2SH_P2WPKH_INPUT: u64 = 91;
    pub const P2WPKH_INPUT: u64 = 68;
    pub const P2TR_INPUT: u64 = 58;

    pub const P2PKH_OUTPUT: u64 = 34;
    pub const P2SH_OUTPUT: u64 = 32;
    pub const P2WPKH_OUTPUT: u64 = 31;
    pub const P2WSH_OUTPUT: u64 = 43;
    pub const P2TR_OUTPUT: u64 = 43;

    /// Outpoint, sequence and script length byte
    pub const INPUT_BASE: u64 = 41;

    /// DER signature plus sighash byte, worst case
    pub const ECDSA_SIG: u64 = 73;
}

/// Smallest output value the builder will create
pub const DUST_LIMIT: u64 = 546;

/// How an input is spent, as far as its size is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    P2pkh,
    P2shP2wpkh,
    P2wpkh,
    P2tr,
    /// Bare multisig under P2SH
    P2shMultisig { required: u64, total: u64 },
    /// Multisig under P2SH-P2WSH
    P2shP2wshMultisig { required: u64, total: u64 },
    /// Multisig under native P2WSH
    P2wshMultisig { required: u64, total: u64 },
}

fn multisig_shape(script_hex: Option<&str>) -> Option<(u64, u64)> {
    let bytes = hex::decode(script_hex?).ok()?;
    let (required, keys) = parse_multisig_script(Script::from_bytes(&bytes))?;
    Some((required as u64, keys.len() as u64))
}

impl InputKind {
    /// Classify an unspent output by its scriptPubKey and attached scripts.
    /// `hint` covers script-hash outputs whose scripts are not attached.
    pub fn classify(utxo: &UnspentOutput, hint: Option<InputKind>) -> Option<Self> {
        let spk = ScriptBuf::from_bytes(hex::decode(&utxo.script_pubkey).ok()?);
        if spk.is_p2pkh() {
            Some(InputKind::P2pkh)
        } else if spk.is_p2wpkh() {
            Some(InputKind::P2wpkh)
        } else if spk.is_p2tr() {
            Some(InputKind::P2tr)
        } else if spk.is_p2wsh() {
            let script = utxo.witness_script.as_deref().or(utxo.redeem_script.as_deref());
            match multisig_shape(script) {
                Some((required, total)) => Some(InputKind::P2wshMultisig { required, total }),
                None => hint,
            }
        } else if spk.is_p2sh() {
            if let Some((required, total)) = multisig_shape(utxo.witness_script.as_deref()) {
                return Some(InputKind::P2shP2wshMultisig { required, total });
            }
            if let Some((required, total)) = multisig_shape(utxo.redeem_script.as_deref()) {
                return Some(InputKind::P2shMultisig { required, total });
            }
            Some(hint.unwrap_or(InputKind::P2shP2wpkh))
        } else {
            None
        }
    }

    /// Virtual size of this input
    pub fn vsize(&self) -> u64 {
        match *self {
            InputKind::P2pkh => TxSizeConstants::P2PKH_INPUT,
            InputKind::P2shP2wpkh => TxSizeConstants::P2SH_P2WPKH_INPUT,
            InputKind::P2wpkh => TxSizeConstants::P2WPKH_INPUT,
            InputKind::P2tr => TxSizeConstants::P2TR_INPUT,
            InputKind::P2shMultisig { required, total } => {
                // OP_0 <sig>.. <push redeem>
                let redeem = multisig_script_len(total);
                let script_sig = 1 + required * TxSizeConstants::ECDSA_SIG + push_len(redeem) + redeem;
                TxSizeConstants::INPUT_BASE + varint_len(script_sig) - 1 + script_sig
            }
            InputKind::P2shP2wshMultisig { required, total } => {
                // scriptSig pushes the 34-byte witness program
                TxSizeConstants::INPUT_BASE + 35 + witness_vsize(required, total)
            }
            InputKind::P2wshMultisig { required, total } => {
                TxSizeConstants::INPUT_BASE + witness_vsize(required, total)
            }
        }
    }
}

fn multisig_script_len(total: u64) -> u64 {
    // OP_m, n x (push + 33-byte key), OP_n, OP_CHECKMULTISIG
    3 + total * 34
}

fn push_len(len: u64) -> u64 {
    match len {
        0..=75 => 1,
        76..=255 => 2,
        _ => 3,
    }
}

fn varint_len(n: u64) -> u64 {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        _ => 5,
    }
}

/// Witness weight of a multisig spend, in vbytes, rounded up
fn witness_vsize(required: u64, total: u64) -> u64 {
    let script = multisig_script_len(total);
    // item count, empty dummy, signatures, witness script
    let weight = 1 + 1 + required * (1 + TxSizeConstants::ECDSA_SIG) + varint_len(script) + script;
    (weight + 3) / 4
}

/// Output size by scriptPubKey shape
pub fn output_vsize(script_pubkey: &Script) -> u64 {
    if script_pubkey.is_p2wpkh() {
        TxSizeConstants::P2WPKH_OUTPUT
    } else if script_pubkey.is_p2wsh() {
        TxSizeConstants::P2WSH_OUTPUT
    } else if script_pubkey.is_p2tr() {
        TxSizeConstants::P2TR_OUTPUT
    } else if script_pubkey.is_p2sh() {
        TxSizeConstants::P2SH_OUTPUT
    } else {
        TxSizeConstants::P2PKH_OUTPUT
    }
}

/// Prices transactions at a sat/vB rate
#[derive(Debug, Clone)]
pub struct FeeEstimator {
    fee_rate: f64,
    min_relay_fee_rate: f64,
    adjustment_min: f64,
    adjustment_max: f64,
}

impl FeeEstimator {
    pub fn new(fee_rate: f64, config: &FeeConfig) -> Self {
        Self {
            fee_rate,
            min_relay_fee_rate: config.min_relay_fee_rate,
            adjustment_min: config.adjustment_min,
            adjustment_max: config.adjustment_max,
        }
    }

    pub fn from_config(config: &FeeConfig) -> Self {
        Self::new(config.fee_rate, config)
    }

    /// Effective rate after applying the relay floor
    pub fn effective_rate(&self) -> f64 {
        self.fee_rate.max(self.min_relay_fee_rate)
    }

    /// Estimated vsize of `tx` spending `prevouts` (in input order)
    pub fn estimate_vsize<H>(tx: &Transaction, prevouts: &[UnspentOutput], hint: H) -> WalletResult<u64>
    where
        H: Fn(&UnspentOutput) -> Option<InputKind>,
    {
        if prevouts.len() < tx.input.len() {
            return Err(WalletError::validation(format!(
                "{} inputs but only {} prevouts",
                tx.input.len(),
                prevouts.len()
            )));
        }
        let mut vsize = TxSizeConstants::TX_OVERHEAD;
        for utxo in prevouts.iter().take(tx.input.len()) {
            let kind = InputKind::classify(utxo, hint(utxo)).ok_or_else(|| {
                WalletError::validation(format!("cannot size input {}", utxo.key()))
            })?;
            vsize += kind.vsize();
        }
        for output in &tx.output {
            vsize += output_vsize(&output.script_pubkey);
        }
        Ok(vsize)
    }

    /// Fee for a known vsize, with an optional multiplier
    pub fn fee_for_vsize(&self, vsize: u64, adjustment: Option<f64>) -> u64 {
        let mut fee = (self.effective_rate() * vsize as f64).ceil();
        if let Some(multiplier) = adjustment {
            if multiplier >= self.adjustment_min && multiplier <= self.adjustment_max {
                fee = (fee * multiplier).ceil();
            } else {
                log_warn!(
                    "fee",
                    "fee adjustment outside accepted range, ignored",
                    adjustment = multiplier,
                    min = self.adjustment_min,
                    max = self.adjustment_max,
                );
            }
        }
        fee as u64
    }

    pub fn estimate<H>(
        &self,
        tx: &Transaction,
        prevouts: &[UnspentOutput],
        hint: H,
        adjustment: Option<f64>,
    ) -> WalletResult<Amount>
    where
        H: Fn(&UnspentOutput) -> Option<InputKind>,
    {
        let vsize = Self::estimate_vsize(tx, prevouts, hint)?;
        Ok(Amount::from_sat(self.fee_for_vsize(vsize, adjustment)))
    }
}
