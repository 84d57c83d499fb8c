//! Finalization and extraction

use bitcoin::psbt::Psbt;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::{ScriptBuf, Transaction, Witness};

use crate::error::WalletResult;

use super::coordinator::{classify_input, input_is_complete, is_finalized, ordered_multisig_sigs};
use super::{InputScript, PsbtError};

fn push_bytes(index: usize, bytes: Vec<u8>) -> Result<PushBytesBuf, PsbtError> {
    PushBytesBuf::try_from(bytes).map_err(|e| PsbtError::UnsupportedScript {
        index,
        reason: e.to_string(),
    })
}

fn single_sig(psbt: &Psbt, index: usize) -> Result<(Vec<u8>, Vec<u8>), PsbtError> {
    psbt.inputs[index]
        .partial_sigs
        .iter()
        .next()
        .map(|(pk, sig)| (sig.to_vec(), pk.to_bytes()))
        .ok_or(PsbtError::Incomplete(index))
}

/// `[<empty>, sig_1..sig_M, script]` with signatures in script key order
fn multisig_items(
    psbt: &Psbt,
    index: usize,
    required: usize,
    keys: &[bitcoin::PublicKey],
) -> Result<Vec<Vec<u8>>, PsbtError> {
    let sigs = ordered_multisig_sigs(&psbt.inputs[index], keys);
    if sigs.len() < required {
        return Err(PsbtError::Incomplete(index));
    }
    let mut items = Vec::with_capacity(required + 1);
    items.push(Vec::new());
    items.extend(sigs.into_iter().take(required).map(|s| s.to_vec()));
    Ok(items)
}

fn final_parts(psbt: &Psbt, index: usize) -> Result<(Option<ScriptBuf>, Option<Witness>), PsbtError> {
    let parts = match classify_input(psbt, index)? {
        InputScript::P2pkh => {
            let (sig, pk) = single_sig(psbt, index)?;
            let script = Builder::new()
                .push_slice(push_bytes(index, sig)?)
                .push_slice(push_bytes(index, pk)?)
                .into_script();
            (Some(script), None)
        }
        InputScript::P2wpkh => {
            let (sig, pk) = single_sig(psbt, index)?;
            (None, Some(Witness::from_slice(&[sig, pk])))
        }
        InputScript::P2shP2wpkh { redeem } => {
            let (sig, pk) = single_sig(psbt, index)?;
            let script = Builder::new().push_slice(push_bytes(index, redeem.to_bytes())?).into_script();
            (Some(script), Some(Witness::from_slice(&[sig, pk])))
        }
        InputScript::P2tr => {
            let sig = psbt.inputs[index]
                .tap_key_sig
                .ok_or(PsbtError::Incomplete(index))?;
            (None, Some(Witness::from_slice(&[sig.to_vec()])))
        }
        InputScript::P2wshMultisig { witness, required, keys } => {
            let mut items = multisig_items(psbt, index, required, &keys)?;
            items.push(witness.to_bytes());
            (None, Some(Witness::from_slice(&items)))
        }
        InputScript::P2shP2wshMultisig { redeem, witness, required, keys } => {
            let mut items = multisig_items(psbt, index, required, &keys)?;
            items.push(witness.to_bytes());
            let script = Builder::new().push_slice(push_bytes(index, redeem.to_bytes())?).into_script();
            (Some(script), Some(Witness::from_slice(&items)))
        }
        InputScript::P2shMultisig { redeem, required, keys } => {
            let items = multisig_items(psbt, index, required, &keys)?;
            let mut builder = Builder::new().push_int(0);
            for sig in items.into_iter().skip(1) {
                builder = builder.push_slice(push_bytes(index, sig)?);
            }
            let script = builder.push_slice(push_bytes(index, redeem.to_bytes())?).into_script();
            (Some(script), None)
        }
    };
    Ok(parts)
}

/// Turn collected signatures into final scriptSigs and witnesses.
///
/// Every input must be complete; on failure the envelope is left untouched.
pub fn finalize_psbt(psbt: &mut Psbt) -> WalletResult<()> {
    let mut finals = Vec::with_capacity(psbt.inputs.len());
    for index in 0..psbt.inputs.len() {
        if is_finalized(&psbt.inputs[index]) {
            finals.push(None);
            continue;
        }
        if !input_is_complete(psbt, index) {
            return Err(PsbtError::Incomplete(index).into());
        }
        finals.push(Some(final_parts(psbt, index)?));
    }

    for (input, parts) in psbt.inputs.iter_mut().zip(finals) {
        let Some((script_sig, witness)) = parts else {
            continue;
        };
        input.final_script_sig = script_sig;
        input.final_script_witness = witness;

        input.partial_sigs.clear();
        input.sighash_type = None;
        input.redeem_script = None;
        input.witness_script = None;
        input.bip32_derivation.clear();
        input.tap_key_sig = None;
        input.tap_internal_key = None;
    }
    Ok(())
}

/// Network-ready transaction from a fully finalized envelope
pub fn extract_tx(psbt: &Psbt) -> WalletResult<Transaction> {
    let mut tx = psbt.unsigned_tx.clone();
    for (index, (txin, input)) in tx.input.iter_mut().zip(&psbt.inputs).enumerate() {
        if !is_finalized(input) {
            return Err(PsbtError::NotFinalized(index).into());
        }
        txin.script_sig = input.final_script_sig.clone().unwrap_or_default();
        txin.witness = input.final_script_witness.clone().unwrap_or_default();
    }
    Ok(tx)
}
