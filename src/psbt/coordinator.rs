//! PSBT creation, inspection and signing

use bitcoin::hashes::Hash;
use bitcoin::key::{CompressedPublicKey, TapTweak};
use bitcoin::psbt::{Input, Psbt, PsbtSighashType};
use bitcoin::secp256k1::{Keypair, Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType};
use bitcoin::{ecdsa, taproot, Amount, PrivateKey, PublicKey, Script, ScriptBuf, Transaction, TxOut};
use serde::Serialize;

use crate::error::{WalletError, WalletResult};
use crate::multisig::parse_multisig_script;
use crate::wallet::utxo::UnspentOutput;

use super::{decode_psbt, PsbtError};

/// Spending shape of one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputScript {
    P2pkh,
    P2wpkh,
    P2shP2wpkh { redeem: ScriptBuf },
    P2tr,
    P2shMultisig { redeem: ScriptBuf, required: usize, keys: Vec<PublicKey> },
    P2shP2wshMultisig { redeem: ScriptBuf, witness: ScriptBuf, required: usize, keys: Vec<PublicKey> },
    P2wshMultisig { witness: ScriptBuf, required: usize, keys: Vec<PublicKey> },
}

impl InputScript {
    fn multisig(&self) -> Option<(usize, &[PublicKey])> {
        match self {
            InputScript::P2shMultisig { required, keys, .. }
            | InputScript::P2shP2wshMultisig { required, keys, .. }
            | InputScript::P2wshMultisig { required, keys, .. } => Some((*required, keys)),
            _ => None,
        }
    }
}

/// Counts and signing state of an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PsbtSummary {
    pub input_count: usize,
    pub output_count: usize,
    pub is_complete: bool,
    pub has_signature: bool,
    /// Satoshis, when every prevout is known
    pub fee: Option<u64>,
}

/// Result of one signing pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignOutcome {
    pub signatures_added: usize,
    pub is_complete: bool,
}

// =============================================================================
// Create
// =============================================================================

fn decode_script(hex_script: &str) -> WalletResult<ScriptBuf> {
    Ok(ScriptBuf::from_bytes(hex::decode(hex_script.trim())?))
}

/// Attach the script committed to by `spk` to an input.
///
/// `script` is either a P2SH redeem script or a witness script; which one is
/// worked out from the scriptPubKey.
pub fn attach_script(input: &mut Input, index: usize, spk: &Script, script: &Script) -> WalletResult<()> {
    if spk.is_p2wsh() {
        if ScriptBuf::new_p2wsh(&script.wscript_hash()) != *spk {
            return Err(PsbtError::ScriptMismatch { index }.into());
        }
        input.witness_script = Some(script.to_owned());
        return Ok(());
    }
    if spk.is_p2sh() {
        if ScriptBuf::new_p2sh(&script.script_hash()) == *spk {
            input.redeem_script = Some(script.to_owned());
            return Ok(());
        }
        let program = ScriptBuf::new_p2wsh(&script.wscript_hash());
        if ScriptBuf::new_p2sh(&program.script_hash()) == *spk {
            input.redeem_script = Some(program);
            input.witness_script = Some(script.to_owned());
            return Ok(());
        }
        return Err(PsbtError::ScriptMismatch { index }.into());
    }
    Err(PsbtError::UnsupportedScript {
        index,
        reason: "scripts only apply to script-hash outputs".to_string(),
    }
    .into())
}

/// Wrap an unsigned transaction, attaching prevouts and scripts
pub fn create_psbt(tx: Transaction, prevouts: &[UnspentOutput]) -> WalletResult<Psbt> {
    if prevouts.len() > tx.input.len() {
        return Err(WalletError::validation(format!(
            "{} prevouts for {} inputs",
            prevouts.len(),
            tx.input.len()
        )));
    }
    let mut psbt = Psbt::from_unsigned_tx(tx)?;

    for (index, prev) in prevouts.iter().enumerate() {
        let spk = decode_script(&prev.script_pubkey)?;
        let input = &mut psbt.inputs[index];

        if let Some(witness) = prev.witness_script.as_deref() {
            attach_script(input, index, &spk, &decode_script(witness)?)?;
        } else if let Some(redeem) = prev.redeem_script.as_deref() {
            attach_script(input, index, &spk, &decode_script(redeem)?)?;
        }

        if !spk.is_p2tr() {
            input.sighash_type = Some(PsbtSighashType::from(EcdsaSighashType::All));
        }
        input.witness_utxo = Some(TxOut {
            value: Amount::from_sat(prev.amount),
            script_pubkey: spk,
        });
    }
    Ok(psbt)
}

// =============================================================================
// Inspect
// =============================================================================

/// Previous output spent by input `index`
pub(crate) fn prevout(psbt: &Psbt, index: usize) -> Result<TxOut, PsbtError> {
    let input = psbt.inputs.get(index).ok_or(PsbtError::MissingPrevout(index))?;
    if let Some(utxo) = &input.witness_utxo {
        return Ok(utxo.clone());
    }
    let vout = psbt
        .unsigned_tx
        .input
        .get(index)
        .map(|txin| txin.previous_output.vout as usize)
        .ok_or(PsbtError::MissingPrevout(index))?;
    input
        .non_witness_utxo
        .as_ref()
        .and_then(|prev_tx| prev_tx.output.get(vout).cloned())
        .ok_or(PsbtError::MissingPrevout(index))
}

fn multisig_parts(index: usize, script: &Script) -> Result<(usize, Vec<PublicKey>), PsbtError> {
    parse_multisig_script(script).ok_or_else(|| PsbtError::UnsupportedScript {
        index,
        reason: "script is not a bare multisig".to_string(),
    })
}

/// Work out how input `index` is spent
pub fn classify_input(psbt: &Psbt, index: usize) -> Result<InputScript, PsbtError> {
    let spk = prevout(psbt, index)?.script_pubkey;
    let input = &psbt.inputs[index];
    let unsupported = |reason: &str| PsbtError::UnsupportedScript {
        index,
        reason: reason.to_string(),
    };

    if spk.is_p2pkh() {
        Ok(InputScript::P2pkh)
    } else if spk.is_p2wpkh() {
        Ok(InputScript::P2wpkh)
    } else if spk.is_p2tr() {
        Ok(InputScript::P2tr)
    } else if spk.is_p2wsh() {
        let witness = input
            .witness_script
            .clone()
            .ok_or_else(|| unsupported("P2WSH input without witness script"))?;
        let (required, keys) = multisig_parts(index, &witness)?;
        Ok(InputScript::P2wshMultisig { witness, required, keys })
    } else if spk.is_p2sh() {
        let redeem = input
            .redeem_script
            .clone()
            .ok_or_else(|| unsupported("P2SH input without redeem script"))?;
        if ScriptBuf::new_p2sh(&redeem.script_hash()) != spk {
            return Err(PsbtError::ScriptMismatch { index });
        }
        if redeem.is_p2wpkh() {
            Ok(InputScript::P2shP2wpkh { redeem })
        } else if redeem.is_p2wsh() {
            let witness = input
                .witness_script
                .clone()
                .ok_or_else(|| unsupported("P2SH-P2WSH input without witness script"))?;
            if ScriptBuf::new_p2wsh(&witness.wscript_hash()) != redeem {
                return Err(PsbtError::ScriptMismatch { index });
            }
            let (required, keys) = multisig_parts(index, &witness)?;
            Ok(InputScript::P2shP2wshMultisig { redeem, witness, required, keys })
        } else {
            let (required, keys) = multisig_parts(index, &redeem)?;
            Ok(InputScript::P2shMultisig { redeem, required, keys })
        }
    } else {
        Err(unsupported("unknown scriptPubKey"))
    }
}

pub(crate) fn is_finalized(input: &Input) -> bool {
    input.final_script_sig.is_some() || input.final_script_witness.is_some()
}

/// Valid signatures from the script's keys, in script order
pub(crate) fn ordered_multisig_sigs(input: &Input, keys: &[PublicKey]) -> Vec<ecdsa::Signature> {
    keys.iter()
        .filter_map(|key| input.partial_sigs.get(key).copied())
        .collect()
}

/// True when input `index` carries enough signatures to finalize
pub fn input_is_complete(psbt: &Psbt, index: usize) -> bool {
    let Some(input) = psbt.inputs.get(index) else {
        return false;
    };
    if is_finalized(input) {
        return true;
    }
    match classify_input(psbt, index) {
        Ok(InputScript::P2tr) => input.tap_key_sig.is_some(),
        Ok(kind) => match kind.multisig() {
            Some((required, keys)) => ordered_multisig_sigs(input, keys).len() >= required,
            None => !input.partial_sigs.is_empty(),
        },
        Err(_) => false,
    }
}

/// `Σ prevout values − Σ outputs`
pub fn psbt_fee(psbt: &Psbt) -> WalletResult<Amount> {
    let mut input_total = Amount::ZERO;
    for index in 0..psbt.inputs.len() {
        input_total += prevout(psbt, index)?.value;
    }
    let output_total: Amount = psbt.unsigned_tx.output.iter().map(|o| o.value).sum();
    input_total.checked_sub(output_total).ok_or_else(|| {
        WalletError::validation(format!(
            "outputs ({}) exceed inputs ({})",
            output_total.to_sat(),
            input_total.to_sat()
        ))
    })
}

pub fn summarize(psbt: &Psbt) -> PsbtSummary {
    let has_signature = psbt
        .inputs
        .iter()
        .any(|i| !i.partial_sigs.is_empty() || i.tap_key_sig.is_some() || is_finalized(i));
    let is_complete =
        !psbt.inputs.is_empty() && (0..psbt.inputs.len()).all(|i| input_is_complete(psbt, i));

    PsbtSummary {
        input_count: psbt.inputs.len(),
        output_count: psbt.outputs.len(),
        is_complete,
        has_signature,
        fee: psbt_fee(psbt).ok().map(|a| a.to_sat()),
    }
}

/// Decode a base64 envelope and report its state
pub fn parse_psbt(encoded: &str) -> WalletResult<PsbtSummary> {
    let psbt = decode_psbt(encoded)?;
    validate_psbt(&psbt)?;
    Ok(summarize(&psbt))
}

/// Structural checks against the embedded unsigned transaction
pub fn validate_psbt(psbt: &Psbt) -> WalletResult<()> {
    if psbt.inputs.len() != psbt.unsigned_tx.input.len() {
        return Err(WalletError::validation(format!(
            "envelope has {} inputs, transaction has {}",
            psbt.inputs.len(),
            psbt.unsigned_tx.input.len()
        )));
    }
    if psbt.outputs.len() != psbt.unsigned_tx.output.len() {
        return Err(WalletError::validation(format!(
            "envelope has {} outputs, transaction has {}",
            psbt.outputs.len(),
            psbt.unsigned_tx.output.len()
        )));
    }
    for index in 0..psbt.inputs.len() {
        prevout(psbt, index)?;
    }
    Ok(())
}

// =============================================================================
// Sign
// =============================================================================

fn ecdsa_sig(
    secp: &Secp256k1<bitcoin::secp256k1::All>,
    digest: [u8; 32],
    key: &PrivateKey,
) -> ecdsa::Signature {
    let msg = Message::from_digest(digest);
    ecdsa::Signature {
        signature: secp.sign_ecdsa(&msg, &key.inner),
        sighash_type: EcdsaSighashType::All,
    }
}

/// Sign every input each key can sign.
///
/// Keys that do not belong to an input are skipped. Only a pass that adds
/// no signature at all is an error.
pub fn sign_with_keys(psbt: &mut Psbt, keys: &[PrivateKey]) -> WalletResult<SignOutcome> {
    validate_psbt(psbt)?;
    let secp = Secp256k1::new();
    let tx = psbt.unsigned_tx.clone();
    let prevouts = (0..psbt.inputs.len())
        .map(|i| prevout(psbt, i))
        .collect::<Result<Vec<TxOut>, PsbtError>>()?;
    let mut cache = SighashCache::new(&tx);
    let sighash_err = |e: &dyn std::fmt::Display| PsbtError::Sighash(e.to_string());

    let mut added = 0;
    for index in 0..psbt.inputs.len() {
        if input_is_complete(psbt, index) {
            continue;
        }
        let kind = classify_input(psbt, index)?;
        let spk = &prevouts[index].script_pubkey;
        let value = prevouts[index].value;

        for key in keys {
            if input_is_complete(psbt, index) {
                break;
            }
            let pubkey = key.public_key(&secp);
            let compressed = CompressedPublicKey(key.inner.public_key(&secp));
            let input = &mut psbt.inputs[index];

            match &kind {
                InputScript::P2tr => {
                    let keypair = Keypair::from_secret_key(&secp, &key.inner);
                    let (internal, _) = keypair.x_only_public_key();
                    if ScriptBuf::new_p2tr(&secp, internal, None) != *spk {
                        continue;
                    }
                    let sighash = cache
                        .taproot_key_spend_signature_hash(index, &Prevouts::All(&prevouts), TapSighashType::Default)
                        .map_err(|e| sighash_err(&e))?;
                    let tweaked = keypair.tap_tweak(&secp, None).to_keypair();
                    let msg = Message::from_digest(sighash.to_byte_array());
                    input.tap_key_sig = Some(taproot::Signature {
                        signature: secp.sign_schnorr_no_aux_rand(&msg, &tweaked),
                        sighash_type: TapSighashType::Default,
                    });
                    input.tap_internal_key = Some(internal);
                }
                InputScript::P2pkh => {
                    if ScriptBuf::new_p2pkh(&pubkey.pubkey_hash()) != *spk
                        || input.partial_sigs.contains_key(&pubkey)
                    {
                        continue;
                    }
                    let sighash = cache
                        .legacy_signature_hash(index, spk, EcdsaSighashType::All.to_u32())
                        .map_err(|e| sighash_err(&e))?;
                    input
                        .partial_sigs
                        .insert(pubkey, ecdsa_sig(&secp, sighash.to_byte_array(), key));
                }
                InputScript::P2wpkh | InputScript::P2shP2wpkh { .. } => {
                    let program = ScriptBuf::new_p2wpkh(&compressed.wpubkey_hash());
                    let expected = match &kind {
                        InputScript::P2shP2wpkh { redeem } => redeem,
                        _ => spk,
                    };
                    if program != *expected || input.partial_sigs.contains_key(&pubkey) {
                        continue;
                    }
                    let sighash = cache
                        .p2wpkh_signature_hash(index, &program, value, EcdsaSighashType::All)
                        .map_err(|e| sighash_err(&e))?;
                    input
                        .partial_sigs
                        .insert(pubkey, ecdsa_sig(&secp, sighash.to_byte_array(), key));
                }
                InputScript::P2shMultisig { redeem, keys: script_keys, .. } => {
                    if !script_keys.contains(&pubkey) || input.partial_sigs.contains_key(&pubkey) {
                        continue;
                    }
                    let sighash = cache
                        .legacy_signature_hash(index, redeem, EcdsaSighashType::All.to_u32())
                        .map_err(|e| sighash_err(&e))?;
                    input
                        .partial_sigs
                        .insert(pubkey, ecdsa_sig(&secp, sighash.to_byte_array(), key));
                }
                InputScript::P2shP2wshMultisig { witness, keys: script_keys, .. }
                | InputScript::P2wshMultisig { witness, keys: script_keys, .. } => {
                    if !script_keys.contains(&pubkey) || input.partial_sigs.contains_key(&pubkey) {
                        continue;
                    }
                    let sighash = cache
                        .p2wsh_signature_hash(index, witness, value, EcdsaSighashType::All)
                        .map_err(|e| sighash_err(&e))?;
                    input
                        .partial_sigs
                        .insert(pubkey, ecdsa_sig(&secp, sighash.to_byte_array(), key));
                }
            }
            added += 1;
        }
    }

    if added == 0 {
        return Err(PsbtError::NoMatchingKey.into());
    }
    Ok(SignOutcome {
        signatures_added: added,
        is_complete: summarize(psbt).is_complete,
    })
}
