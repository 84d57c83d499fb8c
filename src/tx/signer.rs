//! Transaction Signer
//!
//! One signing round of the offline keygen or sign process: read an unsigned
//! handoff file, add every signature the local keys can make and write the
//! next artifact.

use bitcoin::{Address, Network, PrivateKey, ScriptBuf};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::WalletConfig;
use crate::error::WalletResult;
use crate::psbt::{attach_script, decode_psbt, encode_psbt, sign_with_keys, validate_psbt};
use crate::storage::{AccountKeyRecord, KeyStore};
use crate::types::TxType;
use crate::wallet::derivation::parse_wif;
use crate::{log_debug, log_info, log_warn};

use super::handoff::{read_psbt_file, validate_file_path, write_psbt_file, HandoffFile};

/// Result of one signing round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignRound {
    pub tx_id: i64,
    pub file_path: PathBuf,
    pub signatures_added: usize,
    pub signed_count: u32,
    pub is_complete: bool,
}

/// Account keys spending the inputs, then every owned authorization key
fn candidate_keys<S: KeyStore>(store: &S, input_addresses: &[String]) -> WalletResult<Vec<AccountKeyRecord>> {
    let mut seen = BTreeSet::new();
    let mut records = store.keys_by_addresses(input_addresses)?;
    records.extend(store.owned_auth_keys()?);
    records.retain(|r| seen.insert(r.full_pubkey.clone()));
    Ok(records)
}

/// Load WIFs as secrets and decode them for this network.
/// Keys that do not decode (e.g. account-chain hex keys) are skipped.
fn decode_keys(records: &[AccountKeyRecord], network: Network) -> Vec<PrivateKey> {
    let secrets: Vec<SecretString> = records
        .iter()
        .map(|r| SecretString::from(r.private_key.clone()))
        .collect();

    secrets
        .iter()
        .zip(records)
        .filter_map(|(secret, record)| match parse_wif(secret.expose_secret(), network) {
            Ok(key) => Some(key),
            Err(e) => {
                log_warn!("signer", "skipping undecodable key", account = record.account, error = e);
                None
            }
        })
        .collect()
}

/// Sign the unsigned artifact at `path` with the keys in `store`
pub fn sign_file<S: KeyStore>(store: &S, config: &WalletConfig, path: &Path) -> WalletResult<SignRound> {
    let file = validate_file_path(path, TxType::Unsigned)?;
    let mut psbt = decode_psbt(&read_psbt_file(path)?)?;
    validate_psbt(&psbt)?;
    let network = config.bitcoin_network();

    let scripts: Vec<Option<ScriptBuf>> = psbt
        .inputs
        .iter()
        .map(|input| input.witness_utxo.as_ref().map(|u| u.script_pubkey.clone()))
        .collect();
    let input_addresses: Vec<String> = scripts
        .iter()
        .flatten()
        .filter_map(|spk| Address::from_script(spk, network).ok())
        .map(|a| a.to_string())
        .collect();

    let records = candidate_keys(store, &input_addresses)?;
    log_debug!("signer", "candidate keys loaded", tx_id = file.tx_id, keys = records.len());

    // Multisig inputs reported without scripts get them from our records
    for (index, spk) in scripts.iter().enumerate() {
        let Some(spk) = spk else { continue };
        let input = &mut psbt.inputs[index];
        if input.redeem_script.is_some() || input.witness_script.is_some() {
            continue;
        }
        let Some(address) = Address::from_script(spk, network).ok().map(|a| a.to_string()) else {
            continue;
        };
        let script = records
            .iter()
            .filter(|r| r.multisig_address.as_deref() == Some(address.as_str()))
            .find_map(|r| r.multisig_redeem_script.as_deref());
        if let Some(script_hex) = script {
            let script = ScriptBuf::from_bytes(hex::decode(script_hex)?);
            attach_script(input, index, spk, &script)?;
        }
    }

    let keys = decode_keys(&records, network);
    let outcome = sign_with_keys(&mut psbt, &keys)?;

    let next_state = if outcome.is_complete {
        TxType::Signed
    } else {
        TxType::Unsigned
    };
    let signed_count = file.signed_count + 1;
    let next = HandoffFile::new(file.action, file.tx_id, next_state, signed_count);
    let file_path = write_psbt_file(&config.file_path.tx, &next, &encode_psbt(&psbt))?;

    log_info!(
        "signer",
        "signing round complete",
        tx_id = file.tx_id,
        signatures = outcome.signatures_added,
        signed_count = signed_count,
        complete = outcome.is_complete,
    );

    Ok(SignRound {
        tx_id: file.tx_id,
        file_path,
        signatures_added: outcome.signatures_added,
        signed_count,
        is_complete: outcome.is_complete,
    })
}
