//! M-of-N redeem scripts and the addresses that commit to them

use bitcoin::blockdata::opcodes::all::OP_CHECKMULTISIG;
use bitcoin::blockdata::script::{Builder, Instruction};
use bitcoin::{Address, Network, PublicKey, Script, ScriptBuf};
use std::str::FromStr;

use crate::error::{WalletError, WalletResult};
use crate::types::AddressType;

/// Most keys bare `OP_CHECKMULTISIG` accepts in standard scripts
pub const MAX_MULTISIG_KEYS: usize = 15;

/// Shortest accepted public key, in hex characters
pub const MIN_PUBKEY_HEX_LEN: usize = 66;

/// Shortest accepted redeem script, in hex characters
pub const MIN_REDEEM_SCRIPT_HEX_LEN: usize = 20;

/// Address plus the script it commits to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigAddress {
    pub address: String,
    /// Multisig script hex (witness script for segwit encodings)
    pub redeem_script: String,
}

/// Check M-of-N bounds
pub fn validate_threshold(required: usize, total: usize) -> WalletResult<()> {
    if required < 1 {
        return Err(WalletError::validation("required signatures must be at least 1"));
    }
    if total < 2 {
        return Err(WalletError::validation(format!(
            "multisig needs at least 2 keys, got {}",
            total
        )));
    }
    if required > total {
        return Err(WalletError::validation(format!(
            "required signatures {} exceed key count {}",
            required, total
        )));
    }
    if total > MAX_MULTISIG_KEYS {
        return Err(WalletError::validation(format!(
            "multisig supports at most {} keys, got {}",
            MAX_MULTISIG_KEYS, total
        )));
    }
    Ok(())
}

/// Decode a full public key given as hex; it must be compressed
pub fn parse_full_pubkey(hex_key: &str) -> WalletResult<PublicKey> {
    if hex_key.len() < MIN_PUBKEY_HEX_LEN {
        return Err(WalletError::validation(format!(
            "public key must be at least {} hex chars, got {}",
            MIN_PUBKEY_HEX_LEN,
            hex_key.len()
        )));
    }
    let key = PublicKey::from_str(hex_key)
        .map_err(|e| WalletError::validation(format!("invalid public key: {}", e)))?;
    if !key.compressed {
        return Err(WalletError::validation("multisig keys must be compressed"));
    }
    Ok(key)
}

/// `OP_m <key_1> .. <key_n> OP_n OP_CHECKMULTISIG`, keys in the given order
pub fn build_multisig_script(required: usize, pubkeys: &[String]) -> WalletResult<ScriptBuf> {
    validate_threshold(required, pubkeys.len())?;

    let mut builder = Builder::new().push_int(required as i64);
    for hex_key in pubkeys {
        builder = builder.push_key(&parse_full_pubkey(hex_key)?);
    }
    let script = builder
        .push_int(pubkeys.len() as i64)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script();

    if hex::encode(script.as_bytes()).len() < MIN_REDEEM_SCRIPT_HEX_LEN {
        return Err(WalletError::internal("redeem script unexpectedly short"));
    }
    Ok(script)
}

/// Address for a multisig script under the configured encoding
///
/// Taproot has no key-path form for `OP_CHECKMULTISIG`, so it shares the
/// native segwit P2WSH encoding.
pub fn multisig_address(
    script: &Script,
    address_type: AddressType,
    network: Network,
) -> WalletResult<MultisigAddress> {
    let address = match address_type {
        AddressType::P2pkh => Address::p2sh(script, network)
            .map_err(|e| WalletError::validation(format!("redeem script too large: {}", e)))?,
        AddressType::P2shSegwit => Address::p2shwsh(script, network),
        AddressType::Bech32 | AddressType::Taproot => Address::p2wsh(script, network),
    };

    Ok(MultisigAddress {
        address: address.to_string(),
        redeem_script: hex::encode(script.as_bytes()),
    })
}

fn small_int(instruction: &Instruction<'_>) -> Option<usize> {
    match instruction {
        Instruction::Op(op) => {
            let code = op.to_u8();
            // OP_1 (0x51) ..= OP_16 (0x60)
            if (0x51..=0x60).contains(&code) {
                Some((code - 0x50) as usize)
            } else {
                None
            }
        }
        Instruction::PushBytes(_) => None,
    }
}

/// Decode a bare multisig script into (required, ordered keys)
pub fn parse_multisig_script(script: &Script) -> Option<(usize, Vec<PublicKey>)> {
    let instructions = script
        .instructions()
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    if instructions.len() < 4 {
        return None;
    }

    let last = instructions.last()?;
    match last {
        Instruction::Op(op) if *op == OP_CHECKMULTISIG => {}
        _ => return None,
    }

    let required = small_int(&instructions[0])?;
    let total = small_int(&instructions[instructions.len() - 2])?;
    let key_slots = &instructions[1..instructions.len() - 2];
    if key_slots.len() != total || required > total {
        return None;
    }

    let mut keys = Vec::with_capacity(total);
    for slot in key_slots {
        match slot {
            Instruction::PushBytes(bytes) => keys.push(PublicKey::from_slice(bytes.as_bytes()).ok()?),
            Instruction::Op(_) => return None,
        }
    }
    Some((required, keys))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};

    pub(crate) fn pubkey_hex(n: u8) -> String {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[n; 32]).unwrap();
        hex::encode(secret.public_key(&secp).serialize())
    }

    #[test]
    fn test_two_of_three_script_layout() {
        let keys = vec![pubkey_hex(1), pubkey_hex(2), pubkey_hex(3)];
        let script = build_multisig_script(2, &keys).unwrap();
        let bytes = script.as_bytes();
        assert_eq!(bytes[0], 0x52); // OP_2
        assert_eq!(bytes[bytes.len() - 2], 0x53); // OP_3
        assert_eq!(bytes[bytes.len() - 1], 0xae); // OP_CHECKMULTISIG
        assert_eq!(bytes.len(), 1 + 3 * 34 + 2);

        let (required, parsed) = parse_multisig_script(&script).unwrap();
        assert_eq!(required, 2);
        let parsed_hex: Vec<String> = parsed.iter().map(|k| k.to_string()).collect();
        assert_eq!(parsed_hex, keys);
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(validate_threshold(0, 2).is_err());
        assert!(validate_threshold(1, 1).is_err());
        assert!(validate_threshold(3, 2).is_err());
        assert!(validate_threshold(2, 16).is_err());
        assert!(validate_threshold(15, 15).is_ok());
    }

    #[test]
    fn test_rejects_short_or_invalid_keys() {
        assert!(parse_full_pubkey("02abcd").is_err());
        let bogus = format!("05{}", "11".repeat(32));
        assert!(parse_full_pubkey(&bogus).is_err());
        let keys = vec![pubkey_hex(1), "02abcd".to_string()];
        assert!(build_multisig_script(1, &keys).is_err());
    }

    #[test]
    fn test_address_encodings() {
        let keys = vec![pubkey_hex(4), pubkey_hex(5)];
        let script = build_multisig_script(2, &keys).unwrap();

        let p2wsh = multisig_address(&script, AddressType::Bech32, Network::Testnet).unwrap();
        assert!(p2wsh.address.starts_with("tb1q"));
        assert_eq!(p2wsh.address.len(), 62);

        let nested = multisig_address(&script, AddressType::P2shSegwit, Network::Bitcoin).unwrap();
        assert!(nested.address.starts_with('3'));

        let legacy = multisig_address(&script, AddressType::P2pkh, Network::Testnet).unwrap();
        assert!(legacy.address.starts_with('2'));

        let taproot = multisig_address(&script, AddressType::Taproot, Network::Testnet).unwrap();
        assert_eq!(taproot.address, p2wsh.address);
        assert_eq!(taproot.redeem_script, hex::encode(script.as_bytes()));
    }

    #[test]
    fn test_parse_rejects_other_scripts() {
        let p2wpkh = ScriptBuf::from_bytes(hex::decode(format!("0014{}", "ab".repeat(20))).unwrap());
        assert!(parse_multisig_script(&p2wpkh).is_none());
    }
}
