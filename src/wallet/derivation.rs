//! HD Key Derivation
//!
//! Derives account keys from a seed along `m/purpose'/coin'/account'/0/index`.
//! The output is a pure function of (seed, purpose, coin, account, index).
//!
//! SECURITY: derived private keys leave this module only as WIF strings.

use bitcoin::bip32::Xpriv;
use bitcoin::key::CompressedPublicKey;
use bitcoin::secp256k1::{All, Keypair, Secp256k1, SecretKey};
use bitcoin::{Address, Network, NetworkKind, PrivateKey, ScriptBuf};
use serde::{Deserialize, Serialize};
use tiny_keccak::{Hasher, Keccak};

use crate::config::WalletConfig;
use crate::error::{WalletError, WalletResult};
use crate::types::{AccountType, AddressType};

use super::derivation_path::{bip_purposes, validate_index_range, validate_seed_len, KeyPath};
use super::seed::Seed;

/// Every address encoding of one secp256k1 key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEncodings {
    pub p2pkh: String,
    pub p2sh_segwit: String,
    pub bech32: String,
    pub taproot: String,
}

impl AddressEncodings {
    pub fn get(&self, address_type: AddressType) -> &str {
        match address_type {
            AddressType::P2pkh => &self.p2pkh,
            AddressType::P2shSegwit => &self.p2sh_segwit,
            AddressType::Bech32 => &self.bech32,
            AddressType::Taproot => &self.taproot,
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        [&self.p2pkh, &self.p2sh_segwit, &self.bech32, &self.taproot]
            .iter()
            .any(|a| a.as_str() == address)
    }
}

/// One derived key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletKey {
    pub path: String,
    pub index: u32,
    /// WIF for UTXO chains, raw hex for account-based chains
    pub private_key: String,
    /// Compressed public key hex
    pub full_pubkey: String,
    /// Address for the configured purpose
    pub address: String,
    /// All encodings; absent for account-based chains
    pub encodings: Option<AddressEncodings>,
    /// P2WPKH script wrapped by the P2SH-segwit address
    pub redeem_script: Option<String>,
}

/// Capability to derive a batch of account keys
pub trait KeyDeriver {
    fn derive_keys(
        &self,
        seed: &Seed,
        account: AccountType,
        idx_from: u32,
        count: u32,
    ) -> WalletResult<Vec<WalletKey>>;
}

// =============================================================================
// UTXO chains
// =============================================================================

/// BIP44/49/84/86 deriver for Bitcoin-family chains
pub struct HdKeyDeriver {
    secp: Secp256k1<All>,
    address_type: AddressType,
    coin_index: u32,
    network: Network,
}

impl HdKeyDeriver {
    pub fn new(address_type: AddressType, coin_index: u32, network: Network) -> Self {
        Self {
            secp: Secp256k1::new(),
            address_type,
            coin_index,
            network,
        }
    }

    pub fn from_config(config: &WalletConfig) -> Self {
        Self::new(config.address_type, config.coin_index(), config.bitcoin_network())
    }

    fn derive_one(&self, master: &Xpriv, account: AccountType, index: u32) -> WalletResult<WalletKey> {
        let path = KeyPath::new(self.address_type.purpose(), self.coin_index, account.index(), index);
        let child = master.derive_priv(&self.secp, &path.to_bip32()?)?;
        let secret_key = child.private_key;

        let compressed = CompressedPublicKey(secret_key.public_key(&self.secp));
        let wrapped = ScriptBuf::new_p2wpkh(&compressed.wpubkey_hash());
        let encodings = self.encode_all(&secret_key, &compressed);
        let address = encodings.get(self.address_type).to_string();

        let redeem_script = match path.purpose {
            bip_purposes::BIP49 => Some(hex::encode(wrapped.as_bytes())),
            _ => None,
        };

        Ok(WalletKey {
            path: path.to_string(),
            index,
            private_key: PrivateKey::new(secret_key, self.network).to_wif(),
            full_pubkey: hex::encode(compressed.to_bytes()),
            address,
            encodings: Some(encodings),
            redeem_script,
        })
    }

    fn encode_all(&self, secret_key: &SecretKey, compressed: &CompressedPublicKey) -> AddressEncodings {
        let keypair = Keypair::from_secret_key(&self.secp, secret_key);
        let (x_only, _parity) = keypair.x_only_public_key();

        AddressEncodings {
            p2pkh: Address::p2pkh(compressed.pubkey_hash(), self.network).to_string(),
            p2sh_segwit: Address::p2shwpkh(compressed, self.network).to_string(),
            bech32: Address::p2wpkh(compressed, self.network).to_string(),
            taproot: Address::p2tr(&self.secp, x_only, None, self.network).to_string(),
        }
    }
}

impl KeyDeriver for HdKeyDeriver {
    fn derive_keys(
        &self,
        seed: &Seed,
        account: AccountType,
        idx_from: u32,
        count: u32,
    ) -> WalletResult<Vec<WalletKey>> {
        validate_seed_len(seed.len())?;
        validate_index_range(idx_from, count)?;

        let master = Xpriv::new_master(self.network, seed.as_bytes())?;
        (idx_from..idx_from + count)
            .map(|index| self.derive_one(&master, account, index))
            .collect()
    }
}

// =============================================================================
// Account-based chains
// =============================================================================

/// BIP44 deriver producing one keccak address and a raw key per index
pub struct AccountChainDeriver {
    secp: Secp256k1<All>,
    coin_index: u32,
}

impl AccountChainDeriver {
    pub fn new(coin_index: u32) -> Self {
        Self {
            secp: Secp256k1::new(),
            coin_index,
        }
    }
}

impl KeyDeriver for AccountChainDeriver {
    fn derive_keys(
        &self,
        seed: &Seed,
        account: AccountType,
        idx_from: u32,
        count: u32,
    ) -> WalletResult<Vec<WalletKey>> {
        validate_seed_len(seed.len())?;
        validate_index_range(idx_from, count)?;

        // Network only affects xpriv serialization, never the derived key
        let master = Xpriv::new_master(Network::Bitcoin, seed.as_bytes())?;
        let mut keys = Vec::with_capacity(count as usize);
        for index in idx_from..idx_from + count {
            let path = KeyPath::new(bip_purposes::BIP44, self.coin_index, account.index(), index);
            let secret_key = master.derive_priv(&self.secp, &path.to_bip32()?)?.private_key;
            let public_key = secret_key.public_key(&self.secp);

            let digest = keccak256(&public_key.serialize_uncompressed()[1..]);
            keys.push(WalletKey {
                path: path.to_string(),
                index,
                private_key: hex::encode(secret_key.secret_bytes()),
                full_pubkey: hex::encode(public_key.serialize()),
                address: checksum_address(&digest[12..]),
                encodings: None,
                redeem_script: None,
            });
        }
        Ok(keys)
    }
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// EIP-55 mixed-case hex address
fn checksum_address(address: &[u8]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let body: String = lower
        .chars()
        .enumerate()
        .map(|(i, ch)| {
            let nibble = if i % 2 == 0 { hash[i / 2] >> 4 } else { hash[i / 2] & 0x0f };
            if ch.is_ascii_alphabetic() && nibble >= 8 {
                ch.to_ascii_uppercase()
            } else {
                ch
            }
        })
        .collect();
    format!("0x{}", body)
}

/// Pick the deriver for the configured coin family
pub fn deriver_for(config: &WalletConfig) -> Box<dyn KeyDeriver> {
    if config.coin_type.is_utxo() {
        Box::new(HdKeyDeriver::from_config(config))
    } else {
        Box::new(AccountChainDeriver::new(config.coin_index()))
    }
}

/// Decode a WIF and confirm it belongs to the configured network kind
pub fn parse_wif(wif: &str, network: Network) -> WalletResult<PrivateKey> {
    let key = PrivateKey::from_wif(wif)
        .map_err(|e| WalletError::validation(format!("invalid WIF: {}", e)))?;
    if key.network != NetworkKind::from(network) {
        return Err(WalletError::validation("WIF network does not match configuration"));
    }
    if !key.compressed {
        return Err(WalletError::validation("uncompressed WIF keys are not supported"));
    }
    Ok(key)
}
