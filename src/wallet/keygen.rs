//! Key Generation
//!
//! Seed creation, HD key batches and key imports for the offline keygen and
//! sign processes.
//!
//! SECURITY: seeds are only ever held in `Zeroizing` buffers.

use bip39::Mnemonic;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use crate::config::WalletConfig;
use crate::error::{WalletError, WalletResult};
use crate::multisig::parse_full_pubkey;
use crate::multisig::script::MIN_PUBKEY_HEX_LEN;
use crate::storage::{AuthPubkeyRecord, KeyStore};
use crate::types::{AccountType, AddressStatus, CoinTypeCode};
use crate::utils::json::write_private_file;
use crate::utils::unix_nanos;
use crate::{log_info, log_warn};

use super::derivation::{deriver_for, parse_wif};
use super::derivation_path::validate_index_range;
use super::seed::Seed;

// =============================================================================
// Roles
// =============================================================================

/// Process role; decides which accounts a process may hold keys for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Keygen,
    Sign,
}

impl Role {
    pub fn allows(&self, account: AccountType) -> bool {
        match self {
            Role::Keygen => !account.is_authorization(),
            Role::Sign => account.is_authorization(),
        }
    }

    fn check(&self, account: AccountType) -> WalletResult<()> {
        if self.allows(account) {
            Ok(())
        } else {
            Err(WalletError::validation(format!(
                "{} keys are not held by the {:?} process",
                account, self
            )))
        }
    }
}

// =============================================================================
// Seed
// =============================================================================

/// Where a new seed comes from
pub enum SeedSource {
    /// 32 bytes from the OS RNG
    Random,
    Hex(Zeroizing<String>),
    Mnemonic {
        phrase: Zeroizing<String>,
        passphrase: Zeroizing<String>,
    },
}

/// Fresh 24-word phrase for operators who want a paper backup
pub fn generate_mnemonic() -> WalletResult<Zeroizing<String>> {
    let mut entropy = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(entropy.as_mut());
    let mnemonic = Mnemonic::from_entropy(entropy.as_ref())?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// Create and store the process seed; a second seed is rejected
pub fn create_seed<S: KeyStore>(store: &mut S, source: SeedSource) -> WalletResult<()> {
    if store.seed()?.is_some() {
        return Err(WalletError::validation("seed already exists"));
    }
    let seed = match source {
        SeedSource::Random => Seed::generate(),
        SeedSource::Hex(hex_seed) => Seed::from_hex(&hex_seed)?,
        SeedSource::Mnemonic { phrase, passphrase } => Seed::from_mnemonic(&phrase, &passphrase)?,
    };
    store.insert_seed(&seed.to_hex())?;
    log_info!("keygen", "seed stored", seed_len = seed.len());
    Ok(())
}

fn load_seed<S: KeyStore>(store: &S) -> WalletResult<Seed> {
    let hex_seed = store
        .seed()?
        .map(Zeroizing::new)
        .ok_or_else(|| WalletError::not_found("no seed stored; run create-seed first"))?;
    Seed::from_hex(&hex_seed)
}

// =============================================================================
// HD keys
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyBatch {
    pub account: AccountType,
    pub idx_from: u32,
    pub count: u32,
    pub addresses: Vec<String>,
}

/// Derive `count` keys after the highest stored index and persist them
pub fn create_hd_keys<S: KeyStore>(
    store: &mut S,
    config: &WalletConfig,
    role: Role,
    account: AccountType,
    count: u32,
) -> WalletResult<KeyBatch> {
    role.check(account)?;
    let seed = load_seed(store)?;
    let idx_from = store.next_index(account)?;
    validate_index_range(idx_from, count)?;

    let keys = deriver_for(config).derive_keys(&seed, account, idx_from, count)?;
    store.insert_keys(config.coin_type, account, &keys)?;
    log_info!("keygen", "keys generated", account = account, idx_from = idx_from, count = count);

    Ok(KeyBatch {
        account,
        idx_from,
        count,
        addresses: keys.into_iter().map(|k| k.address).collect(),
    })
}

/// Check every freshly generated key decodes for this network and mark it
/// imported. Returns the number of keys advanced.
pub fn import_private_keys<S: KeyStore>(
    store: &mut S,
    config: &WalletConfig,
    role: Role,
    account: AccountType,
) -> WalletResult<usize> {
    role.check(account)?;
    let records = store.keys_by_status(account, AddressStatus::HdKeyGenerated)?;
    let mut imported = Vec::with_capacity(records.len());

    for record in records {
        let valid = if config.coin_type.is_utxo() {
            parse_wif(&record.private_key, config.bitcoin_network()).map(|_| ())
        } else {
            hex::decode(&record.private_key).map(|_| ()).map_err(WalletError::from)
        };
        match valid {
            Ok(()) => imported.push(record.full_pubkey),
            Err(e) => log_warn!("keygen", "key not imported", account = account, index = record.index, error = e),
        }
    }

    let count = store.update_status(account, &imported, AddressStatus::PrivKeyImported)?;
    log_info!("keygen", "private keys imported", account = account, count = count);
    Ok(count)
}

// =============================================================================
// Authorization full pubkeys
// =============================================================================

/// Write `{dir}fullpubkey_{account}_{nanos}.csv` with `coin,account,full_pubkey`
pub fn export_full_pubkey<S: KeyStore>(
    store: &S,
    config: &WalletConfig,
    account: AccountType,
) -> WalletResult<PathBuf> {
    Role::Sign.check(account)?;
    let record = [AddressStatus::PrivKeyImported, AddressStatus::HdKeyGenerated]
        .into_iter()
        .map(|status| store.keys_by_status(account, status))
        .collect::<WalletResult<Vec<_>>>()?
        .into_iter()
        .flatten()
        .min_by_key(|r| (r.status != AddressStatus::PrivKeyImported, r.index))
        .ok_or_else(|| WalletError::not_found(format!("no {} key to export", account)))?;

    let path = config
        .file_path
        .full_pubkey
        .join(format!("fullpubkey_{}_{}.csv", account, unix_nanos()));
    let line = format!("{},{},{}\n", record.coin, account, record.full_pubkey);
    write_private_file(&path, line.as_bytes())?;
    log_info!("keygen", "full pubkey exported", account = account, file = path.display());
    Ok(path)
}

/// Read a full pubkey export and store each authorization key
pub fn import_full_pubkey<S: KeyStore>(store: &mut S, path: &Path) -> WalletResult<usize> {
    let text = fs::read_to_string(path)?;
    let mut count = 0;
    for (line_no, line) in text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.trim().split(',').collect();
        let bad = |msg: String| WalletError::validation(format!("line {}: {}", line_no + 1, msg));
        if fields.len() != 3 {
            return Err(bad(format!("expected 3 fields, found {}", fields.len())));
        }
        let coin: CoinTypeCode = fields[0].parse().map_err(bad)?;
        let account: AccountType = fields[1].parse().map_err(bad)?;
        let full_pubkey = fields[2].to_string();
        if full_pubkey.len() < MIN_PUBKEY_HEX_LEN {
            return Err(bad(format!("full pubkey shorter than {} hex chars", MIN_PUBKEY_HEX_LEN)));
        }
        parse_full_pubkey(&full_pubkey)?;

        store.insert_auth_pubkey(AuthPubkeyRecord {
            coin,
            account,
            full_pubkey,
        })?;
        count += 1;
        log_info!("keygen", "full pubkey imported", account = account);
    }
    Ok(count)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::storage::JsonStore;

    pub(crate) fn seeded_store() -> JsonStore {
        let mut store = JsonStore::in_memory();
        create_seed(&mut store, SeedSource::Hex(Zeroizing::new("00".repeat(32)))).unwrap();
        store
    }

    fn config_in(dir: &Path) -> WalletConfig {
        let mut config = WalletConfig::default();
        config.file_path.full_pubkey = dir.join("pubkey");
        config
    }

    #[test]
    fn test_seed_created_once() {
        let mut store = seeded_store();
        let err = create_seed(&mut store, SeedSource::Random).unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[test]
    fn test_seed_sources() {
        let mut random = JsonStore::in_memory();
        create_seed(&mut random, SeedSource::Random).unwrap();
        assert_eq!(random.seed().unwrap().unwrap().len(), 64);

        let phrase = generate_mnemonic().unwrap();
        assert_eq!(phrase.split_whitespace().count(), 24);
        let mut from_phrase = JsonStore::in_memory();
        create_seed(
            &mut from_phrase,
            SeedSource::Mnemonic {
                phrase,
                passphrase: Zeroizing::new(String::new()),
            },
        )
        .unwrap();
        assert_eq!(from_phrase.seed().unwrap().unwrap().len(), 128);

        let mut short = JsonStore::in_memory();
        assert!(create_seed(&mut short, SeedSource::Hex(Zeroizing::new("00".repeat(8)))).is_err());
    }

    #[test]
    fn test_hd_keys_continue_from_next_index() {
        let mut store = seeded_store();
        let config = WalletConfig::default();
        let first = create_hd_keys(&mut store, &config, Role::Keygen, AccountType::Client, 3).unwrap();
        let second = create_hd_keys(&mut store, &config, Role::Keygen, AccountType::Client, 2).unwrap();
        assert_eq!(first.idx_from, 0);
        assert_eq!(second.idx_from, 3);
        assert!(first.addresses[0].starts_with("tb1q"));
        assert_eq!(store.keys_by_status(AccountType::Client, AddressStatus::HdKeyGenerated).unwrap().len(), 5);
    }

    #[test]
    fn test_roles_guard_accounts() {
        let mut store = seeded_store();
        let config = WalletConfig::default();
        assert!(create_hd_keys(&mut store, &config, Role::Keygen, AccountType::Auth1, 1).is_err());
        assert!(create_hd_keys(&mut store, &config, Role::Sign, AccountType::Deposit, 1).is_err());
        assert!(create_hd_keys(&mut store, &config, Role::Sign, AccountType::Auth1, 1).is_ok());
    }

    #[test]
    fn test_hd_keys_need_seed() {
        let mut store = JsonStore::in_memory();
        let err = create_hd_keys(&mut store, &WalletConfig::default(), Role::Keygen, AccountType::Client, 1)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn test_import_private_keys_advances_status() {
        let mut store = seeded_store();
        let config = WalletConfig::default();
        create_hd_keys(&mut store, &config, Role::Keygen, AccountType::Deposit, 2).unwrap();
        assert_eq!(import_private_keys(&mut store, &config, Role::Keygen, AccountType::Deposit).unwrap(), 2);
        assert_eq!(import_private_keys(&mut store, &config, Role::Keygen, AccountType::Deposit).unwrap(), 0);
        assert_eq!(
            store.keys_by_status(AccountType::Deposit, AddressStatus::PrivKeyImported).unwrap().len(),
            2
        );
    }

    #[test]
    fn test_full_pubkey_export_import() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let mut signer = seeded_store();
        create_hd_keys(&mut signer, &config, Role::Sign, AccountType::Auth2, 1).unwrap();
        let path = export_full_pubkey(&signer, &config, AccountType::Auth2).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("fullpubkey_auth2_"));

        let mut keygen = JsonStore::in_memory();
        assert_eq!(import_full_pubkey(&mut keygen, &path).unwrap(), 1);
        let stored = keygen.auth_pubkey(AccountType::Auth2).unwrap().unwrap();
        assert_eq!(stored.full_pubkey.len(), 66);

        // Same account twice
        let err = import_full_pubkey(&mut keygen, &path).unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[test]
    fn test_import_rejects_short_pubkey() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fullpubkey_auth1_1.csv");
        fs::write(&path, "btc,auth1,02abcd\n").unwrap();
        let mut store = JsonStore::in_memory();
        assert_eq!(import_full_pubkey(&mut store, &path).unwrap_err().code, ErrorCode::Validation);
        assert!(store.auth_pubkey(AccountType::Auth1).unwrap().is_none());
    }
}
