//! Address exchange between keygen and watch
//!
//! CSV columns:
//! `coin,account,p2pkh,p2sh_segwit,bech32,taproot,full_pubkey,multisig_address,idx`

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::WalletConfig;
use crate::error::{WalletError, WalletResult};
use crate::storage::{AccountKeyRecord, KeyStore, WatchAddress, WatchStore};
use crate::types::{AccountType, AddressStatus, AddressType, CoinTypeCode};
use crate::utils::json::write_private_file;
use crate::utils::unix_nanos;
use crate::log_info;

const COLUMNS: usize = 9;

fn csv_line(record: &AccountKeyRecord) -> String {
    let encodings = match &record.encodings {
        Some(e) => [e.p2pkh.as_str(), e.p2sh_segwit.as_str(), e.bech32.as_str(), e.taproot.as_str()],
        None => [record.address.as_str(); 4],
    };
    format!(
        "{},{},{},{},{},{},{},{},{}",
        record.coin,
        record.account,
        encodings[0],
        encodings[1],
        encodings[2],
        encodings[3],
        record.full_pubkey,
        record.multisig_address.as_deref().unwrap_or(""),
        record.index
    )
}

/// Export every exportable key of `account`, then mark them exported.
/// File: `{dir}address_{account}_{nanos}.csv`.
pub fn export_addresses<S: KeyStore>(
    store: &mut S,
    config: &WalletConfig,
    account: AccountType,
) -> WalletResult<PathBuf> {
    let status = AddressStatus::exportable_for(account);
    let records = store.keys_by_status(account, status)?;
    if records.is_empty() {
        return Err(WalletError::not_found(format!(
            "no {} keys in status {:?} to export",
            account, status
        )));
    }

    let mut body = String::new();
    for record in &records {
        body.push_str(&csv_line(record));
        body.push('\n');
    }
    let path = config
        .file_path
        .address
        .join(format!("address_{}_{}.csv", account, unix_nanos()));
    write_private_file(&path, body.as_bytes())?;

    let pubkeys: Vec<String> = records.into_iter().map(|r| r.full_pubkey).collect();
    store.update_status(account, &pubkeys, AddressStatus::AddressExported)?;
    log_info!("export", "addresses exported", account = account, count = pubkeys.len(), file = path.display());
    Ok(path)
}

fn parse_line(line: &str, address_type: AddressType) -> WalletResult<WatchAddress> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() != COLUMNS {
        return Err(WalletError::validation(format!(
            "expected {} columns, found {}",
            COLUMNS,
            fields.len()
        )));
    }
    let coin: CoinTypeCode = fields[0].parse().map_err(WalletError::validation)?;
    let account: AccountType = fields[1].parse().map_err(WalletError::validation)?;
    let index: u32 = fields[8]
        .parse()
        .map_err(|_| WalletError::validation(format!("invalid index {}", fields[8])))?;

    let address = if account.is_multisig() {
        fields[7]
    } else {
        match address_type {
            AddressType::P2pkh => fields[2],
            AddressType::P2shSegwit => fields[3],
            AddressType::Bech32 => fields[4],
            AddressType::Taproot => fields[5],
        }
    };
    if address.is_empty() {
        return Err(WalletError::validation(format!("no address for {} index {}", account, index)));
    }

    Ok(WatchAddress {
        coin,
        account,
        address: address.to_string(),
        index,
        is_allocated: false,
    })
}

/// Load an address export into the watch store; duplicates are skipped
pub fn import_addresses<S: WatchStore>(store: &mut S, config: &WalletConfig, path: &Path) -> WalletResult<usize> {
    let text = fs::read_to_string(path)?;
    let addresses = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            parse_line(line, config.address_type)
                .map_err(|e| e.with_details(format!("{} line {}", path.display(), n + 1)))
        })
        .collect::<WalletResult<Vec<_>>>()?;

    let total = addresses.len();
    let added = store.insert_addresses(addresses)?;
    log_info!("export", "addresses imported", total = total, added = added);
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::storage::JsonStore;
    use crate::wallet::keygen::tests::seeded_store;
    use crate::wallet::keygen::{create_hd_keys, import_private_keys, Role};

    fn config_in(dir: &Path) -> WalletConfig {
        let mut config = WalletConfig::default();
        config.file_path.address = dir.join("address");
        config
    }

    #[test]
    fn test_client_export_and_import() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let mut keygen = seeded_store();
        create_hd_keys(&mut keygen, &config, Role::Keygen, AccountType::Client, 2).unwrap();

        // Nothing exportable until keys are imported
        assert_eq!(
            export_addresses(&mut keygen, &config, AccountType::Client).unwrap_err().code,
            ErrorCode::NotFound
        );
        import_private_keys(&mut keygen, &config, Role::Keygen, AccountType::Client).unwrap();
        let path = export_addresses(&mut keygen, &config, AccountType::Client).unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("address_client_"));
        assert_eq!(
            keygen.keys_by_status(AccountType::Client, AddressStatus::AddressExported).unwrap().len(),
            2
        );

        let text = fs::read_to_string(&path).unwrap();
        let first = text.lines().next().unwrap();
        assert_eq!(first.split(',').count(), COLUMNS);
        assert!(first.starts_with("btc,client,"));

        let mut watch = JsonStore::in_memory();
        assert_eq!(import_addresses(&mut watch, &config, &path).unwrap(), 2);
        assert_eq!(import_addresses(&mut watch, &config, &path).unwrap(), 0);
        let stored = watch.addresses(AccountType::Client).unwrap();
        assert!(stored[0].address.starts_with("tb1q"));
    }

    #[test]
    fn test_multisig_rows_use_multisig_column() {
        let line = "btc,deposit,a,b,c,d,02ff,tb1qmultisig,4";
        let parsed = parse_line(line, AddressType::Bech32).unwrap();
        assert_eq!(parsed.address, "tb1qmultisig");
        assert_eq!(parsed.index, 4);

        let missing = "btc,deposit,a,b,c,d,02ff,,4";
        assert!(parse_line(missing, AddressType::Bech32).is_err());
    }

    #[test]
    fn test_purpose_column_for_plain_accounts() {
        let line = "btc,client,legacy,nested,native,tap,02ff,,0";
        assert_eq!(parse_line(line, AddressType::P2pkh).unwrap().address, "legacy");
        assert_eq!(parse_line(line, AddressType::Taproot).unwrap().address, "tap");
        assert!(parse_line("btc,client,too,few", AddressType::Bech32).is_err());
    }
}
