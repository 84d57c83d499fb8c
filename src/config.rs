//! Wallet configuration
//!
//! Loaded once from TOML at process start, validated, then passed by
//! reference into every component. Nothing here is mutated afterwards.

use crate::error::{WalletError, WalletResult};
use crate::log_debug;
use crate::multisig::MultisigPolicy;
use crate::types::{AccountType, AddressType, CoinTypeCode};
use bitcoin::Network;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Network selector as written in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl NetworkType {
    pub fn to_network(self) -> Network {
        match self {
            NetworkType::Mainnet => Network::Bitcoin,
            NetworkType::Testnet => Network::Testnet,
            NetworkType::Signet => Network::Signet,
            NetworkType::Regtest => Network::Regtest,
        }
    }

    pub fn is_mainnet(self) -> bool {
        self == NetworkType::Mainnet
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Lower bound for an operator-supplied fee multiplier
    pub adjustment_min: f64,
    /// Upper bound for an operator-supplied fee multiplier
    pub adjustment_max: f64,
    /// Fee rate in sat/vB used by offline nodes
    pub fee_rate: f64,
    /// Floor in sat/vB
    #[serde(alias = "min_relay_fee")]
    pub min_relay_fee_rate: f64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            adjustment_min: 0.5,
            adjustment_max: 5.0,
            fee_rate: 10.0,
            min_relay_fee_rate: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePathConfig {
    pub tx: PathBuf,
    pub address: PathBuf,
    pub full_pubkey: PathBuf,
}

impl Default for FilePathConfig {
    fn default() -> Self {
        Self {
            tx: PathBuf::from("./data/tx/"),
            address: PathBuf::from("./data/address/"),
            full_pubkey: PathBuf::from("./data/fullpubkey/"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Directory holding `listunspent_{account}.json` and `confirmations.json`
    pub snapshot_dir: PathBuf,
    /// Directory receiving raw transactions for broadcast
    pub outbox_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from("./data/node/"),
            outbox_dir: PathBuf::from("./data/outbox/"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Multisig policy as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultisigPolicyConfig {
    pub required: u8,
    pub signers: Vec<String>,
}

/// Complete configuration of one wallet process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub coin_type: CoinTypeCode,
    pub network: NetworkType,
    pub address_type: AddressType,
    /// Confirmations needed before a sent tx is done
    pub confirmation_num: u64,
    pub fee: FeeConfig,
    pub file_path: FilePathConfig,
    pub node: NodeConfig,
    pub logger: LoggerConfig,
    /// Keyed by multisig account name (`deposit`, `payment`, `stored`)
    pub multisig: BTreeMap<String, MultisigPolicyConfig>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        let mut multisig = BTreeMap::new();
        for account in ["deposit", "payment", "stored"] {
            multisig.insert(
                account.to_string(),
                MultisigPolicyConfig {
                    required: 2,
                    signers: vec!["auth1".to_string(), "auth2".to_string()],
                },
            );
        }
        Self {
            coin_type: CoinTypeCode::Btc,
            network: NetworkType::Testnet,
            address_type: AddressType::Bech32,
            confirmation_num: 6,
            fee: FeeConfig::default(),
            file_path: FilePathConfig::default(),
            node: NodeConfig::default(),
            logger: LoggerConfig::default(),
            multisig,
        }
    }
}

impl WalletConfig {
    /// Read, parse and validate a TOML config file
    pub fn load<P: AsRef<Path>>(path: P) -> WalletResult<Self> {
        let text = fs::read_to_string(&path).map_err(|e| {
            WalletError::config(format!("couldn't read config file {}", path.as_ref().display()))
                .with_details(e.to_string())
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> WalletResult<Self> {
        let config: WalletConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WalletResult<()> {
        if self.fee.adjustment_min <= 0.0 || self.fee.adjustment_min > self.fee.adjustment_max {
            return Err(WalletError::config(format!(
                "invalid fee adjustment range [{}, {}]",
                self.fee.adjustment_min, self.fee.adjustment_max
            )));
        }
        if self.fee.fee_rate <= 0.0 || self.fee.min_relay_fee_rate < 0.0 {
            return Err(WalletError::config("fee rates must be positive"));
        }
        if self.confirmation_num == 0 {
            return Err(WalletError::config("confirmation_num must be at least 1"));
        }
        if self.coin_type == CoinTypeCode::Eth && !self.multisig.is_empty() {
            log_debug!("config", "multisig policies ignored for account-based chains", coin = self.coin_type);
        }
        self.multisig_policies().map(|_| ())
    }

    pub fn bitcoin_network(&self) -> Network {
        self.network.to_network()
    }

    /// SLIP-0044 coin index used at the second derivation level
    pub fn coin_index(&self) -> u32 {
        self.coin_type.slip44(self.network.is_mainnet())
    }

    /// Parse the configured policies into their typed form
    pub fn multisig_policies(&self) -> WalletResult<BTreeMap<AccountType, MultisigPolicy>> {
        let mut policies = BTreeMap::new();
        for (name, raw) in &self.multisig {
            let account: AccountType = name.parse().map_err(WalletError::config)?;
            if !account.is_multisig() {
                return Err(WalletError::config(format!(
                    "{} is not a multisig account",
                    account
                )));
            }
            let signers = raw
                .signers
                .iter()
                .map(|s| s.parse::<AccountType>().map_err(WalletError::config))
                .collect::<WalletResult<Vec<_>>>()?;
            let policy = MultisigPolicy::new(raw.required, signers)
                .map_err(|e| WalletError::config(format!("multisig.{}: {}", name, e.message)))?;
            policies.insert(account, policy);
        }
        Ok(policies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
coin_type = "btc"
network = "regtest"
address_type = "taproot"
confirmation_num = 3

[fee]
adjustment_min = 0.8
adjustment_max = 2.0
fee_rate = 4.0

[file_path]
tx = "/tmp/wallet/tx/"

[multisig.deposit]
required = 2
signers = ["auth1", "auth2", "auth3"]

[multisig.payment]
required = 3
signers = ["auth1", "auth2", "auth3"]
"#;

    #[test]
    fn test_parse_sample() {
        let config = WalletConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.network, NetworkType::Regtest);
        assert_eq!(config.address_type, AddressType::Taproot);
        assert_eq!(config.fee.min_relay_fee_rate, 1.0);
        assert_eq!(config.file_path.tx, PathBuf::from("/tmp/wallet/tx/"));
        assert_eq!(config.file_path.address, PathBuf::from("./data/address/"));

        let policies = config.multisig_policies().unwrap();
        let deposit = &policies[&AccountType::Deposit];
        assert_eq!(deposit.required(), 2);
        assert_eq!(deposit.total(), 4);
        assert!(!policies.contains_key(&AccountType::Stored));
    }

    #[test]
    fn test_default_is_valid() {
        let config = WalletConfig::default();
        config.validate().unwrap();
        assert_eq!(config.coin_index(), 1);
        assert_eq!(config.bitcoin_network(), Network::Testnet);
    }

    #[test]
    fn test_rejects_non_multisig_policy() {
        let text = "[multisig.client]\nrequired = 1\nsigners = [\"auth1\"]\n";
        let err = WalletConfig::from_toml_str(text).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Config);
    }

    #[test]
    fn test_rejects_bad_fee_range() {
        let text = "[fee]\nadjustment_min = 3.0\nadjustment_max = 1.0\n";
        assert!(WalletConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn test_account_chain_keeps_multisig_section() {
        let text = "coin_type = \"eth\"\n[multisig.deposit]\nrequired = 1\nsigners = [\"auth1\"]\n";
        let config = WalletConfig::from_toml_str(text).unwrap();
        assert_eq!(config.coin_type, CoinTypeCode::Eth);
        assert_eq!(config.multisig_policies().unwrap().len(), 1);
    }
}
