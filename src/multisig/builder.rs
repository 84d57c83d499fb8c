//! Batch multisig address generation
//!
//! For every imported key of a multisig account, combine the configured
//! authorization signers' pubkeys with the record's own key, build the
//! redeem script and persist the resulting address.

use bitcoin::Network;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::WalletConfig;
use crate::error::{WalletError, WalletResult};
use crate::storage::{AccountKeyRecord, KeyStore};
use crate::types::{AccountType, AddressStatus, AddressType};
use crate::{log_info, log_warn};

use super::script::{build_multisig_script, multisig_address, validate_threshold, MultisigAddress};

/// Required-signature count and ordered authorization signers of one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigPolicy {
    required: u8,
    signers: Vec<AccountType>,
}

impl MultisigPolicy {
    pub fn new(required: u8, signers: Vec<AccountType>) -> WalletResult<Self> {
        for (i, signer) in signers.iter().enumerate() {
            if !signer.is_authorization() {
                return Err(WalletError::validation(format!(
                    "signer {} is not an authorization account",
                    signer
                )));
            }
            if signers[..i].contains(signer) {
                return Err(WalletError::validation(format!("signer {} listed twice", signer)));
            }
        }
        validate_threshold(required as usize, signers.len() + 1)?;
        Ok(Self { required, signers })
    }

    pub fn required(&self) -> u8 {
        self.required
    }

    /// Signers plus the account's own key
    pub fn total(&self) -> usize {
        self.signers.len() + 1
    }

    pub fn signers(&self) -> &[AccountType] {
        &self.signers
    }
}

/// A record that could not be turned into a multisig address
#[derive(Debug, Clone, Serialize)]
pub struct SkippedRecord {
    pub index: u32,
    pub full_pubkey: String,
    pub reason: String,
}

/// Outcome of one batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct MultisigReport {
    pub account: Option<AccountType>,
    pub created: usize,
    pub addresses: Vec<String>,
    pub skipped: Vec<SkippedRecord>,
}

/// Builds multisig addresses for keys held in a [`KeyStore`]
#[derive(Debug, Clone)]
pub struct MultisigAddressBuilder {
    policies: BTreeMap<AccountType, MultisigPolicy>,
    address_type: AddressType,
    network: Network,
}

impl MultisigAddressBuilder {
    pub fn new(
        policies: BTreeMap<AccountType, MultisigPolicy>,
        address_type: AddressType,
        network: Network,
    ) -> Self {
        Self {
            policies,
            address_type,
            network,
        }
    }

    pub fn from_config(config: &WalletConfig) -> WalletResult<Self> {
        Ok(Self::new(
            config.multisig_policies()?,
            config.address_type,
            config.bitcoin_network(),
        ))
    }

    /// Policy for a multisig account
    pub fn policy(&self, account: AccountType) -> WalletResult<&MultisigPolicy> {
        if !account.is_multisig() {
            return Err(WalletError::validation(format!(
                "{} is not a multisig account",
                account
            )));
        }
        self.policies
            .get(&account)
            .ok_or_else(|| WalletError::config(format!("no multisig policy for {}", account)))
    }

    /// Ordered key list `[signer_1 .. signer_k, own]` for one record
    pub fn ordered_keys(
        &self,
        policy: &MultisigPolicy,
        signer_keys: &BTreeMap<AccountType, String>,
        own_pubkey: &str,
    ) -> WalletResult<Vec<String>> {
        let mut keys = Vec::with_capacity(policy.total());
        for signer in policy.signers() {
            let key = signer_keys.get(signer).ok_or_else(|| {
                WalletError::not_found(format!("full pubkey of {} has not been imported", signer))
            })?;
            keys.push(key.clone());
        }
        keys.push(own_pubkey.to_string());
        Ok(keys)
    }

    /// Multisig address for one account key
    pub fn build_address(
        &self,
        account: AccountType,
        signer_keys: &BTreeMap<AccountType, String>,
        own_pubkey: &str,
    ) -> WalletResult<MultisigAddress> {
        let policy = self.policy(account)?;
        let keys = self.ordered_keys(policy, signer_keys, own_pubkey)?;
        let script = build_multisig_script(policy.required() as usize, &keys)?;
        multisig_address(&script, self.address_type, self.network)
    }

    /// Create addresses for every `PrivKeyImported` key of `account`.
    /// Bad records are logged and skipped; the rest of the batch proceeds.
    pub fn create_multisig_addresses<S: KeyStore>(
        &self,
        store: &mut S,
        account: AccountType,
    ) -> WalletResult<MultisigReport> {
        let policy = self.policy(account)?;

        let mut signer_keys = BTreeMap::new();
        for signer in policy.signers() {
            if let Some(record) = store.auth_pubkey(*signer)? {
                signer_keys.insert(*signer, record.full_pubkey);
            }
        }

        let records = store.keys_by_status(account, AddressStatus::PrivKeyImported)?;
        let mut report = MultisigReport {
            account: Some(account),
            ..Default::default()
        };

        for record in records {
            match self.process_record(store, account, &signer_keys, &record) {
                Ok(address) => {
                    report.created += 1;
                    report.addresses.push(address);
                }
                Err(e) if e.is_skippable() => {
                    log_warn!(
                        "multisig",
                        "multisig record skipped",
                        account = account,
                        index = record.index,
                        error = e,
                    );
                    report.skipped.push(SkippedRecord {
                        index: record.index,
                        full_pubkey: record.full_pubkey.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        log_info!(
            "multisig",
            "multisig addresses created",
            account = account,
            created = report.created,
            skipped = report.skipped.len(),
        );
        Ok(report)
    }

    fn process_record<S: KeyStore>(
        &self,
        store: &mut S,
        account: AccountType,
        signer_keys: &BTreeMap<AccountType, String>,
        record: &AccountKeyRecord,
    ) -> WalletResult<String> {
        let built = self.build_address(account, signer_keys, &record.full_pubkey)?;
        store.update_multisig(account, &record.full_pubkey, &built.address, &built.redeem_script)?;
        Ok(built.address)
    }
}
