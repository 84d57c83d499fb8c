//! Bitcoin-family chain adapter

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::transaction::Version;
use bitcoin::{Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::config::{FeeConfig, WalletConfig};
use crate::error::{WalletError, WalletResult};
use crate::types::{AccountType, AddressType, CoinTypeCode};
use crate::wallet::utxo::UnspentOutput;
use crate::{log_debug, log_info};

use super::fee::{FeeEstimator, InputKind, DUST_LIMIT};
use super::{ChainAdapter, NodeClient};

/// [`ChainAdapter`] for BTC and BCH over any [`NodeClient`]
pub struct BitcoinAdapter<N: NodeClient> {
    node: N,
    coin: CoinTypeCode,
    network: Network,
    address_type: AddressType,
    fees: FeeConfig,
    /// (required, total) per multisig account, for sizing inputs without scripts
    multisig_shapes: BTreeMap<AccountType, (u64, u64)>,
}

impl<N: NodeClient> BitcoinAdapter<N> {
    pub fn new(node: N, config: &WalletConfig) -> WalletResult<Self> {
        if !config.coin_type.is_utxo() {
            return Err(WalletError::config(format!(
                "{} is not a UTXO chain",
                config.coin_type
            )));
        }
        let multisig_shapes = config
            .multisig_policies()?
            .into_iter()
            .map(|(account, policy)| (account, (policy.required() as u64, policy.total() as u64)))
            .collect();

        Ok(Self {
            node,
            coin: config.coin_type,
            network: config.bitcoin_network(),
            address_type: config.address_type,
            fees: config.fee.clone(),
            multisig_shapes,
        })
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    fn input_hint(&self, utxo: &UnspentOutput) -> Option<InputKind> {
        let account = utxo.account?;
        let &(required, total) = self.multisig_shapes.get(&account)?;
        Some(match self.address_type {
            AddressType::P2pkh => InputKind::P2shMultisig { required, total },
            AddressType::P2shSegwit => InputKind::P2shP2wshMultisig { required, total },
            AddressType::Bech32 | AddressType::Taproot => InputKind::P2wshMultisig { required, total },
        })
    }
}

impl<N: NodeClient> ChainAdapter for BitcoinAdapter<N> {
    fn coin_type(&self) -> CoinTypeCode {
        self.coin
    }

    fn network(&self) -> Network {
        self.network
    }

    fn list_unspent(&self, account: AccountType) -> WalletResult<Vec<UnspentOutput>> {
        let all = self.node.list_unspent(account)?;
        let total = all.len();
        let spendable: Vec<UnspentOutput> = all.into_iter().filter(|u| u.spendable).collect();
        log_debug!(
            "chain",
            "listed unspent outputs",
            account = account,
            total = total,
            spendable = spendable.len(),
        );
        Ok(spendable)
    }

    fn estimate_fee(
        &self,
        tx: &Transaction,
        prevouts: &[UnspentOutput],
        adjustment: Option<f64>,
    ) -> WalletResult<Amount> {
        let rate = self.node.estimate_fee_rate()?.unwrap_or(self.fees.fee_rate);
        FeeEstimator::new(rate, &self.fees).estimate(tx, prevouts, |u| self.input_hint(u), adjustment)
    }

    fn decode_address(&self, address: &str) -> WalletResult<Address> {
        let unchecked = Address::from_str(address.trim())?;
        Ok(unchecked.require_network(self.network)?)
    }

    fn build_unsigned_tx(
        &self,
        inputs: &[UnspentOutput],
        outputs: &[(Address, Amount)],
    ) -> WalletResult<Transaction> {
        if inputs.is_empty() {
            return Err(WalletError::validation("transaction needs at least one input"));
        }
        if outputs.is_empty() {
            return Err(WalletError::validation("transaction needs at least one output"));
        }

        let input = inputs
            .iter()
            .map(|utxo| {
                let txid = Txid::from_str(&utxo.txid)
                    .map_err(|e| WalletError::parse_error(format!("invalid txid {}: {}", utxo.txid, e)))?;
                Ok(TxIn {
                    previous_output: OutPoint::new(txid, utxo.vout),
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                    witness: Witness::new(),
                })
            })
            .collect::<WalletResult<Vec<_>>>()?;

        let mut output = Vec::with_capacity(outputs.len());
        for (address, amount) in outputs {
            if amount.to_sat() < DUST_LIMIT {
                return Err(WalletError::validation(format!(
                    "output to {} of {} sats is below dust",
                    address,
                    amount.to_sat()
                )));
            }
            output.push(TxOut {
                value: *amount,
                script_pubkey: address.script_pubkey(),
            });
        }

        Ok(Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input,
            output,
        })
    }

    fn broadcast(&self, tx: &Transaction) -> WalletResult<Txid> {
        let returned = self.node.send_raw_transaction(&serialize_hex(tx))?;
        let txid = tx.compute_txid();
        if returned != txid.to_string() {
            return Err(WalletError::internal(format!(
                "node returned txid {} for {}",
                returned, txid
            )));
        }
        log_info!("chain", "transaction broadcast", txid = txid);
        Ok(txid)
    }

    fn confirmations(&self, txid: &Txid) -> WalletResult<u64> {
        self.node.confirmations(&txid.to_string())
    }
}
