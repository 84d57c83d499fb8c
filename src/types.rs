//! Shared domain types
//!
//! Enumerations that cross module boundaries (accounts, address lifecycle,
//! transaction actions and states) are defined here with their numeric
//! codes and string names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Coin Types
// =============================================================================

/// Coin family handled by a wallet process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinTypeCode {
    Btc,
    Bch,
    Eth,
}

impl CoinTypeCode {
    /// SLIP-0044 coin index; every test network shares index 1
    pub fn slip44(&self, mainnet: bool) -> u32 {
        if !mainnet {
            return 1;
        }
        match self {
            CoinTypeCode::Btc => 0,
            CoinTypeCode::Bch => 145,
            CoinTypeCode::Eth => 60,
        }
    }

    pub fn is_utxo(&self) -> bool {
        matches!(self, CoinTypeCode::Btc | CoinTypeCode::Bch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CoinTypeCode::Btc => "btc",
            CoinTypeCode::Bch => "bch",
            CoinTypeCode::Eth => "eth",
        }
    }
}

impl fmt::Display for CoinTypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoinTypeCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "btc" | "bitcoin" => Ok(CoinTypeCode::Btc),
            "bch" | "bitcoin-cash" => Ok(CoinTypeCode::Bch),
            "eth" | "ethereum" => Ok(CoinTypeCode::Eth),
            _ => Err(format!("Unknown coin type: {}", s)),
        }
    }
}

// =============================================================================
// Address Encodings
// =============================================================================

/// Address encoding, one per BIP purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressType {
    /// BIP44 legacy P2PKH
    P2pkh,
    /// BIP49 P2SH-wrapped segwit
    P2shSegwit,
    /// BIP84 native segwit
    Bech32,
    /// BIP86 taproot key-path
    Taproot,
}

impl AddressType {
    pub fn purpose(&self) -> u32 {
        match self {
            AddressType::P2pkh => 44,
            AddressType::P2shSegwit => 49,
            AddressType::Bech32 => 84,
            AddressType::Taproot => 86,
        }
    }

    pub fn from_purpose(purpose: u32) -> Option<Self> {
        match purpose {
            44 => Some(AddressType::P2pkh),
            49 => Some(AddressType::P2shSegwit),
            84 => Some(AddressType::Bech32),
            86 => Some(AddressType::Taproot),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AddressType::P2pkh => "p2pkh",
            AddressType::P2shSegwit => "p2sh-segwit",
            AddressType::Bech32 => "bech32",
            AddressType::Taproot => "taproot",
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "p2pkh" | "legacy" => Ok(AddressType::P2pkh),
            "p2sh-segwit" => Ok(AddressType::P2shSegwit),
            "bech32" | "p2wpkh" => Ok(AddressType::Bech32),
            "taproot" | "p2tr" | "bech32m" => Ok(AddressType::Taproot),
            _ => Err(format!("Unknown address type: {}", s)),
        }
    }
}

// =============================================================================
// Account Types
// =============================================================================

/// Purpose tag of a key family; its index is the BIP32 account level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Client,
    Deposit,
    Payment,
    Stored,
    Auth,
    Auth1,
    Auth2,
    Auth3,
    Auth4,
    Auth5,
    Auth6,
    Auth7,
    Auth8,
    Auth9,
    Auth10,
    Auth11,
    Auth12,
    Auth13,
    Auth14,
    Auth15,
    Anonymous,
}

impl AccountType {
    pub const ALL: [AccountType; 21] = [
        AccountType::Client,
        AccountType::Deposit,
        AccountType::Payment,
        AccountType::Stored,
        AccountType::Auth,
        AccountType::Auth1,
        AccountType::Auth2,
        AccountType::Auth3,
        AccountType::Auth4,
        AccountType::Auth5,
        AccountType::Auth6,
        AccountType::Auth7,
        AccountType::Auth8,
        AccountType::Auth9,
        AccountType::Auth10,
        AccountType::Auth11,
        AccountType::Auth12,
        AccountType::Auth13,
        AccountType::Auth14,
        AccountType::Auth15,
        AccountType::Anonymous,
    ];

    /// Numeric derivation index
    pub fn index(&self) -> u32 {
        match self {
            AccountType::Client => 0,
            AccountType::Deposit => 1,
            AccountType::Payment => 2,
            AccountType::Stored => 3,
            AccountType::Auth => 10,
            AccountType::Auth1 => 11,
            AccountType::Auth2 => 12,
            AccountType::Auth3 => 13,
            AccountType::Auth4 => 14,
            AccountType::Auth5 => 15,
            AccountType::Auth6 => 16,
            AccountType::Auth7 => 17,
            AccountType::Auth8 => 18,
            AccountType::Auth9 => 19,
            AccountType::Auth10 => 20,
            AccountType::Auth11 => 21,
            AccountType::Auth12 => 22,
            AccountType::Auth13 => 23,
            AccountType::Auth14 => 24,
            AccountType::Auth15 => 25,
            AccountType::Anonymous => 99,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.index() == index)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Client => "client",
            AccountType::Deposit => "deposit",
            AccountType::Payment => "payment",
            AccountType::Stored => "stored",
            AccountType::Auth => "auth",
            AccountType::Auth1 => "auth1",
            AccountType::Auth2 => "auth2",
            AccountType::Auth3 => "auth3",
            AccountType::Auth4 => "auth4",
            AccountType::Auth5 => "auth5",
            AccountType::Auth6 => "auth6",
            AccountType::Auth7 => "auth7",
            AccountType::Auth8 => "auth8",
            AccountType::Auth9 => "auth9",
            AccountType::Auth10 => "auth10",
            AccountType::Auth11 => "auth11",
            AccountType::Auth12 => "auth12",
            AccountType::Auth13 => "auth13",
            AccountType::Auth14 => "auth14",
            AccountType::Auth15 => "auth15",
            AccountType::Anonymous => "anonymous",
        }
    }

    /// Accounts whose funds sit behind M-of-N multisig addresses
    pub fn is_multisig(&self) -> bool {
        matches!(self, AccountType::Deposit | AccountType::Payment | AccountType::Stored)
    }

    /// Authorization accounts held by sign processes
    pub fn is_authorization(&self) -> bool {
        (10..=25).contains(&self.index())
    }

    /// Accounts allowed on either side of an internal transfer
    pub fn is_transferable(&self) -> bool {
        !matches!(self, AccountType::Client) && !self.is_authorization()
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == lower)
            .ok_or_else(|| format!("Unknown account type: {}", s))
    }
}

// =============================================================================
// Address Lifecycle
// =============================================================================

/// Lifecycle of an account key record; only ever advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressStatus {
    HdKeyGenerated,
    PrivKeyImported,
    MultisigAddressGenerated,
    AddressExported,
}

impl AddressStatus {
    pub fn code(&self) -> u8 {
        match self {
            AddressStatus::HdKeyGenerated => 0,
            AddressStatus::PrivKeyImported => 1,
            AddressStatus::MultisigAddressGenerated => 2,
            AddressStatus::AddressExported => 3,
        }
    }

    /// Status a record must have before its address can be exported
    pub fn exportable_for(account: AccountType) -> Self {
        if account.is_multisig() {
            AddressStatus::MultisigAddressGenerated
        } else {
            AddressStatus::PrivKeyImported
        }
    }
}

// =============================================================================
// Transaction Actions and States
// =============================================================================

/// Business action a transaction performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Deposit,
    Payment,
    Transfer,
}

impl ActionType {
    pub fn code(&self) -> u8 {
        match self {
            ActionType::Deposit => 1,
            ActionType::Payment => 2,
            ActionType::Transfer => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Deposit => "deposit",
            ActionType::Payment => "payment",
            ActionType::Transfer => "transfer",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(ActionType::Deposit),
            "payment" => Ok(ActionType::Payment),
            "transfer" => Ok(ActionType::Transfer),
            _ => Err(format!("Unknown action type: {}", s)),
        }
    }
}

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Unsigned,
    Signed,
    Sent,
    Done,
    Notified,
    #[serde(rename = "canceled")]
    Cancel,
}

impl TxType {
    pub fn code(&self) -> u8 {
        match self {
            TxType::Unsigned => 1,
            TxType::Signed => 2,
            TxType::Sent => 3,
            TxType::Done => 4,
            TxType::Notified => 5,
            TxType::Cancel => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Unsigned => "unsigned",
            TxType::Signed => "signed",
            TxType::Sent => "sent",
            TxType::Done => "done",
            TxType::Notified => "notified",
            TxType::Cancel => "canceled",
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unsigned" => Ok(TxType::Unsigned),
            "signed" => Ok(TxType::Signed),
            "sent" => Ok(TxType::Sent),
            "done" => Ok(TxType::Done),
            "notified" => Ok(TxType::Notified),
            "canceled" => Ok(TxType::Cancel),
            _ => Err(format!("Unknown tx type: {}", s)),
        }
    }
}
