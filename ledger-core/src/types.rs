//! Core types for the wallet ledger
//!
//! Row types derive `sqlx::FromRow` for the Postgres store; JSON field names
//! follow the external camelCase contract.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Escrow account credited on every settlement.
pub const PLATFORM_ESCROW: &str = "PLATFORM_ESCROW";

/// Wallet debited for discount subsidies.
pub const MARKETING_WALLET: &str = "MARKETING_WALLET";

/// Holding account for balances carried over from the legacy system.
pub const LEGACY_MIGRATION_WALLET: &str = "LEGACY_MIGRATION_WALLET";

/// Reference of the marketing wallet's genesis credit.
pub const GENESIS_MARKETING_REFERENCE: &str = "GENESIS_MARKETING_WALLET";

/// Initial marketing wallet credit seeded at installation: 1,000,000.0000.
pub const GENESIS_MARKETING_AMOUNT: Decimal = Decimal::from_parts(1_410_065_408, 2, 0, false, 4);

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Credit,
    Debit,
}

impl EntryType {
    /// Wire form, as stored and as hashed.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Credit => "CREDIT",
            EntryType::Debit => "DEBIT",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREDIT" => Ok(EntryType::Credit),
            "DEBIT" => Ok(EntryType::Debit),
            other => Err(format!("unknown entry type: {other}")),
        }
    }
}

/// An immutable ledger entry.
///
/// `entry_type` is carried as text exactly as stored; use [`LedgerEntry::kind`]
/// for the typed view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: String,
    pub wallet_seq: i64,
    pub reference: String,
    pub order_id: Option<String>,
    pub entry_type: String,
    pub amount: Decimal,
    pub description: Option<String>,
    pub prev_hash: Option<String>,
    pub entry_hash: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Typed entry direction. Stored rows only ever hold `CREDIT` or `DEBIT`.
    pub fn kind(&self) -> Option<EntryType> {
        self.entry_type.parse().ok()
    }

    /// Amount signed by direction: positive for credits, negative for debits.
    pub fn signed_amount(&self) -> Decimal {
        match self.kind() {
            Some(EntryType::Debit) => -self.amount,
            _ => self.amount,
        }
    }
}

/// Cached per-account balance, derived from the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub account_id: String,
    pub balance: Decimal,
    pub currency: String,
    pub last_entry_seq: i64,
    pub last_updated_at: DateTime<Utc>,
}

/// Input to the append operation.
#[derive(Debug, Clone)]
pub struct AppendEntry {
    pub account_id: String,
    pub reference: String,
    pub order_id: Option<String>,
    pub entry_type: EntryType,
    pub amount: Decimal,
    pub description: Option<String>,
}

/// Outcome of a chain verification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyChainResult {
    pub valid: bool,
    pub entries_verified: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at_seq: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_hash: Option<String>,
    pub message: String,
}

impl VerifyChainResult {
    pub fn ok(entries_verified: usize) -> Self {
        Self {
            valid: true,
            entries_verified,
            broken_at_seq: None,
            expected_hash: None,
            actual_hash: None,
            message: "Chain integrity verified".to_string(),
        }
    }

    pub fn broken(
        seq: i64,
        expected: Option<String>,
        actual: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            valid: false,
            entries_verified: 0,
            broken_at_seq: Some(seq),
            expected_hash: expected,
            actual_hash: actual,
            message: message.into(),
        }
    }
}
