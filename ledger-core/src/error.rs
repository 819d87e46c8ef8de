//! Error types for the ledger

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Debit would take the wallet below zero
    #[error("Insufficient balance on {account_id}: balance {balance}, debit {amount}")]
    InsufficientBalance {
        account_id: String,
        balance: Decimal,
        amount: Decimal,
    },

    /// Debit targeted an account with no balance row
    #[error("Cannot debit non-existent wallet: {0}")]
    DebitOnNonExistentWallet(String),

    /// Reference failed the `[A-Z0-9_]+` contract
    #[error("Invalid ledger reference: {0}")]
    InvalidReference(String),

    /// Amount was non-positive or exceeded scale 4
    #[error("Invalid entry amount: {0}")]
    InvalidAmount(Decimal),

    /// Concurrent appenders conflicted; the transaction can be retried
    #[error("Serializable transaction conflict, retry")]
    SerializationFailure,
}

impl Error {
    /// Whether the caller may retry the whole transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SerializationFailure)
    }
}

/// Postgres class 40001 (serialization_failure) and losing the dense-sequence
/// insert race both surface as the retryable conflict.
pub(crate) fn map_db_error(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db) = &err {
        if let Some(code) = db.code() {
            if code == "40001" {
                return Error::SerializationFailure;
            }
            if code == "23505"
                && db
                    .constraint()
                    .is_some_and(|c| c.contains("account_seq"))
            {
                return Error::SerializationFailure;
            }
        }
    }
    Error::Database(err)
}
