//! Wallet ledger core
//!
//! Append-only, per-account hash-chained ledger with an atomically maintained
//! balance cache.
//!
//! # Architecture
//!
//! - **Append-only**: entries are never updated or deleted; corrections are new entries
//! - **Hash chain**: each entry commits to its predecessor via SHA-256 over a canonical form
//! - **Derived balances**: the cached balance is reconstructable from the chain
//! - **Single writer**: only the settlement orchestrator links the append path
//!
//! # Invariants
//!
//! - `entry(A, k).prev_hash == entry(A, k-1).entry_hash` for every `k > 1`
//! - `wallet_seq` is dense and monotonic per account, starting at 1
//! - cached balance equals the signed reduction over all entries of the account
//! - balances never go negative

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod canonical;
pub mod chain;
pub mod error;
pub mod references;
pub mod store;
pub mod types;

pub use chain::{recompute_balance, verify_entries};
pub use error::{Error, Result};
pub use store::{append_entry, LedgerStore};
pub use types::{
    AppendEntry, EntryType, LedgerEntry, VerifyChainResult, WalletBalance, GENESIS_MARKETING_AMOUNT,
    GENESIS_MARKETING_REFERENCE, LEGACY_MIGRATION_WALLET, MARKETING_WALLET, PLATFORM_ESCROW,
};
