//! Postgres-backed ledger storage
//!
//! [`append_entry`] is the only write path into `ledger_entries` and
//! `wallet_balances`; it must run inside the caller's serializable
//! transaction so multi-leg settlements commit or roll back as one unit.
//! Everything else here is read-only.

use crate::error::{map_db_error, Error, Result};
use crate::types::{
    AppendEntry, EntryType, LedgerEntry, VerifyChainResult, WalletBalance,
    GENESIS_MARKETING_AMOUNT, GENESIS_MARKETING_REFERENCE, LEGACY_MIGRATION_WALLET,
    MARKETING_WALLET, PLATFORM_ESCROW,
};
use crate::{canonical, chain, references};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, QueryBuilder, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

/// Filters for the paginated entry listing.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub account_id: Option<String>,
    pub reference: Option<String>,
    pub order_id: Option<String>,
    pub entry_type: Option<EntryType>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub page: i64,
    pub limit: i64,
}

/// A page of ledger entries.
#[derive(Debug, Clone)]
pub struct EntryPage {
    pub entries: Vec<LedgerEntry>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// Append one entry and maintain the balance cache, inside `tx`.
///
/// Idempotent on `(account_id, reference)`: a second call returns the stored
/// entry and leaves the balance untouched.
pub async fn append_entry(
    tx: &mut Transaction<'_, Postgres>,
    input: AppendEntry,
) -> Result<LedgerEntry> {
    if !references::is_well_formed(&input.reference) {
        return Err(Error::InvalidReference(input.reference));
    }
    if input.amount <= Decimal::ZERO || input.amount.scale() > 4 {
        return Err(Error::InvalidAmount(input.amount));
    }

    let existing = sqlx::query_as::<_, LedgerEntry>(
        "SELECT * FROM ledger_entries WHERE account_id = $1 AND reference = $2",
    )
    .bind(&input.account_id)
    .bind(&input.reference)
    .fetch_optional(&mut **tx)
    .await?;
    if let Some(entry) = existing {
        debug!(
            account_id = %entry.account_id,
            reference = %entry.reference,
            "idempotent append hit"
        );
        return Ok(entry);
    }

    // Lock the tail so concurrent appenders on this account serialize and
    // wallet_seq stays dense.
    let tail = sqlx::query_as::<_, LedgerEntry>(
        "SELECT * FROM ledger_entries WHERE account_id = $1 \
         ORDER BY wallet_seq DESC LIMIT 1 FOR UPDATE",
    )
    .bind(&input.account_id)
    .fetch_optional(&mut **tx)
    .await?;

    let (prev_hash, wallet_seq) = match &tail {
        Some(t) => (Some(t.entry_hash.clone()), t.wallet_seq + 1),
        None => (None, 1),
    };

    let mut amount = input.amount;
    amount.rescale(4);

    let entry_hash = canonical::entry_hash(
        prev_hash.as_deref(),
        &input.account_id,
        wallet_seq,
        &input.reference,
        input.entry_type,
        amount,
        input.description.as_deref(),
    );

    let entry = sqlx::query_as::<_, LedgerEntry>(
        r#"
        INSERT INTO ledger_entries (
            id, account_id, wallet_seq, reference, order_id, entry_type, amount,
            description, prev_hash, entry_hash, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&input.account_id)
    .bind(wallet_seq)
    .bind(&input.reference)
    .bind(&input.order_id)
    .bind(input.entry_type.as_str())
    .bind(amount)
    .bind(&input.description)
    .bind(&prev_hash)
    .bind(&entry_hash)
    .bind(Utc::now())
    .fetch_one(&mut **tx)
    .await
    .map_err(map_db_error)?;

    apply_to_balance(tx, &entry, input.entry_type).await?;

    debug!(
        account_id = %entry.account_id,
        wallet_seq = entry.wallet_seq,
        reference = %entry.reference,
        entry_type = %entry.entry_type,
        "ledger entry appended"
    );

    Ok(entry)
}

async fn apply_to_balance(
    tx: &mut Transaction<'_, Postgres>,
    entry: &LedgerEntry,
    kind: EntryType,
) -> Result<()> {
    let cache = sqlx::query_as::<_, WalletBalance>(
        "SELECT * FROM wallet_balances WHERE account_id = $1 FOR UPDATE",
    )
    .bind(&entry.account_id)
    .fetch_optional(&mut **tx)
    .await?;

    match cache {
        Some(cache) => {
            let delta = match kind {
                EntryType::Credit => entry.amount,
                EntryType::Debit => -entry.amount,
            };
            let new_balance = cache.balance + delta;
            if new_balance < Decimal::ZERO {
                return Err(Error::InsufficientBalance {
                    account_id: entry.account_id.clone(),
                    balance: cache.balance,
                    amount: entry.amount,
                });
            }
            sqlx::query(
                "UPDATE wallet_balances \
                 SET balance = $1, last_entry_seq = $2, last_updated_at = $3 \
                 WHERE account_id = $4",
            )
            .bind(new_balance)
            .bind(entry.wallet_seq)
            .bind(Utc::now())
            .bind(&entry.account_id)
            .execute(&mut **tx)
            .await?;
        }
        None => {
            if kind == EntryType::Debit {
                return Err(Error::DebitOnNonExistentWallet(entry.account_id.clone()));
            }
            sqlx::query(
                "INSERT INTO wallet_balances \
                     (account_id, balance, currency, last_entry_seq, last_updated_at) \
                 VALUES ($1, $2, 'NGN', $3, $4)",
            )
            .bind(&entry.account_id)
            .bind(entry.amount)
            .bind(entry.wallet_seq)
            .bind(Utc::now())
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}

/// Read-only ledger access plus genesis seeding.
#[derive(Clone)]
pub struct LedgerStore {
    pool: PgPool,
}

impl LedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Entries matching any of `refs`, in creation order.
    pub async fn entries_by_references(&self, refs: &[String]) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            "SELECT * FROM ledger_entries WHERE reference = ANY($1) \
             ORDER BY created_at, wallet_seq",
        )
        .bind(refs)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Cached balance row, if the account has one.
    pub async fn balance(&self, account_id: &str) -> Result<Option<WalletBalance>> {
        let row = sqlx::query_as::<_, WalletBalance>(
            "SELECT * FROM wallet_balances WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Reduce the full chain of an account; used to audit the cache.
    pub async fn recompute_balance(&self, account_id: &str) -> Result<Decimal> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            "SELECT * FROM ledger_entries WHERE account_id = $1 ORDER BY wallet_seq",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chain::recompute_balance(&entries))
    }

    /// Verify the hash chain of an account over an optional
    /// `[from_seq, to_seq]` window.
    pub async fn verify_chain(
        &self,
        account_id: &str,
        from_seq: Option<i64>,
        to_seq: Option<i64>,
    ) -> Result<VerifyChainResult> {
        let from = from_seq.unwrap_or(1);

        let expected_prev = if from > 1 {
            let predecessor = sqlx::query_scalar::<_, String>(
                "SELECT entry_hash FROM ledger_entries \
                 WHERE account_id = $1 AND wallet_seq = $2",
            )
            .bind(account_id)
            .bind(from - 1)
            .fetch_optional(&self.pool)
            .await?;
            match predecessor {
                Some(hash) => Some(hash),
                None => {
                    return Ok(VerifyChainResult::broken(
                        from,
                        None,
                        None,
                        format!("Previous entry at sequence {} not found", from - 1),
                    ))
                }
            }
        } else {
            None
        };

        let entries = sqlx::query_as::<_, LedgerEntry>(
            "SELECT * FROM ledger_entries WHERE account_id = $1 AND wallet_seq >= $2 \
             AND ($3::BIGINT IS NULL OR wallet_seq <= $3) ORDER BY wallet_seq",
        )
        .bind(account_id)
        .bind(from)
        .bind(to_seq)
        .fetch_all(&self.pool)
        .await?;

        Ok(chain::verify_entries(&entries, expected_prev))
    }

    /// Paginated, filtered listing for the read API.
    pub async fn list_entries(&self, filter: EntryFilter) -> Result<EntryPage> {
        let page = filter.page.max(1);
        let limit = filter.limit.clamp(1, 200);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ledger_entries WHERE 1=1");
        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM ledger_entries WHERE 1=1");
        for builder in [&mut count, &mut select] {
            if let Some(account_id) = &filter.account_id {
                builder.push(" AND account_id = ").push_bind(account_id.clone());
            }
            if let Some(reference) = &filter.reference {
                builder.push(" AND reference = ").push_bind(reference.clone());
            }
            if let Some(order_id) = &filter.order_id {
                builder.push(" AND order_id = ").push_bind(order_id.clone());
            }
            if let Some(entry_type) = filter.entry_type {
                builder.push(" AND entry_type = ").push_bind(entry_type.as_str());
            }
            if let Some(from) = filter.from_date {
                builder.push(" AND created_at >= ").push_bind(from);
            }
            if let Some(to) = filter.to_date {
                builder.push(" AND created_at <= ").push_bind(to);
            }
        }

        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        select
            .push(" ORDER BY created_at DESC, wallet_seq DESC OFFSET ")
            .push_bind((page - 1) * limit)
            .push(" LIMIT ")
            .push_bind(limit);
        let entries = select
            .build_query_as::<LedgerEntry>()
            .fetch_all(&self.pool)
            .await?;

        Ok(EntryPage {
            entries,
            total,
            page,
            limit,
        })
    }

    /// Seed the genesis state: the marketing wallet's initial credit through
    /// the normal append path, and zero-balance rows for the escrow and
    /// migration wallets. Safe to run on every startup.
    pub async fn seed_genesis(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let genesis = append_entry(
            &mut tx,
            AppendEntry {
                account_id: MARKETING_WALLET.to_string(),
                reference: GENESIS_MARKETING_REFERENCE.to_string(),
                order_id: None,
                entry_type: EntryType::Credit,
                amount: GENESIS_MARKETING_AMOUNT,
                description: Some("Genesis marketing wallet funding".to_string()),
            },
        )
        .await?;

        for account in [PLATFORM_ESCROW, LEGACY_MIGRATION_WALLET] {
            sqlx::query(
                "INSERT INTO wallet_balances \
                     (account_id, balance, currency, last_entry_seq, last_updated_at) \
                 VALUES ($1, 0, 'NGN', 0, $2) \
                 ON CONFLICT (account_id) DO NOTHING",
            )
            .bind(account)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await.map_err(map_db_error)?;
        info!(
            genesis_entry = %genesis.entry_hash,
            "genesis accounts seeded"
        );
        Ok(())
    }
}
