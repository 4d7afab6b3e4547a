//! Postgres-backed store.
//!
//! Per-user writes are serialized with `pg_advisory_xact_lock`, keyed on the
//! first 8 bytes of the user UUID. The lock is transaction-scoped so it
//! releases automatically on commit or rollback. Check-and-debit is a single
//! conditional UPDATE, so concurrent debits cannot overdraw even without the
//! advisory lock.

use crate::{
    storage::{
        CreditBalance, CreditLedger, CreditTransaction, GrantOutcome, NewUser, ProfileUpdate, PurchaseRef, Result,
        RevokeOutcome, StoreError, User, UserStore,
    },
    types::{GenerationKind, TransactionType, UserId},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{trace, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Advisory lock key for a user: the first 8 bytes of the UUID as a big-endian
/// i64, as everywhere else we serialize per-user ledger writes.
fn advisory_lock_key(user: UserId) -> i64 {
    let b = user.as_bytes();
    i64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

async fn lock_user(tx: &mut Transaction<'_, Postgres>, user: UserId) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(advisory_lock_key(user))
        .execute(&mut **tx)
        .await?;
    trace!(%user, "acquired ledger lock");
    Ok(())
}

fn map_unique_violation(e: sqlx::Error, field: &str) -> StoreError {
    if let sqlx::Error::Database(ref db) = e {
        if db.kind() == sqlx::error::ErrorKind::UniqueViolation {
            return StoreError::Duplicate { field: field.to_string() };
        }
    }
    StoreError::Backend(e)
}

#[derive(FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: UserId,
    transaction_type: String,
    amount: i64,
    purchase_id: Option<String>,
    operation_kind: Option<String>,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for CreditTransaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self> {
        let transaction_type = match row.transaction_type.as_str() {
            "purchase" => TransactionType::Purchase,
            "usage" => TransactionType::Usage,
            "refund" => TransactionType::Refund,
            "admin" => TransactionType::Admin,
            other => {
                return Err(StoreError::Backend(sqlx::Error::Decode(
                    format!("unknown transaction_type '{other}'").into(),
                )))
            }
        };
        let operation_kind = match row.operation_kind.as_deref() {
            None => None,
            Some("chat") => Some(GenerationKind::Chat),
            Some("prompt") => Some(GenerationKind::Prompt),
            Some("image") => Some(GenerationKind::Image),
            Some("video") => Some(GenerationKind::Video),
            Some(other) => {
                return Err(StoreError::Backend(sqlx::Error::Decode(
                    format!("unknown operation_kind '{other}'").into(),
                )))
            }
        };
        Ok(CreditTransaction {
            id: row.id,
            user_id: row.user_id,
            transaction_type,
            amount: row.amount,
            purchase_id: row.purchase_id,
            operation_kind,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, new_user: &NewUser) -> Result<User> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, display_name)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, display_name, avatar_url, created_at, updated_at
            "#,
        )
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.display_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, "email"))?;

        // Every account gets a ledger row up front so debits and grants never
        // have to create it lazily.
        sqlx::query("INSERT INTO user_credits (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<User> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, display_name, avatar_url, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("user"))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, display_name, avatar_url, created_at, updated_at FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                display_name = COALESCE($3, display_name),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, password_hash, display_name, avatar_url, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&update.email)
        .bind(&update.display_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "email"))?
        .ok_or_else(|| StoreError::not_found("user"))
    }

    async fn update_avatar(&self, id: UserId, avatar_url: &str) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET avatar_url = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, password_hash, display_name, avatar_url, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(avatar_url)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("user"))
    }

    async fn update_password(&self, id: UserId, password_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user"));
        }
        Ok(())
    }
}

#[async_trait]
impl CreditLedger for PgStore {
    async fn balance(&self, user: UserId) -> Result<CreditBalance> {
        sqlx::query_as::<_, CreditBalance>(
            "SELECT user_id, balance, total_purchased, total_used, total_revoked FROM user_credits WHERE user_id = $1",
        )
        .bind(user)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("user credits"))
    }

    async fn grant(&self, user: UserId, credits: i64, purchase: &PurchaseRef) -> Result<GrantOutcome> {
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, user).await?;

        // The PK on purchase_id is the idempotency gate: a replayed webhook
        // inserts zero rows and we bail out before touching the balance.
        let inserted = sqlx::query(
            r#"
            INSERT INTO processed_purchases (purchase_id, user_id, offer_id, credits, amount_paid)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (purchase_id) DO NOTHING
            "#,
        )
        .bind(&purchase.purchase_id)
        .bind(user)
        .bind(&purchase.offer_id)
        .bind(credits)
        .bind(purchase.amount_paid)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(GrantOutcome::AlreadyProcessed);
        }

        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE user_credits
            SET balance = balance + $2,
                total_purchased = total_purchased + $2,
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING balance
            "#,
        )
        .bind(user)
        .bind(credits)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("user credits"))?;

        sqlx::query(
            r#"
            INSERT INTO credit_transactions (user_id, transaction_type, amount, purchase_id, description)
            VALUES ($1, 'purchase', $2, $3, $4)
            "#,
        )
        .bind(user)
        .bind(credits)
        .bind(&purchase.purchase_id)
        .bind(format!("Purchase of offer {}", purchase.offer_id))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(GrantOutcome::Applied { balance })
    }

    async fn debit(
        &self,
        user: UserId,
        cost: i64,
        kind: Option<GenerationKind>,
        reason: Option<&str>,
    ) -> Result<CreditBalance> {
        let mut tx = self.pool.begin().await?;

        // Single conditional update: check and deduct in one statement, so a
        // concurrent debit can never drive the balance negative.
        let updated = sqlx::query_as::<_, CreditBalance>(
            r#"
            UPDATE user_credits
            SET balance = balance - $2,
                total_used = total_used + $2,
                updated_at = NOW()
            WHERE user_id = $1 AND balance >= $2
            RETURNING user_id, balance, total_purchased, total_used, total_revoked
            "#,
        )
        .bind(user)
        .bind(cost)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(balance) = updated else {
            let available = sqlx::query_scalar::<_, i64>("SELECT balance FROM user_credits WHERE user_id = $1")
                .bind(user)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::not_found("user credits"))?;
            tx.rollback().await?;
            return Err(StoreError::InsufficientCredits { requested: cost, available });
        };

        sqlx::query(
            r#"
            INSERT INTO credit_transactions (user_id, transaction_type, amount, operation_kind, description)
            VALUES ($1, 'usage', $2, $3, $4)
            "#,
        )
        .bind(user)
        .bind(-cost)
        .bind(kind.map(|k| k.as_str()))
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(balance)
    }

    async fn revoke(&self, user: UserId, credits: i64, purchase_id: &str) -> Result<RevokeOutcome> {
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, user).await?;

        let available = sqlx::query_scalar::<_, i64>("SELECT balance FROM user_credits WHERE user_id = $1")
            .bind(user)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("user credits"))?;

        // Clamp at zero: the user may have spent credits since the purchase.
        let removed = credits.min(available);
        if removed < credits {
            warn!(
                %user,
                purchase_id,
                requested = credits,
                removed,
                "refund clamped to available balance"
            );
        }

        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE user_credits
            SET balance = balance - $2,
                total_revoked = total_revoked + $2,
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING balance
            "#,
        )
        .bind(user)
        .bind(removed)
        .fetch_one(&mut *tx)
        .await?;

        if removed > 0 {
            sqlx::query(
                r#"
                INSERT INTO credit_transactions (user_id, transaction_type, amount, purchase_id, description)
                VALUES ($1, 'refund', $2, $3, $4)
                "#,
            )
            .bind(user)
            .bind(-removed)
            .bind(purchase_id)
            .bind(format!("Refund of purchase {purchase_id}"))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(RevokeOutcome { removed, balance })
    }

    async fn transactions(&self, user: UserId, skip: i64, limit: i64) -> Result<Vec<CreditTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, user_id, transaction_type, amount, purchase_id, operation_kind, description, created_at
            FROM credit_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(user)
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CreditTransaction::try_from).collect()
    }
}
