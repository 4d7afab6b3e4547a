//! Storage capability interfaces.
//!
//! The ledger and user store are traits so that production code runs against
//! Postgres ([`postgres::PgStore`]) while tests inject the in-memory double
//! ([`memory::MemStore`]). Both implementations uphold the same contract:
//! balances never go negative, `balance = total_purchased - total_used -
//! total_revoked` at all times, and a purchase id is applied at most once.

pub mod memory;
pub mod postgres;

use crate::types::{GenerationKind, TransactionType, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("insufficient credits: requested {requested}, available {available}")]
    InsufficientCredits { requested: i64, available: i64 },

    #[error("duplicate {field}")]
    Duplicate { field: String },

    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        StoreError::NotFound { resource: resource.into() }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CreditBalance {
    pub user_id: UserId,
    pub balance: i64,
    pub total_purchased: i64,
    pub total_used: i64,
    pub total_revoked: i64,
}

#[derive(Debug, Clone)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: UserId,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub purchase_id: Option<String>,
    pub operation_kind: Option<GenerationKind>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The vendor-side identity of a purchase being applied to the ledger.
#[derive(Debug, Clone)]
pub struct PurchaseRef {
    pub purchase_id: String,
    pub offer_id: String,
    pub amount_paid: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// The purchase was new; credits were added.
    Applied { balance: i64 },
    /// The purchase id was seen before; nothing changed.
    AlreadyProcessed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeOutcome {
    /// Credits actually removed, clamped to the available balance.
    pub removed: i64,
    pub balance: i64,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, new_user: &NewUser) -> Result<User>;
    async fn get_user(&self, id: UserId) -> Result<User>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<User>;
    async fn update_avatar(&self, id: UserId, avatar_url: &str) -> Result<User>;
    async fn update_password(&self, id: UserId, password_hash: &str) -> Result<()>;
}

#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Current balance and lifetime counters for a user.
    async fn balance(&self, user: UserId) -> Result<CreditBalance>;

    /// Apply a purchase. Idempotent on `purchase.purchase_id`: a replay
    /// returns [`GrantOutcome::AlreadyProcessed`] without touching the
    /// balance.
    async fn grant(&self, user: UserId, credits: i64, purchase: &PurchaseRef) -> Result<GrantOutcome>;

    /// Atomically deduct `cost` credits. Fails with
    /// [`StoreError::InsufficientCredits`] when the balance is short; the
    /// balance is never left negative or partially deducted.
    async fn debit(
        &self,
        user: UserId,
        cost: i64,
        kind: Option<GenerationKind>,
        reason: Option<&str>,
    ) -> Result<CreditBalance>;

    /// Remove credits for a refund or chargeback, clamped at zero. The
    /// clamped amount is added to `total_revoked` so the ledger identity
    /// holds.
    async fn revoke(&self, user: UserId, credits: i64, purchase_id: &str) -> Result<RevokeOutcome>;

    /// The user's audit trail, most recent first.
    async fn transactions(&self, user: UserId, skip: i64, limit: i64) -> Result<Vec<CreditTransaction>>;
}
