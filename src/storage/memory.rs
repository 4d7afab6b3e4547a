//! In-memory store double for tests.
//!
//! Implements the same contract as the Postgres store: a single mutex guards
//! each operation end to end, so check-and-debit and grant-with-dedup are
//! atomic just like their SQL counterparts.

use crate::{
    storage::{
        CreditBalance, CreditLedger, CreditTransaction, GrantOutcome, NewUser, ProfileUpdate, PurchaseRef, Result,
        RevokeOutcome, StoreError, User, UserStore,
    },
    types::{GenerationKind, TransactionType, UserId},
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    credits: HashMap<UserId, CreditBalance>,
    processed_purchases: HashSet<String>,
    transactions: Vec<CreditTransaction>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn credits_mut(&mut self, user: UserId) -> Result<&mut CreditBalance> {
        self.credits.get_mut(&user).ok_or_else(|| StoreError::not_found("user credits"))
    }

    fn record(
        &mut self,
        user: UserId,
        transaction_type: TransactionType,
        amount: i64,
        purchase_id: Option<String>,
        operation_kind: Option<GenerationKind>,
        description: Option<String>,
    ) {
        self.transactions.push(CreditTransaction {
            id: Uuid::new_v4(),
            user_id: user,
            transaction_type,
            amount,
            purchase_id,
            operation_kind,
            description,
            created_at: Utc::now(),
        });
    }
}

#[async_trait]
impl UserStore for MemStore {
    async fn create_user(&self, new_user: &NewUser) -> Result<User> {
        let mut inner = self.inner.lock().await;
        if inner
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&new_user.email))
        {
            return Err(StoreError::Duplicate { field: "email".to_string() });
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email.clone(),
            password_hash: new_user.password_hash.clone(),
            display_name: new_user.display_name.clone(),
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        inner.credits.insert(
            user.id,
            CreditBalance {
                user_id: user.id,
                balance: 0,
                total_purchased: 0,
                total_used: 0,
                total_revoked: 0,
            },
        );
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<User> {
        let inner = self.inner.lock().await;
        inner.users.get(&id).cloned().ok_or_else(|| StoreError::not_found("user"))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<User> {
        let mut inner = self.inner.lock().await;
        if let Some(email) = &update.email {
            if inner
                .users
                .values()
                .any(|u| u.id != id && u.email.eq_ignore_ascii_case(email))
            {
                return Err(StoreError::Duplicate { field: "email".to_string() });
            }
        }
        let user = inner.users.get_mut(&id).ok_or_else(|| StoreError::not_found("user"))?;
        if let Some(email) = &update.email {
            user.email = email.clone();
        }
        if let Some(display_name) = &update.display_name {
            user.display_name = Some(display_name.clone());
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_avatar(&self, id: UserId, avatar_url: &str) -> Result<User> {
        let mut inner = self.inner.lock().await;
        let user = inner.users.get_mut(&id).ok_or_else(|| StoreError::not_found("user"))?;
        user.avatar_url = Some(avatar_url.to_string());
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_password(&self, id: UserId, password_hash: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let user = inner.users.get_mut(&id).ok_or_else(|| StoreError::not_found("user"))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CreditLedger for MemStore {
    async fn balance(&self, user: UserId) -> Result<CreditBalance> {
        let inner = self.inner.lock().await;
        inner
            .credits
            .get(&user)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user credits"))
    }

    async fn grant(&self, user: UserId, credits: i64, purchase: &PurchaseRef) -> Result<GrantOutcome> {
        let mut inner = self.inner.lock().await;
        if !inner.processed_purchases.insert(purchase.purchase_id.clone()) {
            return Ok(GrantOutcome::AlreadyProcessed);
        }

        let entry = inner.credits_mut(user)?;
        entry.balance += credits;
        entry.total_purchased += credits;
        let balance = entry.balance;

        inner.record(
            user,
            TransactionType::Purchase,
            credits,
            Some(purchase.purchase_id.clone()),
            None,
            Some(format!("Purchase of offer {}", purchase.offer_id)),
        );
        Ok(GrantOutcome::Applied { balance })
    }

    async fn debit(
        &self,
        user: UserId,
        cost: i64,
        kind: Option<GenerationKind>,
        reason: Option<&str>,
    ) -> Result<CreditBalance> {
        let mut inner = self.inner.lock().await;
        let entry = inner.credits_mut(user)?;
        if entry.balance < cost {
            return Err(StoreError::InsufficientCredits {
                requested: cost,
                available: entry.balance,
            });
        }
        entry.balance -= cost;
        entry.total_used += cost;
        let balance = entry.clone();

        inner.record(user, TransactionType::Usage, -cost, None, kind, reason.map(String::from));
        Ok(balance)
    }

    async fn revoke(&self, user: UserId, credits: i64, purchase_id: &str) -> Result<RevokeOutcome> {
        let mut inner = self.inner.lock().await;
        let entry = inner.credits_mut(user)?;
        let removed = credits.min(entry.balance);
        entry.balance -= removed;
        entry.total_revoked += removed;
        let balance = entry.balance;

        if removed > 0 {
            inner.record(
                user,
                TransactionType::Refund,
                -removed,
                Some(purchase_id.to_string()),
                None,
                Some(format!("Refund of purchase {purchase_id}")),
            );
        }
        Ok(RevokeOutcome { removed, balance })
    }

    async fn transactions(&self, user: UserId, skip: i64, limit: i64) -> Result<Vec<CreditTransaction>> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<CreditTransaction> = inner.transactions.iter().filter(|t| t.user_id == user).cloned().collect();
        rows.reverse(); // most recent first
        Ok(rows.into_iter().skip(skip.max(0) as usize).take(limit.max(0) as usize).collect())
    }
}
