use crate::{
    storage::CreditTransaction,
    types::{GenerationKind, TransactionType},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub credits: i64,
    pub total_purchased: i64,
    pub total_used: i64,
    pub total_revoked: i64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UseCreditsRequest {
    /// Credits to deduct (must be positive)
    pub amount: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UseCreditsResponse {
    pub credits_remaining: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    pub transaction_type: TransactionType,
    /// Signed: positive for purchases, negative for usage and refunds
    pub amount: i64,
    pub purchase_id: Option<String>,
    pub operation_kind: Option<GenerationKind>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CreditTransaction> for TransactionResponse {
    fn from(tx: CreditTransaction) -> Self {
        Self {
            id: tx.id,
            transaction_type: tx.transaction_type,
            amount: tx.amount,
            purchase_id: tx.purchase_id,
            operation_kind: tx.operation_kind,
            description: tx.description,
            created_at: tx.created_at,
        }
    }
}

/// Query parameters for listing transactions
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListTransactionsQuery {
    /// Number of items to skip
    pub skip: Option<i64>,
    /// Maximum number of items to return
    pub limit: Option<i64>,
}
