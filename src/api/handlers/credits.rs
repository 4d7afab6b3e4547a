use crate::{
    api::models::credits::{
        BalanceResponse, ListTransactionsQuery, TransactionResponse, UseCreditsRequest, UseCreditsResponse,
    },
    auth::middleware::CurrentUser,
    errors::{Error, Result},
    AppState,
};
use axum::{
    extract::{Query, State},
    response::Json,
};

/// Current credit balance
#[utoipa::path(
    get,
    path = "/credits/balance",
    tag = "credits",
    summary = "Get credit balance",
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = []))
)]
pub async fn balance(State(state): State<AppState>, user: CurrentUser) -> Result<Json<BalanceResponse>> {
    let balance = state.ledger.balance(user.id).await?;
    Ok(Json(BalanceResponse {
        credits: balance.balance,
        total_purchased: balance.total_purchased,
        total_used: balance.total_used,
        total_revoked: balance.total_revoked,
    }))
}

/// Deduct credits for an arbitrary reason
#[utoipa::path(
    post,
    path = "/credits/use",
    tag = "credits",
    summary = "Use credits",
    request_body = UseCreditsRequest,
    responses(
        (status = 200, description = "Credits deducted", body = UseCreditsResponse),
        (status = 400, description = "Amount must be positive"),
        (status = 401, description = "Unauthorized"),
        (status = 402, description = "Insufficient credits"),
    ),
    security(("bearer" = []))
)]
pub async fn use_credits(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(data): Json<UseCreditsRequest>,
) -> Result<Json<UseCreditsResponse>> {
    if data.amount <= 0 {
        return Err(Error::bad_request("amount must be greater than zero"));
    }
    let balance = state.ledger.debit(user.id, data.amount, None, data.reason.as_deref()).await?;
    Ok(Json(UseCreditsResponse {
        credits_remaining: balance.balance,
    }))
}

/// The user's own audit trail, most recent first
#[utoipa::path(
    get,
    path = "/credits/transactions",
    tag = "credits",
    summary = "List credit transactions",
    params(ListTransactionsQuery),
    responses(
        (status = 200, description = "Transactions", body = [TransactionResponse]),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = []))
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<Vec<TransactionResponse>>> {
    let skip = query.skip.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let transactions = state.ledger.transactions(user.id, skip, limit).await?;
    Ok(Json(transactions.into_iter().map(TransactionResponse::from).collect()))
}
