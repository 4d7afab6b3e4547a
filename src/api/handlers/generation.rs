use crate::{
    api::models::generation::{AssetRequest, AssetResponse, ChatRequest, ChatResponse, PromptRequest, PromptResponse},
    auth::middleware::CurrentUser,
    billing::gate,
    errors::{Error, Result},
    types::GenerationKind,
    AppState,
};
use axum::{extract::State, response::Json};
use uuid::Uuid;

/// Chat with the assistant. Costs the chat credit price per message.
#[utoipa::path(
    post,
    path = "/chat",
    tag = "generation",
    summary = "Send a chat message",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply", body = ChatResponse),
        (status = 401, description = "Unauthorized"),
        (status = 402, description = "Insufficient credits"),
        (status = 502, description = "Generation backend failed"),
    ),
    security(("bearer" = []))
)]
pub async fn chat(State(state): State<AppState>, user: CurrentUser, Json(data): Json<ChatRequest>) -> Result<Json<ChatResponse>> {
    if data.message.trim().is_empty() {
        return Err(Error::bad_request("message must not be empty"));
    }

    let balance = gate::charge(state.ledger.as_ref(), &state.config.costs, user.id, GenerationKind::Chat).await?;

    let conversation_id = data.conversation_id.unwrap_or_else(Uuid::new_v4);
    let history = state.sessions.history(conversation_id).await;
    let reply = state.generator.chat(&history, &data.message).await?;
    state.sessions.append(conversation_id, &data.message, &reply).await;

    Ok(Json(ChatResponse {
        reply,
        conversation_id,
        credits_remaining: balance.balance,
    }))
}

/// Refine a prompt. Costs the prompt credit price.
#[utoipa::path(
    post,
    path = "/prompt",
    tag = "generation",
    summary = "Engineer a prompt",
    request_body = PromptRequest,
    responses(
        (status = 200, description = "Refined prompt", body = PromptResponse),
        (status = 401, description = "Unauthorized"),
        (status = 402, description = "Insufficient credits"),
        (status = 502, description = "Generation backend failed"),
    ),
    security(("bearer" = []))
)]
pub async fn prompt(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(data): Json<PromptRequest>,
) -> Result<Json<PromptResponse>> {
    if data.instruction.trim().is_empty() {
        return Err(Error::bad_request("instruction must not be empty"));
    }

    let balance = gate::charge(state.ledger.as_ref(), &state.config.costs, user.id, GenerationKind::Prompt).await?;
    let text = state.generator.prompt(&data.instruction).await?;

    Ok(Json(PromptResponse {
        text,
        credits_remaining: balance.balance,
    }))
}

/// Generate an image. Costs the image credit price.
#[utoipa::path(
    post,
    path = "/image",
    tag = "generation",
    summary = "Generate an image",
    request_body = AssetRequest,
    responses(
        (status = 200, description = "Generated image", body = AssetResponse),
        (status = 401, description = "Unauthorized"),
        (status = 402, description = "Insufficient credits"),
        (status = 502, description = "Generation backend failed"),
    ),
    security(("bearer" = []))
)]
pub async fn image(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(data): Json<AssetRequest>,
) -> Result<Json<AssetResponse>> {
    if data.prompt.trim().is_empty() {
        return Err(Error::bad_request("prompt must not be empty"));
    }

    let balance = gate::charge(state.ledger.as_ref(), &state.config.costs, user.id, GenerationKind::Image).await?;
    let asset = state.generator.image(&data.prompt).await?;

    Ok(Json(AssetResponse {
        url: asset.url,
        credits_remaining: balance.balance,
    }))
}

/// Generate a video. Costs the video credit price.
#[utoipa::path(
    post,
    path = "/video",
    tag = "generation",
    summary = "Generate a video",
    request_body = AssetRequest,
    responses(
        (status = 200, description = "Generated video", body = AssetResponse),
        (status = 401, description = "Unauthorized"),
        (status = 402, description = "Insufficient credits"),
        (status = 502, description = "Generation backend failed"),
    ),
    security(("bearer" = []))
)]
pub async fn video(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(data): Json<AssetRequest>,
) -> Result<Json<AssetResponse>> {
    if data.prompt.trim().is_empty() {
        return Err(Error::bad_request("prompt must not be empty"));
    }

    let balance = gate::charge(state.ledger.as_ref(), &state.config.costs, user.id, GenerationKind::Video).await?;
    let asset = state.generator.video(&data.prompt).await?;

    Ok(Json(AssetResponse {
        url: asset.url,
        credits_remaining: balance.balance,
    }))
}
