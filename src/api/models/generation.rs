use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    /// Omit to start a new conversation
    #[schema(value_type = Option<String>, format = "uuid")]
    pub conversation_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    #[schema(value_type = String, format = "uuid")]
    pub conversation_id: Uuid,
    pub credits_remaining: i64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PromptRequest {
    pub instruction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub text: String,
    pub credits_remaining: i64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AssetRequest {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssetResponse {
    pub url: String,
    pub credits_remaining: i64,
}
