use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::api;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "bearer".to_string(),
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    servers(
        (url = "/api", description = "API server")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::auth::check_access,
        api::handlers::auth::update_profile,
        api::handlers::auth::update_avatar,
        api::handlers::auth::change_password,
        api::handlers::webhooks::purchase,
        api::handlers::credits::balance,
        api::handlers::credits::use_credits,
        api::handlers::credits::list_transactions,
        api::handlers::generation::chat,
        api::handlers::generation::prompt,
        api::handlers::generation::image,
        api::handlers::generation::video,
    ),
    components(
        schemas(
            api::models::auth::RegisterRequest,
            api::models::auth::LoginRequest,
            api::models::auth::AuthResponse,
            api::models::auth::UserProfile,
            api::models::auth::CheckAccessResponse,
            api::models::auth::UpdateProfileRequest,
            api::models::auth::UpdateAvatarRequest,
            api::models::auth::ChangePasswordRequest,
            api::models::credits::BalanceResponse,
            api::models::credits::UseCreditsRequest,
            api::models::credits::UseCreditsResponse,
            api::models::credits::TransactionResponse,
            api::models::webhooks::WebhookResponse,
            api::models::generation::ChatRequest,
            api::models::generation::ChatResponse,
            api::models::generation::PromptRequest,
            api::models::generation::PromptResponse,
            api::models::generation::AssetRequest,
            api::models::generation::AssetResponse,
            crate::types::GenerationKind,
            crate::types::TransactionType,
        )
    ),
    tags(
        (name = "auth", description = "Account registration and authentication"),
        (name = "webhooks", description = "Payment vendor webhooks"),
        (name = "credits", description = "Credit balance and audit trail"),
        (name = "generation", description = "Credit-gated generation endpoints"),
    ),
    info(
        title = "aigate API",
        version = "0.3.0",
        description = "Credit-gated AI generation backend with payment-webhook reconciliation",
    ),
)]
pub struct ApiDoc;
