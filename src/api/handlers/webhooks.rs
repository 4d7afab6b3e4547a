use crate::{
    api::models::webhooks::WebhookResponse,
    billing::{signature, webhook},
    errors::{Error, Result},
    AppState,
};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
};

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Vendor purchase webhook. Body is taken raw so the signature covers the
/// exact bytes the vendor signed, before any JSON normalization.
#[utoipa::path(
    post,
    path = "/webhook/purchase",
    tag = "webhooks",
    summary = "Vendor purchase webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event processed (including replays and holds)", body = WebhookResponse),
        (status = 400, description = "Rejected: unknown buyer, unresolved offer, or malformed payload"),
        (status = 401, description = "Missing or invalid signature"),
        (status = 500, description = "Storage failure"),
    )
)]
pub async fn purchase(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<WebhookResponse>> {
    if let Some(secret) = &state.config.webhook_secret {
        let signature_header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::unauthorized("missing webhook signature"))?;
        signature::verify(secret, &body, signature_header).map_err(|e| Error::unauthorized(e.to_string()))?;
    }

    let payload: serde_json::Value =
        serde_json::from_slice(&body).map_err(|_| Error::bad_request("payload is not valid JSON"))?;
    let event = webhook::PurchaseEvent::from_vendor_json(&payload)?;

    let outcome = webhook::reconcile(state.users.as_ref(), state.ledger.as_ref(), &state.offers, &event).await?;

    Ok(Json(WebhookResponse {
        success: true,
        message: outcome.message,
        credits_added: outcome.credits_added,
        credits_removed: outcome.credits_removed,
    }))
}

#[cfg(test)]
mod tests {
    use crate::{billing::signature, test_utils::*};
    use serde_json::json;

    fn purchase_payload(purchase_id: &str, email: &str, offer: &str, status: &str) -> String {
        json!({
            "order_id": purchase_id,
            "order_status": status,
            "Customer": { "email": email },
            "Product": { "product_offer_id": offer }
        })
        .to_string()
    }

    #[test_log::test(tokio::test)]
    async fn signed_purchase_grants_and_replay_is_noop() {
        let app = create_test_app_with_secret("hook-secret").await;
        let session = register_user(&app.server, "buyer@example.com", "secret1").await;

        let body = purchase_payload("p1", "buyer@example.com", "b25quAR", "approved");
        let sig = signature::sign("hook-secret", body.as_bytes());

        let response = app
            .server
            .post("/api/webhook/purchase")
            .add_header("x-webhook-signature", &sig)
            .content_type("application/json")
            .text(body.clone())
            .await;
        assert_eq!(response.status_code().as_u16(), 200);
        let parsed: serde_json::Value = response.json();
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["creditsAdded"], 100);

        // Vendor retry with the identical body
        let response = app
            .server
            .post("/api/webhook/purchase")
            .add_header("x-webhook-signature", &sig)
            .content_type("application/json")
            .text(body)
            .await;
        assert_eq!(response.status_code().as_u16(), 200);
        let parsed: serde_json::Value = response.json();
        assert_eq!(parsed["creditsAdded"], 0);

        let balance = app.balance(session.user_id).await;
        assert_eq!(balance.balance, 100);
    }

    #[test_log::test(tokio::test)]
    async fn bad_signature_is_unauthorized() {
        let app = create_test_app_with_secret("hook-secret").await;
        register_user(&app.server, "buyer@example.com", "secret1").await;

        let body = purchase_payload("p1", "buyer@example.com", "b25quAR", "approved");

        let response = app
            .server
            .post("/api/webhook/purchase")
            .add_header("x-webhook-signature", signature::sign("wrong-secret", body.as_bytes()))
            .content_type("application/json")
            .text(body.clone())
            .await;
        assert_eq!(response.status_code().as_u16(), 401);

        let response = app.server.post("/api/webhook/purchase").content_type("application/json").text(body).await;
        assert_eq!(response.status_code().as_u16(), 401);
    }

    #[test_log::test(tokio::test)]
    async fn unknown_buyer_is_rejected() {
        let app = create_test_app().await;

        let response = app
            .server
            .post("/api/webhook/purchase")
            .content_type("application/json")
            .text(purchase_payload("p1", "stranger@example.com", "b25quAR", "approved"))
            .await;
        assert_eq!(response.status_code().as_u16(), 400);
        let parsed: serde_json::Value = response.json();
        assert_eq!(parsed["error"], "user_not_found");
    }

    #[test_log::test(tokio::test)]
    async fn unresolved_offer_is_rejected() {
        let app = create_test_app().await;
        register_user(&app.server, "buyer@example.com", "secret1").await;

        let response = app
            .server
            .post("/api/webhook/purchase")
            .content_type("application/json")
            .text(purchase_payload("p1", "buyer@example.com", "mystery", "approved"))
            .await;
        assert_eq!(response.status_code().as_u16(), 400);
        let parsed: serde_json::Value = response.json();
        assert_eq!(parsed["error"], "offer_unresolved");
    }

    #[test_log::test(tokio::test)]
    async fn refund_removes_clamped_credits() {
        let app = create_test_app().await;
        let session = register_user(&app.server, "buyer@example.com", "secret1").await;

        app.server
            .post("/api/webhook/purchase")
            .content_type("application/json")
            .text(purchase_payload("p1", "buyer@example.com", "b25quAR", "approved"))
            .await;
        app.debit(session.user_id, 60).await;

        let response = app
            .server
            .post("/api/webhook/purchase")
            .content_type("application/json")
            .text(purchase_payload("p1", "buyer@example.com", "b25quAR", "refunded"))
            .await;
        assert_eq!(response.status_code().as_u16(), 200);
        let parsed: serde_json::Value = response.json();
        assert_eq!(parsed["creditsRemoved"], 40);

        let balance = app.balance(session.user_id).await;
        assert_eq!(balance.balance, 0);
        assert_eq!(balance.total_revoked, 40);
    }

    #[test_log::test(tokio::test)]
    async fn pending_status_is_held() {
        let app = create_test_app().await;
        let session = register_user(&app.server, "buyer@example.com", "secret1").await;

        let response = app
            .server
            .post("/api/webhook/purchase")
            .content_type("application/json")
            .text(purchase_payload("p1", "buyer@example.com", "b25quAR", "waiting_payment"))
            .await;
        assert_eq!(response.status_code().as_u16(), 200);
        let parsed: serde_json::Value = response.json();
        assert_eq!(parsed["creditsAdded"], 0);
        assert_eq!(parsed["creditsRemoved"], 0);

        assert_eq!(app.balance(session.user_id).await.balance, 0);
    }

    #[test_log::test(tokio::test)]
    async fn malformed_json_is_bad_request() {
        let app = create_test_app().await;
        let response = app
            .server
            .post("/api/webhook/purchase")
            .content_type("application/json")
            .text("{not json")
            .await;
        assert_eq!(response.status_code().as_u16(), 400);
    }
}
