//! Webhook reconciliation engine.
//!
//! A purchase event passes an ordered sequence of hard gates: customer email
//! extraction, account lookup, offer resolution, status classification, and
//! finally the idempotent ledger apply. Failing any gate rejects the whole
//! event; a replayed purchase id or a held status is a success with no ledger
//! change. The engine never retries anything itself, the vendor's retries are
//! absorbed by idempotency.

use crate::{
    billing::{
        classify::{classify_status, PurchaseAction},
        offers::OfferTable,
    },
    errors::{Error, Result},
    storage::{CreditLedger, GrantOutcome, PurchaseRef, UserStore},
    types::UserId,
};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::{info, warn};

/// A vendor purchase event, normalized from the raw webhook payload.
#[derive(Debug, Clone)]
pub struct PurchaseEvent {
    pub purchase_id: String,
    pub email: Option<String>,
    pub status: String,
    pub offer_id: Option<String>,
    pub product_id: Option<String>,
    pub checkout_link: Option<String>,
    pub amount_paid: Option<Decimal>,
}

impl PurchaseEvent {
    /// Tolerant extraction from the vendor payload. The vendor has shipped
    /// several casing and nesting variants over time, so each field tries a
    /// list of known locations.
    pub fn from_vendor_json(payload: &Value) -> Result<Self> {
        let purchase_id = first_string(payload, &[&["purchase_id"], &["order_id"], &["id"]])
            .ok_or_else(|| Error::bad_request("payload has no purchase id"))?;

        let email = first_string(
            payload,
            &[&["Customer", "email"], &["customer", "email"], &["buyer_email"], &["email"]],
        );

        let status = first_string(payload, &[&["order_status"], &["status"]]).unwrap_or_else(|| "pending".to_string());

        let offer_id = first_string(payload, &[&["offer_id"], &["Product", "product_offer_id"]]);
        let product_id = first_string(payload, &[&["product_id"], &["Product", "product_id"]]);
        let checkout_link = first_string(payload, &[&["checkout_link"], &["CheckoutLink"]]);

        let amount_paid = first_value(payload, &[&["Commissions", "charge_amount"], &["value"]]).and_then(decimal_from);

        Ok(Self {
            purchase_id,
            email,
            status,
            offer_id,
            product_id,
            checkout_link,
            amount_paid,
        })
    }
}

fn lookup<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = payload;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

fn first_value<'a>(payload: &'a Value, paths: &[&[&str]]) -> Option<&'a Value> {
    paths.iter().find_map(|path| lookup(payload, path))
}

fn first_string(payload: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        lookup(payload, path)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    })
}

/// Monetary values arrive as numbers in cents-free decimal or as strings.
fn decimal_from(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// What reconciliation did, reported back to the vendor and the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOutcome {
    pub message: String,
    pub credits_added: i64,
    pub credits_removed: i64,
    pub user_id: UserId,
    pub offer_id: String,
    pub purchase_id: String,
}

pub async fn reconcile(
    users: &dyn UserStore,
    ledger: &dyn CreditLedger,
    offers: &OfferTable,
    event: &PurchaseEvent,
) -> Result<PurchaseOutcome> {
    let email = event
        .email
        .as_deref()
        .ok_or_else(|| Error::WebhookRejected {
            code: "user_not_found",
            message: "payload has no customer email".to_string(),
        })?;

    let user = users.get_user_by_email(email).await?.ok_or_else(|| {
        warn!(purchase_id = %event.purchase_id, email, "purchase for unknown account");
        Error::WebhookRejected {
            code: "user_not_found",
            message: format!("no account for {email}"),
        }
    })?;

    let offer = offers.resolve(event).ok_or_else(|| {
        warn!(purchase_id = %event.purchase_id, user_id = %user.id, "could not resolve offer");
        Error::WebhookRejected {
            code: "offer_unresolved",
            message: "purchase does not match any known offer".to_string(),
        }
    })?;

    let action = classify_status(&event.status);
    info!(
        purchase_id = %event.purchase_id,
        user_id = %user.id,
        offer_id = %offer.offer_id,
        status = %event.status,
        ?action,
        "reconciling purchase"
    );

    let outcome = match action {
        PurchaseAction::Grant => {
            let purchase = PurchaseRef {
                purchase_id: event.purchase_id.clone(),
                offer_id: offer.offer_id.clone(),
                amount_paid: event.amount_paid,
            };
            match ledger.grant(user.id, offer.credits, &purchase).await? {
                GrantOutcome::Applied { balance } => PurchaseOutcome {
                    message: format!("added {} credits, balance {balance}", offer.credits),
                    credits_added: offer.credits,
                    credits_removed: 0,
                    user_id: user.id,
                    offer_id: offer.offer_id,
                    purchase_id: event.purchase_id.clone(),
                },
                GrantOutcome::AlreadyProcessed => PurchaseOutcome {
                    message: "purchase already processed".to_string(),
                    credits_added: 0,
                    credits_removed: 0,
                    user_id: user.id,
                    offer_id: offer.offer_id,
                    purchase_id: event.purchase_id.clone(),
                },
            }
        }
        PurchaseAction::Revoke => {
            let revoked = ledger.revoke(user.id, offer.credits, &event.purchase_id).await?;
            PurchaseOutcome {
                message: format!("removed {} credits, balance {}", revoked.removed, revoked.balance),
                credits_added: 0,
                credits_removed: revoked.removed,
                user_id: user.id,
                offer_id: offer.offer_id,
                purchase_id: event.purchase_id.clone(),
            }
        }
        PurchaseAction::Hold => PurchaseOutcome {
            message: format!("status '{}' requires no action", event.status),
            credits_added: 0,
            credits_removed: 0,
            user_id: user.id,
            offer_id: offer.offer_id,
            purchase_id: event.purchase_id.clone(),
        },
    };

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config,
        storage::{memory::MemStore, NewUser},
    };
    use serde_json::json;

    async fn setup() -> (MemStore, OfferTable, UserId) {
        let store = MemStore::new();
        let user = store
            .create_user(&NewUser {
                email: "buyer@example.com".to_string(),
                password_hash: "hash".to_string(),
                display_name: None,
            })
            .await
            .expect("Failed to create user");
        let offers = OfferTable::new(config::Config::default().offers);
        (store, offers, user.id)
    }

    fn event(purchase_id: &str, offer_id: &str, status: &str) -> PurchaseEvent {
        PurchaseEvent {
            purchase_id: purchase_id.to_string(),
            email: Some("buyer@example.com".to_string()),
            status: status.to_string(),
            offer_id: Some(offer_id.to_string()),
            product_id: None,
            checkout_link: None,
            amount_paid: None,
        }
    }

    #[test_log::test(tokio::test)]
    async fn approved_purchase_grants_credits() {
        let (store, offers, user_id) = setup().await;

        let outcome = reconcile(&store, &store, &offers, &event("p1", "b25quAR", "approved"))
            .await
            .expect("Failed to reconcile");

        assert_eq!(outcome.credits_added, 100);
        assert_eq!(outcome.credits_removed, 0);
        assert_eq!(outcome.user_id, user_id);
        assert_eq!(outcome.offer_id, "b25quAR");

        let balance = store.balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.balance, 100);
    }

    #[test_log::test(tokio::test)]
    async fn replayed_purchase_is_a_no_op_success() {
        let (store, offers, user_id) = setup().await;
        let e = event("p1", "b25quAR", "approved");

        reconcile(&store, &store, &offers, &e).await.expect("Failed to reconcile");
        let replay = reconcile(&store, &store, &offers, &e).await.expect("Replay should succeed");

        assert_eq!(replay.credits_added, 0);
        let balance = store.balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.balance, 100);
    }

    #[test_log::test(tokio::test)]
    async fn refund_after_spending_clamps_at_zero() {
        let (store, offers, user_id) = setup().await;

        reconcile(&store, &store, &offers, &event("p1", "b25quAR", "approved"))
            .await
            .expect("Failed to reconcile grant");
        store
            .debit(user_id, 60, Some(crate::types::GenerationKind::Image), None)
            .await
            .expect("Failed to debit");

        let outcome = reconcile(&store, &store, &offers, &event("p1", "b25quAR", "refunded"))
            .await
            .expect("Failed to reconcile refund");

        assert_eq!(outcome.credits_removed, 40);
        let balance = store.balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.balance, 0);
        assert_eq!(balance.total_revoked, 40);
    }

    #[test_log::test(tokio::test)]
    async fn held_status_changes_nothing() {
        let (store, offers, user_id) = setup().await;

        let outcome = reconcile(&store, &store, &offers, &event("p1", "b25quAR", "waiting_payment"))
            .await
            .expect("Failed to reconcile");

        assert_eq!(outcome.credits_added, 0);
        assert_eq!(outcome.credits_removed, 0);
        let balance = store.balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.balance, 0);

        // A held purchase id is not consumed: the later approved event for
        // the same id still grants.
        let outcome = reconcile(&store, &store, &offers, &event("p1", "b25quAR", "approved"))
            .await
            .expect("Failed to reconcile");
        assert_eq!(outcome.credits_added, 100);
    }

    #[test_log::test(tokio::test)]
    async fn unknown_buyer_is_rejected() {
        let (store, offers, _) = setup().await;
        let mut e = event("p1", "b25quAR", "approved");
        e.email = Some("stranger@example.com".to_string());

        let err = reconcile(&store, &store, &offers, &e).await.expect_err("should reject");
        assert!(matches!(err, Error::WebhookRejected { code: "user_not_found", .. }));
    }

    #[test_log::test(tokio::test)]
    async fn missing_email_is_rejected() {
        let (store, offers, _) = setup().await;
        let mut e = event("p1", "b25quAR", "approved");
        e.email = None;

        let err = reconcile(&store, &store, &offers, &e).await.expect_err("should reject");
        assert!(matches!(err, Error::WebhookRejected { code: "user_not_found", .. }));
    }

    #[test_log::test(tokio::test)]
    async fn unresolved_offer_is_rejected_before_ledger() {
        let (store, offers, user_id) = setup().await;
        let e = event("p1", "not-an-offer", "approved");

        let err = reconcile(&store, &store, &offers, &e).await.expect_err("should reject");
        assert!(matches!(err, Error::WebhookRejected { code: "offer_unresolved", .. }));

        // Rejection happened before any ledger mutation, so the purchase id
        // is still fresh.
        let outcome = reconcile(&store, &store, &offers, &event("p1", "b25quAR", "approved"))
            .await
            .expect("Failed to reconcile");
        assert_eq!(outcome.credits_added, 100);
        let balance = store.balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.balance, 100);
    }

    #[test]
    fn vendor_payload_field_fallbacks() {
        let payload = json!({
            "order_id": "ord-1",
            "order_status": "approved",
            "Customer": { "email": "buyer@example.com" },
            "Product": { "product_offer_id": "b25quAR" },
            "Commissions": { "charge_amount": "49.90" }
        });
        let event = PurchaseEvent::from_vendor_json(&payload).expect("Failed to parse");
        assert_eq!(event.purchase_id, "ord-1");
        assert_eq!(event.status, "approved");
        assert_eq!(event.email.as_deref(), Some("buyer@example.com"));
        assert_eq!(event.offer_id.as_deref(), Some("b25quAR"));
        assert_eq!(event.amount_paid, Some(Decimal::from_str("49.90").unwrap()));
    }

    #[test]
    fn vendor_payload_flat_variant() {
        let payload = json!({
            "id": "ord-2",
            "buyer_email": "buyer@example.com",
            "checkout_link": "https://pay.example.com/zbugEDV",
            "value": 199.9
        });
        let event = PurchaseEvent::from_vendor_json(&payload).expect("Failed to parse");
        assert_eq!(event.purchase_id, "ord-2");
        // Missing status defaults to pending, which classifies as Hold
        assert_eq!(event.status, "pending");
        assert_eq!(event.checkout_link.as_deref(), Some("https://pay.example.com/zbugEDV"));
    }

    #[test]
    fn payload_without_purchase_id_is_an_error() {
        let payload = json!({ "status": "approved" });
        assert!(PurchaseEvent::from_vendor_json(&payload).is_err());
    }
}
