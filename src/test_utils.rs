use crate::{
    billing::offers::OfferTable,
    config::Config,
    generation::{sessions::ChatSessions, ChatTurn, GeneratedAsset, GenerationBackend, GenerationError},
    storage::{memory::MemStore, CreditBalance, CreditLedger, PurchaseRef, UserStore},
    types::{GenerationKind, UserId},
    AppState,
};
use async_trait::async_trait;
use axum_test::TestServer;
use std::sync::Arc;
use uuid::Uuid;

/// Deterministic generation backend: replies encode their inputs so tests can
/// assert that history and prompts were threaded through.
pub struct StubGenerator;

#[async_trait]
impl GenerationBackend for StubGenerator {
    async fn chat(&self, history: &[ChatTurn], message: &str) -> Result<String, GenerationError> {
        Ok(format!("reply to '{message}' ({} prior turns)", history.len()))
    }

    async fn prompt(&self, instruction: &str) -> Result<String, GenerationError> {
        Ok(format!("refined: {instruction}"))
    }

    async fn image(&self, _prompt: &str) -> Result<GeneratedAsset, GenerationError> {
        Ok(GeneratedAsset {
            url: format!("https://assets.test/image/{}", Uuid::new_v4()),
        })
    }

    async fn video(&self, _prompt: &str) -> Result<GeneratedAsset, GenerationError> {
        Ok(GeneratedAsset {
            url: format!("https://assets.test/video/{}", Uuid::new_v4()),
        })
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<MemStore>,
}

impl TestApp {
    pub async fn balance(&self, user: UserId) -> CreditBalance {
        self.store.balance(user).await.expect("Failed to get balance")
    }

    pub async fn debit(&self, user: UserId, amount: i64) {
        self.store
            .debit(user, amount, Some(GenerationKind::Image), None)
            .await
            .expect("Failed to debit");
    }
}

pub fn create_test_config() -> Config {
    Config {
        jwt_secret: "test-secret-key-for-testing-only".to_string(),
        webhook_secret: None,
        ..Config::default()
    }
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with_config(create_test_config()).await
}

pub async fn create_test_app_with_secret(webhook_secret: &str) -> TestApp {
    let mut config = create_test_config();
    config.webhook_secret = Some(webhook_secret.to_string());
    create_test_app_with_config(config).await
}

pub async fn create_test_app_with_config(config: Config) -> TestApp {
    let store = Arc::new(MemStore::new());
    let state = AppState::builder()
        .users(store.clone() as Arc<dyn UserStore>)
        .ledger(store.clone() as Arc<dyn CreditLedger>)
        .generator(Arc::new(StubGenerator))
        .sessions(Arc::new(ChatSessions::new(config.session_ttl)))
        .offers(OfferTable::new(config.offers.clone()))
        .config(config)
        .build();

    let router = crate::build_router(state);
    let server = TestServer::new(router).expect("Failed to create test server");
    TestApp { server, store }
}

pub struct Session {
    pub token: String,
    pub user_id: UserId,
}

pub async fn register_user(server: &TestServer, email: &str, password: &str) -> Session {
    let response = server
        .post("/api/auth/register")
        .json(&serde_json::json!({ "email": email, "password": password }))
        .await;
    assert_eq!(response.status_code().as_u16(), 201, "registration failed: {}", response.text());
    let body: serde_json::Value = response.json();
    Session {
        token: body["token"].as_str().expect("token in response").to_string(),
        user_id: body["user"]["id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .expect("user id in response"),
    }
}

/// Grant credits directly through the ledger, bypassing the webhook.
pub async fn fund_user(app: &TestApp, user: UserId, credits: i64) {
    app.store
        .grant(
            user,
            credits,
            &PurchaseRef {
                purchase_id: format!("test-{}", Uuid::new_v4()),
                offer_id: "test-offer".to_string(),
                amount_paid: None,
            },
        )
        .await
        .expect("Failed to fund user");
}
