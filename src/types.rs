use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub type UserId = Uuid;

/// The billable generation operations. Each carries a fixed credit cost
/// looked up in [`crate::config::CreditCosts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    Chat,
    Prompt,
    Image,
    Video,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::Chat => "chat",
            GenerationKind::Prompt => "prompt",
            GenerationKind::Image => "image",
            GenerationKind::Video => "video",
        }
    }
}

impl std::fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction categories recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Purchase,
    Usage,
    Refund,
    Admin,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Usage => "usage",
            TransactionType::Refund => "refund",
            TransactionType::Admin => "admin",
        }
    }
}
