use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Tokens --

/// Body of `POST /api/tokens`.
///
/// `action` stays a free-form string: an unknown action is answered with `null`
/// rather than rejected at deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    pub action: String,
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenAction {
    Create,
    Get,
    Update,
}

impl TokenAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "create" => Some(Self::Create),
            "get" => Some(Self::Get),
            "update" => Some(Self::Update),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserResponse {
    pub user_id: Uuid,
    pub tokens: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub tokens: i64,
}

// -- Image generation --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    pub image_url: String,
    pub remaining_tokens: i64,
    pub success: bool,
}

/// Every failure on the public endpoints is reported as a bare category string.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// -- Image history --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub id: Uuid,
    pub prompt: String,
    pub image_url: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
