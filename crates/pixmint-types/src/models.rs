use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A ledger entry. Balance never drops below zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub tokens: i64,
    pub created_at: DateTime<Utc>,
}

/// A generated image. Written once, together with the one-token debit that paid for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prompt: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}
