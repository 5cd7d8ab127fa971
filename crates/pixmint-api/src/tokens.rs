use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use pixmint_types::api::{BalanceResponse, CreateUserResponse, TokenAction, TokenRequest};
use pixmint_types::models::User;

use crate::error::TokenError;
use crate::rows::user_from_row;
use crate::state::{AppState, with_db};

// -- Token service --

/// Insert a new user holding the configured starting balance.
pub async fn create_user(state: &AppState) -> anyhow::Result<User> {
    let id = Uuid::new_v4().to_string();
    let row = with_db(state, move |db| db.create_user(&id)).await?;
    let user = user_from_row(row);
    info!("Created user {} with {} tokens", user.id, user.tokens);
    Ok(user)
}

/// Current balance, or `None` for an unknown user.
pub async fn get_balance(state: &AppState, user_id: &str) -> anyhow::Result<Option<i64>> {
    let id = user_id.to_string();
    let row = with_db(state, move |db| db.get_user(&id)).await?;
    Ok(row.map(|r| r.tokens))
}

/// Add `amount` to the balance and return the new one, or `None` for an unknown user.
pub async fn credit(state: &AppState, user_id: &str, amount: i64) -> anyhow::Result<Option<i64>> {
    let id = user_id.to_string();
    let tokens = with_db(state, move |db| db.credit_tokens(&id, amount)).await?;
    if let Some(tokens) = tokens {
        debug!("Credited {} to user {}, balance now {}", amount, user_id, tokens);
    }
    Ok(tokens)
}

// -- Handler --

/// POST /api/tokens — create, read or credit a balance depending on `action`.
///
/// Unknown, missing or non-string actions and unknown users answer `null`.
pub async fn handle_tokens(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, TokenError> {
    let Json(body) = payload.map_err(|e| {
        debug!("Rejected token request body: {}", e);
        TokenError::InvalidRequest
    })?;

    let Some(action) = body.get("action").and_then(Value::as_str).and_then(TokenAction::parse)
    else {
        debug!("Unknown token action {:?}", body.get("action"));
        return Ok(null_response());
    };

    let req: TokenRequest = serde_json::from_value(body).map_err(|e| {
        debug!("Malformed token request: {}", e);
        TokenError::InvalidRequest
    })?;

    match action {
        TokenAction::Create => {
            let user = create_user(&state).await.map_err(TokenError::Store)?;
            Ok((
                StatusCode::CREATED,
                Json(CreateUserResponse {
                    user_id: user.id,
                    tokens: user.tokens,
                }),
            )
                .into_response())
        }
        TokenAction::Get => {
            let Some(user_id) = non_empty(req.user_id) else {
                return Ok(null_response());
            };
            let tokens = get_balance(&state, &user_id).await.map_err(TokenError::Store)?;
            Ok(balance_response(tokens))
        }
        TokenAction::Update => {
            let amount = req.amount.ok_or(TokenError::InvalidRequest)?;
            let Some(user_id) = non_empty(req.user_id) else {
                return Ok(null_response());
            };
            let tokens = credit(&state, &user_id, amount).await.map_err(TokenError::Store)?;
            Ok(balance_response(tokens))
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn balance_response(tokens: Option<i64>) -> Response {
    Json(tokens.map(|tokens| BalanceResponse { tokens })).into_response()
}

fn null_response() -> Response {
    Json(Value::Null).into_response()
}
