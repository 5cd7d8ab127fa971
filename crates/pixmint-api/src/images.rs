use std::fmt;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pixmint_db::DebitOutcome;
use pixmint_types::api::{GenerateImageRequest, GenerateImageResponse, ImageSummary};

use crate::error::GenerateError;
use crate::provider::ProviderRequest;
use crate::rows::image_from_row;
use crate::state::{AppState, with_db};

/// Progress of a single generation request. Any stage may end in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    BalanceChecking,
    Generating,
    Committing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::BalanceChecking => "balance-checking",
            Self::Generating => "generating",
            Self::Committing => "committing",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOutcome {
    pub image_id: Uuid,
    pub image_url: String,
    pub remaining_tokens: i64,
}

/// Spend one token on an image for `prompt`.
///
/// The provider is only called once the user is known to hold a token. The
/// debit and the image row are written in one transaction, and the balance is
/// checked again there, so a request that loses a race for the last token
/// fails with `InsufficientTokens` and the generated image is discarded.
pub async fn generate(
    state: &AppState,
    user_id: Option<&str>,
    prompt: Option<&str>,
) -> Result<GenerateOutcome, GenerateError> {
    let mut stage = Stage::Validating;

    // Ids are looked up verbatim, same as on the token endpoint
    let user_id = user_id.filter(|s| !s.trim().is_empty());
    let prompt = prompt.filter(|p| !p.trim().is_empty());
    let (Some(user_id), Some(prompt)) = (user_id, prompt) else {
        debug!(%stage, "Rejected generation request with missing parameters");
        return Err(GenerateError::InvalidRequest);
    };

    stage = Stage::BalanceChecking;
    debug!(%stage, user_id, "Checking balance");
    let balance = {
        let id = user_id.to_string();
        with_db(state, move |db| db.get_user(&id))
            .await
            .map_err(|e| fail(stage, e))?
            .map(|row| row.tokens)
    };
    if balance.unwrap_or(0) < 1 {
        debug!(%stage, user_id, ?balance, "Not enough tokens");
        return Err(GenerateError::InsufficientTokens);
    }

    stage = Stage::Generating;
    debug!(%stage, user_id, "Calling image provider");
    let request = ProviderRequest::for_prompt(prompt);
    let image_url = state.provider.generate(&request).await.map_err(|e| {
        error!(%stage, user_id, "Image generation error: {}", e);
        GenerateError::from(e)
    })?;

    stage = Stage::Committing;
    debug!(%stage, user_id, "Recording image");
    let image_id = Uuid::new_v4();
    let outcome = {
        let iid = image_id.to_string();
        let uid = user_id.to_string();
        let p = prompt.to_string();
        let url = image_url.clone();
        with_db(state, move |db| db.debit_and_record(&iid, &uid, &p, &url))
            .await
            .map_err(|e| fail(stage, e))?
    };

    let remaining_tokens = match outcome {
        DebitOutcome::Committed { remaining_tokens } => remaining_tokens,
        DebitOutcome::Insufficient => {
            warn!(%stage, user_id, "Balance spent by a concurrent request, discarding image");
            return Err(GenerateError::InsufficientTokens);
        }
    };

    stage = Stage::Done;
    info!(%stage, user_id, %image_id, remaining_tokens, "Image generated");

    Ok(GenerateOutcome {
        image_id,
        image_url,
        remaining_tokens,
    })
}

fn fail(stage: Stage, err: anyhow::Error) -> GenerateError {
    error!(%stage, "Image generation error: {:#}", err);
    GenerateError::ProcessingFailed
}

// -- Handlers --

/// POST /api/generate-image
pub async fn generate_image(
    State(state): State<AppState>,
    payload: Result<Json<GenerateImageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, GenerateError> {
    let Json(req) = payload.map_err(|e| {
        debug!("Rejected generation request body: {}", e);
        GenerateError::InvalidRequest
    })?;
    let outcome = generate(&state, req.user_id.as_deref(), req.prompt.as_deref()).await?;

    Ok(Json(GenerateImageResponse {
        image_url: outcome.image_url,
        remaining_tokens: outcome.remaining_tokens,
        success: true,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// GET /api/users/{user_id}/images — newest first.
pub async fn list_images(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ImageQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let limit = query.limit.min(100);

    let rows = with_db(&state, move |db| {
        if db.get_user(&user_id)?.is_none() {
            return Ok(None);
        }
        db.list_images(&user_id, limit).map(Some)
    })
    .await
    .map_err(|e| {
        error!("list_images error: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .ok_or(StatusCode::NOT_FOUND)?;

    let images: Vec<ImageSummary> = rows
        .into_iter()
        .map(image_from_row)
        .map(|img| ImageSummary {
            id: img.id,
            prompt: img.prompt,
            image_url: img.image_url,
            created_at: img.created_at,
        })
        .collect();

    Ok(Json(images))
}
