use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use thiserror::Error;
use tracing::error;

use pixmint_types::api::ErrorResponse;

/// Failure categories of an image generation request.
///
/// The `Display` text is exactly what the client sees. Details of the
/// underlying failure are logged where they happen and never leave the server.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GenerateError {
    #[error("Missing required parameters")]
    InvalidRequest,
    #[error("Insufficient tokens")]
    InsufficientTokens,
    #[error("Failed to generate image")]
    GenerationFailed,
    #[error("Failed to process request")]
    ProcessingFailed,
}

impl GenerateError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::InsufficientTokens => StatusCode::PAYMENT_REQUIRED,
            Self::GenerationFailed => StatusCode::BAD_GATEWAY,
            Self::ProcessingFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GenerateError {
    fn into_response(self) -> Response {
        let body = ErrorResponse { error: self.to_string() };
        (self.status(), Json(body)).into_response()
    }
}

/// Errors from the external image provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned HTTP {status}")]
    Status { status: u16 },
    #[error("provider response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("provider response contained no image")]
    NoImage,
}

impl From<ProviderError> for GenerateError {
    fn from(err: ProviderError) -> Self {
        match err {
            // The provider answered, but not with a usable image
            ProviderError::Status { .. } | ProviderError::Decode(_) | ProviderError::NoImage => {
                Self::GenerationFailed
            }
            ProviderError::Transport(_) => Self::ProcessingFailed,
        }
    }
}

/// Errors from the token endpoint.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Body is not a usable token request, or `update` came without an amount.
    #[error("Missing required parameters")]
    InvalidRequest,
    #[error("Failed to process request")]
    Store(anyhow::Error),
}

impl IntoResponse for TokenError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::Store(e) => {
                error!("Token store error: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_are_fixed_strings() {
        assert_eq!(GenerateError::InvalidRequest.to_string(), "Missing required parameters");
        assert_eq!(GenerateError::InsufficientTokens.to_string(), "Insufficient tokens");
        assert_eq!(GenerateError::GenerationFailed.to_string(), "Failed to generate image");
        assert_eq!(GenerateError::ProcessingFailed.to_string(), "Failed to process request");
    }

    #[test]
    fn provider_errors_map_to_categories() {
        assert_eq!(GenerateError::from(ProviderError::NoImage), GenerateError::GenerationFailed);
        assert_eq!(
            GenerateError::from(ProviderError::Status { status: 500 }),
            GenerateError::GenerationFailed
        );
        let decode = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        assert_eq!(GenerateError::from(ProviderError::Decode(decode)), GenerateError::GenerationFailed);
    }
}
