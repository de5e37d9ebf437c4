use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::extract::{Form, FromRequest, Request, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::generate::orchestrator::{GenerationRequest, Outcome};
use crate::server::AppState;
use crate::server::error::ApiError;

#[derive(Debug, Default, Deserialize)]
struct RawGenerateInput {
    prompt: Option<String>,
    seed: Option<u64>,
    timeout_s: Option<f64>,
}

/// Generation request body, accepted as JSON or as an urlencoded form.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerateInput {
    /// Trimmed, non-empty prompt.
    pub prompt: String,
    pub seed: Option<u64>,
    /// Backend timeout override.
    pub timeout: Option<Duration>,
}

impl GenerateInput {
    fn from_raw(raw: RawGenerateInput) -> Result<Self, ApiError> {
        let prompt = raw
            .prompt
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ApiError::BadRequest("prompt is required".to_owned()))?;
        let timeout = raw.timeout_s.map(parse_timeout).transpose()?;
        Ok(Self {
            prompt,
            seed: raw.seed,
            timeout,
        })
    }

    pub fn into_request(self) -> GenerationRequest {
        GenerationRequest {
            prompt: self.prompt,
            seed: self.seed,
            timeout: self.timeout,
        }
    }
}

fn parse_timeout(secs: f64) -> Result<Duration, ApiError> {
    if !(secs.is_finite() && secs > 0.0) {
        return Err(ApiError::BadRequest(format!(
            "timeout_s must be positive, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ApiError::BadRequest(format!("timeout_s {secs} is out of range: {e}")))
}

impl<S: Send + Sync> FromRequest<S> for GenerateInput {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let raw = if content_type.starts_with("application/json") {
            let Json(raw) = Json::<RawGenerateInput>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            raw
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(raw) = Form::<RawGenerateInput>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            raw
        } else {
            return Err(ApiError::BadRequest(format!(
                "unsupported content type '{content_type}'"
            )));
        };
        Self::from_raw(raw)
    }
}

pub async fn generate(
    State(state): State<AppState>,
    input: GenerateInput,
) -> Result<Response, ApiError> {
    match state.orchestrator.generate_still(input.into_request()).await? {
        Outcome::Delivered(zip) => Ok((
            [
                (CONTENT_TYPE, "application/zip"),
                (CONTENT_DISPOSITION, "attachment; filename=\"scene.zip\""),
            ],
            zip,
        )
            .into_response()),
        Outcome::Rejected(_) => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

pub async fn generate_video(
    State(state): State<AppState>,
    input: GenerateInput,
) -> Result<Response, ApiError> {
    match state.orchestrator.generate_video(input.into_request()).await? {
        Outcome::Delivered(stream) => Ok((
            [
                (CONTENT_TYPE, "video/mp4"),
                (CONTENT_DISPOSITION, "attachment; filename=\"orbit.mp4\""),
            ],
            Body::from_stream(stream),
        )
            .into_response()),
        Outcome::Rejected(_) => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub device: String,
    pub model_variant: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_owned(),
        device: state.orchestrator.device().to_owned(),
        model_variant: state.orchestrator.model_variant().to_owned(),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/server/handlers.rs"]
mod tests;
