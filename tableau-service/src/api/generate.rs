//! Generation endpoint.

use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::api::AppState;
use crate::codec::encode_payload;
use crate::error::ServiceResult;
use crate::orchestrator::{GenerationRequest, GenerationResult};

/// Response for POST /generate
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    /// Generated image, base64
    pub img: String,
    /// Generated background music (WAV), base64
    pub bgm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_comment: Option<String>,
}

impl From<GenerationResult> for GenerateResponse {
    fn from(result: GenerationResult) -> Self {
        Self {
            img: encode_payload(&result.image),
            bgm: encode_payload(&result.audio),
            img_comment: result.caption,
        }
    }
}

/// POST /generate - image (+ optional voice) to image + background music
pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerationRequest>,
) -> ServiceResult<Json<GenerateResponse>> {
    let result = state.orchestrator.generate(request).await?;
    Ok(Json(result.into()))
}
