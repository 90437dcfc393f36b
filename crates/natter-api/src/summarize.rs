use axum::{Extension, Json, extract::State};
use tracing::warn;

use natter_types::api::{Claims, SummarizeRequest, SummarizeResponse};

use crate::auth::AppState;
use crate::error::ApiError;

/// POST /api/summarize
///
/// Uses the assistant when one is configured and falls back to the
/// extractive summary if it fails.
pub async fn summarize(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<SummarizeRequest>,
) -> Result<Json<SummarizeResponse>, ApiError> {
    let text = req.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("Text is required".into()));
    }

    if let Some(assistant) = &state.assistant {
        match assistant.ask(&format!("Summarize this: {}", text)).await {
            Ok(summary) => return Ok(Json(SummarizeResponse { summary })),
            Err(e) => warn!("Assistant summary failed, using extractive summary: {}", e),
        }
    }

    let summary = extractive_summary(text)
        .ok_or_else(|| ApiError::BadRequest("No valid sentences found".into()))?;
    Ok(Json(SummarizeResponse { summary }))
}

/// Picks the first, middle and last sentence of longer texts; shorter ones
/// are returned whole, one sentence per period.
pub fn extractive_summary(text: &str) -> Option<String> {
    let sentences: Vec<&str> = text
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    match sentences.len() {
        0 => None,
        n if n > 3 => Some(format!(
            "{}. {}. {}.",
            sentences[0],
            sentences[n / 2],
            sentences[n - 1]
        )),
        _ => Some(format!("{}.", sentences.join(". "))),
    }
}
