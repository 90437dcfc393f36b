use axum::{Extension, Json, extract::State};

use natter_types::api::Claims;
use natter_types::models::User;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// GET /api/users: everyone the caller can message, assistant first.
/// The assistant account is created on the first call.
pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<User>>, ApiError> {
    let me = claims.sub;
    let users = blocking(&state.db, move |db| {
        db.ensure_bot_user()?;
        db.list_users_except(me)
    })
    .await?;

    Ok(Json(users))
}
