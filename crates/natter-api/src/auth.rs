use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};
use uuid::Uuid;

use natter_db::Database;
use natter_gateway::Dispatcher;
use natter_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use natter_types::models::BOT_USERNAME;

use crate::blocking;
use crate::conversation::Conversations;
use crate::error::ApiError;
use crate::textgen::Assistant;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub conversations: Conversations,
    pub assistant: Option<Assistant>,
}

impl AppStateInner {
    /// Wires the conversation layer to the store and dispatcher.
    /// Collaborators are added to `conversations` by the caller.
    pub fn new(
        db: Arc<Database>,
        jwt_secret: String,
        dispatcher: Dispatcher,
        conversations: Conversations,
        assistant: Option<Assistant>,
    ) -> AppState {
        Arc::new(Self {
            db,
            jwt_secret,
            dispatcher,
            conversations,
            assistant,
        })
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    if !(3..=32).contains(&username.chars().count()) {
        return Err(ApiError::BadRequest("username must be 3-32 characters".into()));
    }
    // Reserved so the assistant account can always be created
    if username.eq_ignore_ascii_case(BOT_USERNAME) {
        return Err(ApiError::Conflict("username is taken".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("password must be at least 8 characters".into()));
    }

    let lookup = username.clone();
    if blocking(&state.db, move |db| db.get_user_by_username(&lookup))
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("username is taken".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    let display_name = req
        .display_name
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| username.clone());
    let profile_pic = req.profile_pic;
    let name = username.clone();

    blocking(&state.db, move |db| {
        db.create_user(
            user_id,
            &name,
            &display_name,
            &password_hash,
            profile_pic.as_deref(),
        )
    })
    .await?;

    let token = create_token(&state.jwt_secret, user_id, &username).map_err(|e| {
        error!("Token creation failed: {}", e);
        ApiError::Internal(e.to_string())
    })?;

    info!("Registered {} ({})", username, user_id);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let user = blocking(&state.db, move |db| db.get_user_by_username(&username))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // The assistant account has no usable password
    if user.is_bot {
        return Err(ApiError::Unauthorized);
    }

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Internal(format!("stored hash is invalid: {}", e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|_| ApiError::Internal(format!("corrupt user id '{}'", user.id)))?;

    let token = create_token(&state.jwt_secret, user_id, &user.username)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
