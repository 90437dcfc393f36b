use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{gateway, messages, summarize, users};

/// All HTTP and gateway routes. Transport layers (CORS, tracing, body
/// limits) are added by the server binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/api/users", get(users::list_contacts))
        .route("/api/messages/{user_id}", get(messages::get_messages))
        .route("/api/messages/send/{user_id}", post(messages::send_message))
        .route("/api/messages/edit/{message_id}", put(messages::edit_message))
        .route("/api/messages/delete/{message_id}", delete(messages::delete_message))
        .route("/api/summarize", post(summarize::summarize))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let ws_route = Router::new().route("/gateway", get(gateway::ws_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .with_state(state)
}
