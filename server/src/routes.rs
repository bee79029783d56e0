use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::auth::middleware::JwtSecret;
use crate::auth::routes as auth_routes;
use crate::chat::{handler as ws_handler, rest as chat_rest};
use crate::state::AppState;

async fn home() -> &'static str {
    "Pairchat server is running"
}

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/", get(home))
        .route("/register", post(auth_routes::register))
        .route("/token", post(auth_routes::token))
        .route("/users/me", get(auth_routes::me))
        .route("/api/chat/search-users", get(chat_rest::search_users))
        .route("/api/chat/conversations", get(chat_rest::conversations))
        .route("/api/chat/mark-read/{room_id}", post(chat_rest::mark_read))
        .route("/api/chat/unread-count", get(chat_rest::unread_count))
        .route("/ws", get(ws_handler::ws_upgrade))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .layer(cors)
        .with_state(state)
}
