use std::sync::Arc;

use crate::chat::registry::Registry;
use crate::db::DbPool;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Access token lifetime in minutes
    pub token_ttl_minutes: i64,
    /// Live WebSocket connection indices (user -> conns, room -> conns)
    pub registry: Arc<Registry>,
}
