use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::ClientStorage;

pub const SESSION_STORAGE_KEY: &str = "quiz_funnel_session_id";

/// Stable per-client session identity.
pub struct SessionService {
    storage: Arc<dyn ClientStorage>,
}

impl SessionService {
    pub fn new(storage: Arc<dyn ClientStorage>) -> Self {
        Self { storage }
    }

    /// Stored session id, or a new one that is persisted for next time.
    ///
    /// When storage is unavailable every call returns a fresh id.
    pub fn get_or_create_session_id(&self) -> String {
        match self.storage.get_item(SESSION_STORAGE_KEY) {
            Ok(Some(existing)) if !existing.trim().is_empty() => return existing,
            Ok(_) => {}
            Err(e) => warn!("Failed to read session id, using a temporary one: {}", e),
        }

        let session_id = generate_session_id();
        match self.storage.set_item(SESSION_STORAGE_KEY, &session_id) {
            Ok(()) => debug!("Created session {}", session_id),
            Err(e) => warn!("Failed to persist session id {}: {}", session_id, e),
        }
        session_id
    }
}

fn generate_session_id() -> String {
    format!("session_{}", Uuid::new_v4().simple())
}
