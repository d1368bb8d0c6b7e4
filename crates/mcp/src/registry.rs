//! Protocol-session registry.
//!
//! One entry per successful `initialize`.  Entries are immutable after
//! creation and retained for the process lifetime — there is deliberately
//! no expiry sweep.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

/// A negotiated protocol session.
#[derive(Debug, Clone)]
pub struct ProtocolSession {
    pub session_id: String,
    pub protocol_version: String,
    pub client_info: Value,
    pub capabilities: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, ProtocolSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new session with a fresh identifier.
    pub fn create(
        &self,
        protocol_version: String,
        client_info: Value,
        capabilities: Value,
    ) -> ProtocolSession {
        let session = ProtocolSession {
            session_id: uuid::Uuid::new_v4().to_string(),
            protocol_version,
            client_info,
            capabilities,
            created_at: Utc::now(),
        };
        self.sessions
            .write()
            .insert(session.session_id.clone(), session.clone());
        tracing::info!(session_id = %session.session_id, "protocol session created");
        session
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<ProtocolSession> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
