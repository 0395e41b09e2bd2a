//! Match session provisioning
//!
//! A session is the externally provisioned place a paired match is played in
//! (a room, channel or table). Provisioning failures are tolerated by every
//! caller: a match without a session is still a match.

use crate::error::{LadderError, Result};
use crate::types::SessionRef;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Trait for provisioning and tearing down match sessions
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Provision a session for a newly paired match
    async fn create_session(&self, player1_id: &str, player2_id: &str) -> Result<SessionRef>;

    /// Tear down a session once the match is over
    async fn close_session(&self, session_ref: &SessionRef) -> Result<()>;
}

/// Session provider that only tracks refs locally, used by the standalone
/// service and the simulator
#[derive(Debug, Default)]
pub struct LocalSessionProvider {
    open_sessions: std::sync::Mutex<HashSet<SessionRef>>,
}

impl LocalSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently open (for monitoring)
    pub fn open_session_count(&self) -> usize {
        self.open_sessions
            .lock()
            .map(|sessions| sessions.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SessionProvider for LocalSessionProvider {
    async fn create_session(&self, player1_id: &str, player2_id: &str) -> Result<SessionRef> {
        let session_ref = format!("session-{}", uuid::Uuid::new_v4());
        {
            let mut sessions =
                self.open_sessions
                    .lock()
                    .map_err(|_| LadderError::InternalError {
                        message: "Failed to acquire session lock".to_string(),
                    })?;
            sessions.insert(session_ref.clone());
        }
        info!(
            "Created session {} for {} vs {}",
            session_ref, player1_id, player2_id
        );
        Ok(session_ref)
    }

    async fn close_session(&self, session_ref: &SessionRef) -> Result<()> {
        let mut sessions = self
            .open_sessions
            .lock()
            .map_err(|_| LadderError::InternalError {
                message: "Failed to acquire session lock".to_string(),
            })?;
        if sessions.remove(session_ref) {
            debug!("Closed session {}", session_ref);
        }
        Ok(())
    }
}

/// Mock session provider for testing
#[derive(Debug, Default)]
pub struct MockSessionProvider {
    created: std::sync::Mutex<Vec<(String, String)>>,
    closed: std::sync::Mutex<Vec<SessionRef>>,
    failing: AtomicBool,
}

impl MockSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent provisioning fail (for testing failure tolerance)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Pairs sessions were created for (for testing)
    pub fn get_created(&self) -> Vec<(String, String)> {
        self.created
            .lock()
            .map(|created| created.clone())
            .unwrap_or_default()
    }

    /// Session refs that were closed (for testing)
    pub fn get_closed(&self) -> Vec<SessionRef> {
        self.closed
            .lock()
            .map(|closed| closed.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionProvider for MockSessionProvider {
    async fn create_session(&self, player1_id: &str, player2_id: &str) -> Result<SessionRef> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LadderError::InternalError {
                message: "Mock session provider configured to fail".to_string(),
            }
            .into());
        }
        if let Ok(mut created) = self.created.lock() {
            created.push((player1_id.to_string(), player2_id.to_string()));
        }
        Ok(format!("mock-session-{}-{}", player1_id, player2_id))
    }

    async fn close_session(&self, session_ref: &SessionRef) -> Result<()> {
        if let Ok(mut closed) = self.closed.lock() {
            closed.push(session_ref.clone());
        }
        Ok(())
    }
}
