//! MCP session lifecycle
//!
//! A session starts `Uninitialized`, moves to `Initializing` once the server
//! has answered `initialize`, and to `Initialized` when the client sends
//! `notifications/initialized`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionPhase {
    /// Only `initialize` and `ping` are accepted
    Uninitialized = 0,
    /// `initialize` answered, waiting for `notifications/initialized`
    Initializing = 1,
    /// Normal operation
    Initialized = 2,
}

impl SessionPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionPhase::Initializing,
            2 => SessionPhase::Initialized,
            _ => SessionPhase::Uninitialized,
        }
    }

    /// Whether a request for `method` may be served in this phase.
    pub fn allows(self, method: &str) -> bool {
        match self {
            SessionPhase::Uninitialized => matches!(method, "initialize" | "ping"),
            SessionPhase::Initializing | SessionPhase::Initialized => true,
        }
    }
}

/// Phase of one session, shared by every clone.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    phase: Arc<AtomicU8>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_initialized(&self) -> bool {
        self.phase() == SessionPhase::Initialized
    }

    /// `Uninitialized -> Initializing`. False if the session was not fresh.
    pub fn mark_initializing(&self) -> bool {
        self.advance(SessionPhase::Uninitialized, SessionPhase::Initializing)
    }

    /// `Initializing -> Initialized`. False in any other phase.
    pub fn mark_initialized(&self) -> bool {
        self.advance(SessionPhase::Initializing, SessionPhase::Initialized)
    }

    pub fn is_request_allowed(&self, method: &str) -> bool {
        self.phase().allows(method)
    }

    fn advance(&self, from: SessionPhase, to: SessionPhase) -> bool {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let session = SessionState::new();
        assert_eq!(session.phase(), SessionPhase::Uninitialized);
        assert!(session.is_request_allowed("initialize"));
        assert!(session.is_request_allowed("ping"));
        assert!(!session.is_request_allowed("tools/call"));

        assert!(!session.mark_initialized());
        assert!(session.mark_initializing());
        assert!(!session.mark_initializing());
        assert!(session.is_request_allowed("tools/list"));

        assert!(session.mark_initialized());
        assert!(session.is_initialized());
    }

    #[test]
    fn test_clones_share_phase() {
        let a = SessionState::new();
        let b = a.clone();
        a.mark_initializing();
        b.mark_initialized();
        assert_eq!(a.phase(), SessionPhase::Initialized);
    }
}
