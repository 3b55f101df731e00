//! Session state tracking for the BROM protocol.

use std::fmt;

/// Which phase of the BROM handshake has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nothing exchanged yet.
    #[default]
    Disconnected,
    /// Boot ROM answered the probe sequence.
    HandshakeDone,
    /// Boot ROM (not preloader) confirmed.
    PreloaderVerified,
    SocIdRead,
    /// Auth certificate accepted.
    AuthSent,
    /// SLA challenge completed.
    Qualified,
    /// SLA challenge bypassed.
    SlaSkipped,
    /// Download agent transmitted.
    DaSent,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "DISCONNECTED"),
            SessionState::HandshakeDone => write!(f, "HANDSHAKE_DONE"),
            SessionState::PreloaderVerified => write!(f, "PRELOADER_VERIFIED"),
            SessionState::SocIdRead => write!(f, "SOC_ID_READ"),
            SessionState::AuthSent => write!(f, "AUTH_SENT"),
            SessionState::Qualified => write!(f, "QUALIFIED"),
            SessionState::SlaSkipped => write!(f, "SLA_SKIPPED"),
            SessionState::DaSent => write!(f, "DA_SENT"),
        }
    }
}

impl SessionState {
    /// Position in the handshake sequence. The two SLA outcomes share a rank.
    pub fn rank(&self) -> u8 {
        match self {
            SessionState::Disconnected => 0,
            SessionState::HandshakeDone => 1,
            SessionState::PreloaderVerified => 2,
            SessionState::SocIdRead => 3,
            SessionState::AuthSent => 4,
            SessionState::Qualified | SessionState::SlaSkipped => 5,
            SessionState::DaSent => 6,
        }
    }

    /// Whether `next` is the immediate successor of this state.
    pub fn can_advance_to(&self, next: SessionState) -> bool {
        next.rank() == self.rank() + 1
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::DaSent)
    }
}

/// Runtime state of one session.
#[derive(Debug, Default)]
pub struct StateMachineContext {
    /// Current session state.
    pub state: SessionState,
    /// Device echoed the handshake probe instead of complementing it.
    pub handshake_echoed: bool,
    /// Byte returned to GET_BL_VER.
    pub bl_version: Option<u8>,
    /// Raw SoC ID payload.
    pub soc_id: Option<Vec<u8>>,
    /// Number of DA chunks written.
    pub da_chunks_sent: usize,
}

impl StateMachineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to the next state. Returns false, leaving the state untouched,
    /// if `new_state` is not the immediate successor.
    pub fn goto_state(&mut self, new_state: SessionState) -> bool {
        if !self.state.can_advance_to(new_state) {
            tracing::error!(from = %self.state, to = %new_state, "Rejected state transition");
            return false;
        }
        tracing::info!(from = %self.state, to = %new_state, "State transition");
        self.state = new_state;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        let mut ctx = StateMachineContext::new();
        assert!(ctx.goto_state(SessionState::HandshakeDone));
        assert!(ctx.goto_state(SessionState::PreloaderVerified));
        assert!(ctx.goto_state(SessionState::SocIdRead));
        assert!(ctx.goto_state(SessionState::AuthSent));
        assert!(ctx.goto_state(SessionState::SlaSkipped));
        assert!(ctx.goto_state(SessionState::DaSent));
        assert!(ctx.is_complete());
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        let mut ctx = StateMachineContext::new();
        assert!(!ctx.goto_state(SessionState::SocIdRead));
        assert_eq!(ctx.state, SessionState::Disconnected);

        assert!(ctx.goto_state(SessionState::HandshakeDone));
        assert!(!ctx.goto_state(SessionState::HandshakeDone));
        assert!(!ctx.goto_state(SessionState::Disconnected));
        assert_eq!(ctx.state, SessionState::HandshakeDone);
    }

    #[test]
    fn test_sla_outcomes_are_siblings() {
        assert!(SessionState::AuthSent.can_advance_to(SessionState::Qualified));
        assert!(SessionState::AuthSent.can_advance_to(SessionState::SlaSkipped));
        assert!(!SessionState::Qualified.can_advance_to(SessionState::SlaSkipped));
        assert!(SessionState::Qualified.can_advance_to(SessionState::DaSent));
    }
}
