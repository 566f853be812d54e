//! Session captcha gate.
//!
//! Tracks whether the session may proceed to world-join, driven by
//! server-pushed captcha-state frames. Token submission and the actual
//! world-join send live in the session; the gate only answers "may we
//! join yet" and "does the UI need to surface a challenge".

use crate::protocol::CaptchaWireState;
use tracing::info;

/// Effect the session must carry out after feeding a wire state in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Nothing to do.
    None,
    /// Verification completed; send the world-join frame now.
    SendWorldJoin,
}

/// Captcha state machine: Waiting -> Verifying -> {Verified|Invalid} -> Ok.
#[derive(Debug)]
pub struct CaptchaGate {
    state: CaptchaWireState,
    join_sent: bool,
}

impl Default for CaptchaGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptchaGate {
    /// New gate in the Waiting state (the initial state on every connect).
    pub fn new() -> Self {
        Self {
            state: CaptchaWireState::Waiting,
            join_sent: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> CaptchaWireState {
        self.state
    }

    /// Whether the UI must surface a challenge before the session can
    /// proceed. Waiting and Invalid block; Verifying/Verified/Ok do not.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self.state,
            CaptchaWireState::Waiting | CaptchaWireState::Invalid
        )
    }

    /// Apply a server-pushed state and return what the session must do.
    ///
    /// `Ok` triggers exactly one world-join per successful verification;
    /// `Invalid` drops back to Waiting so a fresh token is required.
    pub fn apply(&mut self, wire: CaptchaWireState) -> GateAction {
        info!(state = ?wire, "captcha state");
        match wire {
            CaptchaWireState::Invalid => {
                self.state = CaptchaWireState::Waiting;
                self.join_sent = false;
                GateAction::None
            }
            CaptchaWireState::Ok => {
                self.state = CaptchaWireState::Ok;
                if self.join_sent {
                    GateAction::None
                } else {
                    self.join_sent = true;
                    GateAction::SendWorldJoin
                }
            }
            other => {
                self.state = other;
                GateAction::None
            }
        }
    }

    /// Record that a token was handed to the server. Moves a blocking
    /// state to Verifying so the UI stops prompting while the server
    /// checks the token.
    pub fn token_submitted(&mut self) {
        if self.is_blocking() {
            self.state = CaptchaWireState::Verifying;
        }
    }

    /// Back to the initial state (called on connect/disconnect).
    pub fn reset(&mut self) {
        self.state = CaptchaWireState::Waiting;
        self.join_sent = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_blocking() {
        let gate = CaptchaGate::new();
        assert!(gate.is_blocking());
        assert_eq!(gate.state(), CaptchaWireState::Waiting);
    }

    #[test]
    fn ok_fires_world_join_exactly_once() {
        let mut gate = CaptchaGate::new();
        assert_eq!(gate.apply(CaptchaWireState::Verifying), GateAction::None);
        assert_eq!(gate.apply(CaptchaWireState::Verified), GateAction::None);
        assert_eq!(gate.apply(CaptchaWireState::Ok), GateAction::SendWorldJoin);
        // A duplicate Ok must not join twice.
        assert_eq!(gate.apply(CaptchaWireState::Ok), GateAction::None);
    }

    #[test]
    fn invalid_returns_to_waiting_and_rearms_join() {
        let mut gate = CaptchaGate::new();
        assert_eq!(gate.apply(CaptchaWireState::Ok), GateAction::SendWorldJoin);
        gate.apply(CaptchaWireState::Invalid);
        assert!(gate.is_blocking());
        assert_eq!(gate.state(), CaptchaWireState::Waiting);
        // A fresh verification joins again.
        assert_eq!(gate.apply(CaptchaWireState::Ok), GateAction::SendWorldJoin);
    }

    #[test]
    fn verifying_and_verified_do_not_block() {
        let mut gate = CaptchaGate::new();
        gate.apply(CaptchaWireState::Verifying);
        assert!(!gate.is_blocking());
        gate.apply(CaptchaWireState::Verified);
        assert!(!gate.is_blocking());
    }

    #[test]
    fn submitting_a_token_stops_blocking() {
        let mut gate = CaptchaGate::new();
        gate.token_submitted();
        assert!(!gate.is_blocking());
        assert_eq!(gate.state(), CaptchaWireState::Verifying);
        // Submitting while already verified changes nothing.
        gate.apply(CaptchaWireState::Ok);
        gate.token_submitted();
        assert_eq!(gate.state(), CaptchaWireState::Ok);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut gate = CaptchaGate::new();
        gate.apply(CaptchaWireState::Ok);
        gate.reset();
        assert!(gate.is_blocking());
        assert_eq!(gate.apply(CaptchaWireState::Ok), GateAction::SendWorldJoin);
    }
}
