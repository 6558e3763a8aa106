#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Error,
}

impl SessionState {
    pub fn can_transition(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Idle, Connecting)
                | (Connecting, Open)
                | (Connecting, Closing)
                | (Connecting, Error)
                | (Open, Closing)
                | (Open, Error)
                | (Closing, Closed)
                | (Error, Closed)
        )
    }

    /// Closed sessions never reopen; a new connect creates a new session.
    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }

    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Open)
    }
}
