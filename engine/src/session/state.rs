/// Lifecycle of an engine session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Worker spawned, handshake not yet sent.
    Created,
    /// Handshake sent, waiting for `uciok`.
    Initializing,
    /// Idle and configured.
    Ready,
    /// One search in flight.
    Searching,
    /// Worker lost; a replacement is being started.
    Crashed,
    /// Shut down for good.
    Terminated,
}

impl SessionState {
    /// Whether `self -> next` is an edge of the lifecycle.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::{Crashed, Created, Initializing, Ready, Searching, Terminated};

        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Created, Initializing) => true,
            (Initializing, Ready) => true,
            (Ready, Searching) | (Searching, Ready) => true,
            (Initializing | Ready | Searching, Crashed) => true,
            (Crashed, Initializing) => true,
            _ => false,
        }
    }

    /// Ready has been signalled and not since lost.
    pub fn is_ready(self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Searching)
    }
}
