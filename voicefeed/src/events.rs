//! Event types for VoiceFeed

use crate::world::SessionId;

/// Notifications emitted by playback sessions, drained with
/// [`VoiceWorld::poll_events`](crate::VoiceWorld::poll_events).
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    Started {
        session_id: SessionId,
    },
    Paused {
        session_id: SessionId,
    },
    Resumed {
        session_id: SessionId,
    },
    /// The session was stopped by the caller and its voice went back to the pool.
    Stopped {
        session_id: SessionId,
    },
    /// A looping stream wrapped back to its start.
    Looped {
        session_id: SessionId,
        loop_count: u32,
    },
    /// A non-looping stream played to the end and its voice went back to the pool.
    EndOfStream {
        session_id: SessionId,
    },
    /// A backend call failed without aborting playback.
    BackendError {
        session_id: SessionId,
        error: String,
    },
}

impl VoiceEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Started { session_id }
            | Self::Paused { session_id }
            | Self::Resumed { session_id }
            | Self::Stopped { session_id }
            | Self::Looped { session_id, .. }
            | Self::EndOfStream { session_id }
            | Self::BackendError { session_id, .. } => *session_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::BackendError { .. })
    }

    /// True for events after which the session no longer holds a voice.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped { .. } | Self::EndOfStream { .. })
    }
}
