use crate::session::SessionState;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Link(#[from] tello::Error),

    #[error("video stream {source_name} unavailable: {reason}")]
    StreamUnavailable { source_name: String, reason: String },

    #[error("video stream ended")]
    StreamEnded,

    #[error("stopped before takeoff")]
    Cancelled,

    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}
