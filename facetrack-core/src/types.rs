use tello::{Command, Movement};

use crate::{
    detect::{BoundingBox, Offset},
    session::SessionState,
};

#[derive(Debug, Clone)]
pub enum ClientBoundMessage {
    Shutdown,
    /// Stop tracking and bring the drone down.
    Land,
    ManualMovement(Movement),
    UpdateSessionState(SessionState),
    UpdateTracking(TrackingUpdate),
    CommandAcknowledged { command: Command, response: String },
}

#[derive(Debug, Clone)]
pub enum ServerBoundMessage {
    Shutdown,
    Broadcast(ClientBoundMessage),
}

/// What the control loop saw and did on one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingUpdate {
    pub frame: u64,
    pub frame_size: (u32, u32),
    pub detections: usize,
    pub subject: Option<BoundingBox>,
    pub offset: Offset,
    pub movements: Vec<Movement>,
}
