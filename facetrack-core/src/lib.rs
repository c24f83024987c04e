//! Visual subject tracking for a Tello quadcopter.
//!
//! A [`FlightSession`] pulls frames from a [`FrameSource`], hands them to an
//! external [`Detector`], turns the subject's offset into movements with the
//! [`PositionController`] and streams those to the drone over a [`DroneLink`].

pub mod config;
pub mod controller;
pub mod detect;
mod error;
mod hub;
pub mod link;
pub mod session;
mod types;
pub mod video;

pub use config::Config;
pub use controller::{ControllerConfig, PositionController};
pub use detect::{BoundingBox, Detector, NoDetector, Offset};
pub use error::{Error, Result};
pub use hub::{Bridge, Hub};
pub use link::{DroneLink, DryRunLink};
pub use session::{ControlRequest, FlightSession, SessionObserver, SessionState, StopHandle};
pub use types::{ClientBoundMessage, ServerBoundMessage, TrackingUpdate};
pub use video::{CaptureSource, FfmpegCapture, Frame, FrameSource, VideoCapture};
