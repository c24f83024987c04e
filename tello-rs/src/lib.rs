//! Text-command link to a Tello quadcopter over UDP.

mod channel;
mod command;
mod error;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub use channel::{CommandChannel, Response, DEFAULT_ACK_TIMEOUT, NONE_RESPONSE};
pub use command::{Command, Movement, DISTANCE_RANGE_CM, ROTATION_RANGE_DEG};
pub use error::{Error, Result};

pub const DEFAULT_DRONE_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 10, 1));
pub const COMMAND_PORT: u16 = 8889;
pub const VIDEO_PORT: u16 = 11111;

/// The drone's command endpoint on its own access point.
pub fn default_drone_address() -> SocketAddr {
    SocketAddr::new(DEFAULT_DRONE_IP, COMMAND_PORT)
}

/// URL the drone streams H.264 video to once `streamon` was accepted.
pub fn video_address(drone_ip: IpAddr) -> String {
    format!("udp://{}:{}", drone_ip, VIDEO_PORT)
}
