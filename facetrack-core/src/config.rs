//! Runtime configuration from environment.

use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use crate::{controller::ControllerConfig, video::CaptureSource};

#[derive(Debug, Clone)]
pub struct Config {
    pub local_addr: SocketAddr,
    pub drone_addr: SocketAddr,
    /// Overrides the stream URL derived from `drone_addr`.
    pub video_url: Option<String>,
    pub ack_timeout: Duration,
    pub frame_size: (u32, u32),
    /// Track with a local camera and never talk to a drone.
    pub dummy: bool,
    pub camera_index: u32,
    pub initial_climb_cm: u16,
    /// How long the control loop sleeps when no new frame is ready.
    pub idle_wait: Duration,
    pub controller: ControllerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            drone_addr: tello::default_drone_address(),
            video_url: None,
            ack_timeout: tello::DEFAULT_ACK_TIMEOUT,
            frame_size: (960, 720),
            dummy: false,
            camera_index: 0,
            initial_climb_cm: 160,
            idle_wait: Duration::from_millis(5),
            controller: ControllerConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let controller = ControllerConfig {
            vertical_bias: var("FACETRACK_VERTICAL_BIAS", defaults.controller.vertical_bias),
            ..defaults.controller
        };

        Self {
            local_addr: var("FACETRACK_LOCAL_ADDR", defaults.local_addr),
            drone_addr: var("FACETRACK_DRONE_ADDR", defaults.drone_addr),
            video_url: env::var("FACETRACK_VIDEO_URL").ok(),
            ack_timeout: Duration::from_millis(var(
                "FACETRACK_ACK_TIMEOUT_MS",
                defaults.ack_timeout.as_millis() as u64,
            )),
            frame_size: (
                var("FACETRACK_FRAME_WIDTH", defaults.frame_size.0),
                var("FACETRACK_FRAME_HEIGHT", defaults.frame_size.1),
            ),
            dummy: var("FACETRACK_DUMMY", defaults.dummy),
            camera_index: var("FACETRACK_CAMERA", defaults.camera_index),
            initial_climb_cm: var("FACETRACK_INITIAL_CLIMB_CM", defaults.initial_climb_cm),
            idle_wait: defaults.idle_wait,
            controller,
        }
    }

    pub fn video_url(&self) -> String {
        self.video_url
            .clone()
            .unwrap_or_else(|| tello::video_address(self.drone_addr.ip()))
    }

    pub fn capture_source(&self) -> CaptureSource {
        if self.dummy {
            CaptureSource::Camera(self.camera_index)
        } else {
            CaptureSource::Stream(self.video_url())
        }
    }
}

fn var<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            tracing::warn!(key, %value, "ignoring unparsable environment variable");
            default
        }),
        Err(_) => default,
    }
}
