use std::time::Duration;

use tello::{Command, CommandChannel, Response};

/// Where a flight session sends its commands.
pub trait DroneLink: Send {
    fn send_and_await(&self, command: &Command, timeout: Duration) -> tello::Result<Response>;

    fn send_fire_and_forget(&self, command: &Command) -> tello::Result<()>;

    fn ack_timeout(&self) -> Duration;

    fn close(&mut self);
}

impl DroneLink for CommandChannel {
    fn send_and_await(&self, command: &Command, timeout: Duration) -> tello::Result<Response> {
        CommandChannel::send_and_await(self, &command.to_string(), timeout)
    }

    fn send_fire_and_forget(&self, command: &Command) -> tello::Result<()> {
        CommandChannel::send_fire_and_forget(self, &command.to_string())
    }

    fn ack_timeout(&self) -> Duration {
        CommandChannel::ack_timeout(self)
    }

    fn close(&mut self) {
        CommandChannel::close(self);
    }
}

/// Logs commands instead of sending them. Used when tracking with a local
/// camera and no drone.
#[derive(Debug, Default)]
pub struct DryRunLink {
    closed: bool,
}

impl DryRunLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl DroneLink for DryRunLink {
    fn send_and_await(&self, command: &Command, _: Duration) -> tello::Result<Response> {
        tracing::info!(%command, "dry run");
        Ok(Response::Ok(match command {
            Command::Battery => "100".into(),
            _ => "ok".into(),
        }))
    }

    fn send_fire_and_forget(&self, command: &Command) -> tello::Result<()> {
        tracing::debug!(%command, "dry run");
        Ok(())
    }

    fn ack_timeout(&self) -> Duration {
        tello::DEFAULT_ACK_TIMEOUT
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
