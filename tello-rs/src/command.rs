use std::{fmt, ops::RangeInclusive, str::FromStr};

use crate::error::Error;

pub const DISTANCE_RANGE_CM: RangeInclusive<u16> = 20..=500;
pub const ROTATION_RANGE_DEG: RangeInclusive<u16> = 0..=360;

/// A single protocol command. Renders to the exact datagram text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Enter SDK mode.
    Command,
    StreamOn,
    Takeoff,
    Land,
    Battery,
    Move(Movement),
}

impl Command {
    /// Whether the drone is expected to answer this command with a datagram
    /// worth waiting for. Movements are streamed without acknowledgement.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Command::Move(_))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Command => f.write_str("command"),
            Command::StreamOn => f.write_str("streamon"),
            Command::Takeoff => f.write_str("takeoff"),
            Command::Land => f.write_str("land"),
            Command::Battery => f.write_str("battery?"),
            Command::Move(movement) => movement.fmt(f),
        }
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "command" => Ok(Command::Command),
            "streamon" => Ok(Command::StreamOn),
            "takeoff" => Ok(Command::Takeoff),
            "land" => Ok(Command::Land),
            "battery?" => Ok(Command::Battery),
            other => other.parse().map(Command::Move),
        }
    }
}

impl From<Movement> for Command {
    fn from(movement: Movement) -> Self {
        Command::Move(movement)
    }
}

/// Relative movement. Distances are centimeters, rotations are degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Up(u16),
    Down(u16),
    Left(u16),
    Right(u16),
    Forward(u16),
    Back(u16),
    Clockwise(u16),
    CounterClockwise(u16),
}

impl Movement {
    pub fn up(cm: u16) -> Result<Self, Error> {
        Movement::Up(cm).validated()
    }

    pub fn down(cm: u16) -> Result<Self, Error> {
        Movement::Down(cm).validated()
    }

    pub fn left(cm: u16) -> Result<Self, Error> {
        Movement::Left(cm).validated()
    }

    pub fn right(cm: u16) -> Result<Self, Error> {
        Movement::Right(cm).validated()
    }

    pub fn forward(cm: u16) -> Result<Self, Error> {
        Movement::Forward(cm).validated()
    }

    pub fn back(cm: u16) -> Result<Self, Error> {
        Movement::Back(cm).validated()
    }

    pub fn cw(deg: u16) -> Result<Self, Error> {
        Movement::Clockwise(deg).validated()
    }

    pub fn ccw(deg: u16) -> Result<Self, Error> {
        Movement::CounterClockwise(deg).validated()
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Movement::Up(_) => "up",
            Movement::Down(_) => "down",
            Movement::Left(_) => "left",
            Movement::Right(_) => "right",
            Movement::Forward(_) => "forward",
            Movement::Back(_) => "back",
            Movement::Clockwise(_) => "cw",
            Movement::CounterClockwise(_) => "ccw",
        }
    }

    pub fn value(&self) -> u16 {
        match *self {
            Movement::Up(v)
            | Movement::Down(v)
            | Movement::Left(v)
            | Movement::Right(v)
            | Movement::Forward(v)
            | Movement::Back(v)
            | Movement::Clockwise(v)
            | Movement::CounterClockwise(v) => v,
        }
    }

    pub fn is_rotation(&self) -> bool {
        matches!(self, Movement::Clockwise(_) | Movement::CounterClockwise(_))
    }

    pub fn validated(self) -> Result<Self, Error> {
        let range = if self.is_rotation() {
            ROTATION_RANGE_DEG
        } else {
            DISTANCE_RANGE_CM
        };

        if range.contains(&self.value()) {
            Ok(self)
        } else {
            Err(Error::InvalidArgument {
                command: self.keyword(),
                value: self.value(),
                min: *range.start(),
                max: *range.end(),
            })
        }
    }
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.keyword(), self.value())
    }
}

impl FromStr for Movement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let (Some(keyword), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::Parse(s.to_string()));
        };

        let value: u16 = value.parse().map_err(|_| Error::Parse(s.to_string()))?;
        let movement = match keyword {
            "up" => Movement::Up(value),
            "down" => Movement::Down(value),
            "left" => Movement::Left(value),
            "right" => Movement::Right(value),
            "forward" => Movement::Forward(value),
            "back" => Movement::Back(value),
            "cw" => Movement::Clockwise(value),
            "ccw" => Movement::CounterClockwise(value),
            _ => return Err(Error::Parse(s.to_string())),
        };

        movement.validated()
    }
}
