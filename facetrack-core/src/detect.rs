use crate::video::Frame;

/// Axis-aligned box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> i64 {
        i64::from(self.w) * i64::from(self.h)
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.w / 2, self.y + self.h / 2)
    }
}

/// Locates subjects in a frame. Anything that turns a frame into rectangles
/// will do; this crate never looks inside.
pub trait Detector {
    fn detect(&mut self, frame: &Frame) -> Vec<BoundingBox>;
}

impl<F> Detector for F
where
    F: FnMut(&Frame) -> Vec<BoundingBox>,
{
    fn detect(&mut self, frame: &Frame) -> Vec<BoundingBox> {
        self(frame)
    }
}

/// Never finds anything. Keeps the drone hovering in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDetector;

impl Detector for NoDetector {
    fn detect(&mut self, _: &Frame) -> Vec<BoundingBox> {
        Vec::new()
    }
}

/// Picks the subject to track: the largest box, the first one enumerated on
/// ties.
pub fn select_subject(detections: &[BoundingBox]) -> Option<BoundingBox> {
    detections
        .iter()
        .copied()
        .reduce(|best, candidate| {
            if candidate.area() > best.area() {
                candidate
            } else {
                best
            }
        })
}

/// Signed distance of the subject from where we want it, plus its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Offset {
    pub x: i32,
    pub y: i32,
    pub area: i64,
}

impl Offset {
    /// No subject, no correction.
    pub const NONE: Offset = Offset { x: 0, y: 0, area: 0 };

    /// `vertical_bias` moves the target point that many pixels below the frame
    /// center.
    pub fn from_subject(
        frame_size: (u32, u32),
        subject: Option<&BoundingBox>,
        vertical_bias: i32,
    ) -> Self {
        let Some(subject) = subject else {
            return Offset::NONE;
        };

        let (width, height) = frame_size;
        let target_x = i32::try_from(width / 2).unwrap_or(i32::MAX);
        let target_y = i32::try_from(height / 2).unwrap_or(i32::MAX);
        let (center_x, center_y) = subject.center();

        Offset {
            x: center_x - target_x,
            y: center_y - target_y - vertical_bias,
            area: subject.area(),
        }
    }
}
