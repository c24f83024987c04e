use std::ops::RangeInclusive;

use tello::Movement;

use crate::detect::Offset;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Horizontal pixels either side of the target inside which no yaw is issued.
    pub yaw_dead_zone: i32,
    pub vertical_dead_zone: i32,
    /// Subject areas (px²) considered "at the right distance".
    pub area_band: RangeInclusive<i64>,
    pub yaw_step_deg: u16,
    pub vertical_step_cm: u16,
    pub depth_step_cm: u16,
    /// Must match the bias used when computing offsets.
    pub vertical_bias: i32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            yaw_dead_zone: 90,
            vertical_dead_zone: 70,
            area_band: 15_000..=30_000,
            yaw_step_deg: 10,
            vertical_step_cm: 20,
            depth_step_cm: 20,
            vertical_bias: 30,
        }
    }
}

/// Maps a subject offset to corrective movements through dead-zone thresholds.
///
/// Each axis is independent, so a single offset yields up to three movements,
/// always ordered yaw, vertical, depth.
#[derive(Debug, Clone, Default)]
pub struct PositionController {
    config: ControllerConfig,
}

impl PositionController {
    pub fn new(config: ControllerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Step sizes outside the protocol ranges are dropped rather than sent.
    pub fn correct(&self, offset: &Offset) -> Vec<Movement> {
        [self.yaw(offset.x), self.vertical(offset.y), self.depth(offset.area)]
            .into_iter()
            .flatten()
            .filter_map(|movement| match movement.validated() {
                Ok(movement) => Some(movement),
                Err(e) => {
                    tracing::warn!(%movement, error = %e, "dropping out-of-range correction");
                    None
                }
            })
            .collect()
    }

    fn yaw(&self, offset_x: i32) -> Option<Movement> {
        // x == 0 already sits inside the dead zone; the guard is a no-op
        if offset_x.abs() <= self.config.yaw_dead_zone || offset_x == 0 {
            return None;
        }

        Some(if offset_x < 0 {
            Movement::CounterClockwise(self.config.yaw_step_deg)
        } else {
            Movement::Clockwise(self.config.yaw_step_deg)
        })
    }

    fn vertical(&self, offset_y: i32) -> Option<Movement> {
        // Bias-only offset (subject exactly on center) is a no-op as well
        if offset_y.abs() <= self.config.vertical_dead_zone
            || offset_y == -self.config.vertical_bias
        {
            return None;
        }

        Some(if offset_y < 0 {
            Movement::Up(self.config.vertical_step_cm)
        } else {
            Movement::Down(self.config.vertical_step_cm)
        })
    }

    fn depth(&self, area: i64) -> Option<Movement> {
        // Zero area means nothing was detected. Without this guard the
        // controller would fly forward whenever the subject is lost.
        if self.config.area_band.contains(&area) || area == 0 {
            return None;
        }

        Some(if area < *self.config.area_band.start() {
            Movement::Forward(self.config.depth_step_cm)
        } else {
            Movement::Back(self.config.depth_step_cm)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn offset(x: i32, y: i32, area: i64) -> Offset {
        Offset { x, y, area }
    }

    fn controller() -> PositionController {
        PositionController::default()
    }

    #[test]
    fn test_yaw_dead_zone() {
        let controller = controller();
        for x in -90..=90 {
            assert!(controller.correct(&offset(x, 0, 20_000)).is_empty(), "{x}");
        }

        assert_eq!(
            controller.correct(&offset(-91, 0, 20_000)),
            vec![Movement::CounterClockwise(10)]
        );
        assert_eq!(
            controller.correct(&offset(91, 0, 20_000)),
            vec![Movement::Clockwise(10)]
        );
    }

    #[test]
    fn test_vertical_dead_zone() {
        let controller = controller();
        assert!(controller.correct(&offset(0, 70, 20_000)).is_empty());
        assert!(controller.correct(&offset(0, -70, 20_000)).is_empty());
        assert_eq!(
            controller.correct(&offset(0, -71, 20_000)),
            vec![Movement::Up(20)]
        );
        assert_eq!(
            controller.correct(&offset(0, 71, 20_000)),
            vec![Movement::Down(20)]
        );
    }

    #[test]
    fn test_depth_band() {
        let controller = controller();
        assert_eq!(
            controller.correct(&offset(0, 0, 10_000)),
            vec![Movement::Forward(20)]
        );
        assert_eq!(
            controller.correct(&offset(0, 0, 35_000)),
            vec![Movement::Back(20)]
        );
        assert!(controller.correct(&offset(0, 0, 20_000)).is_empty());
        assert!(controller.correct(&offset(0, 0, 15_000)).is_empty());
        assert!(controller.correct(&offset(0, 0, 30_000)).is_empty());
    }

    #[test]
    fn test_all_axes_in_order() {
        assert_eq!(
            controller().correct(&offset(200, -150, 40_000)),
            vec![
                Movement::Clockwise(10),
                Movement::Up(20),
                Movement::Back(20)
            ]
        );
    }

    #[test]
    fn test_no_subject_means_no_movement() {
        let controller = controller();
        assert!(controller.correct(&Offset::NONE).is_empty());
        assert!(controller.correct(&offset(0, -30, 0)).is_empty());
    }

    #[test]
    fn test_out_of_range_steps_are_never_emitted() {
        let controller = PositionController::new(ControllerConfig {
            yaw_step_deg: 400,
            vertical_step_cm: 5,
            depth_step_cm: 600,
            ..ControllerConfig::default()
        });
        assert!(controller.correct(&offset(200, -200, 1)).is_empty());

        let controller = PositionController::new(ControllerConfig {
            vertical_step_cm: 5,
            ..ControllerConfig::default()
        });
        assert_eq!(
            controller.correct(&offset(200, -200, 1)),
            vec![Movement::Clockwise(10), Movement::Forward(20)]
        );
    }

    #[test]
    fn test_movements_are_valid_commands() {
        let controller = controller();
        for movement in controller.correct(&offset(-500, 500, 1)) {
            assert_eq!(movement.validated().unwrap(), movement);
            assert_eq!(
                movement.to_string().parse::<tello::Command>().unwrap(),
                tello::Command::Move(movement)
            );
        }
    }
}
