use facetrack::{ClientBoundMessage, ControllerConfig, Offset};
use ratatui::{
    layout::Rect,
    style::Color,
    widgets::canvas::{Canvas, Line, Rectangle},
    Frame,
};

const DEFAULT_FRAME_SIZE: (u32, u32) = (960, 720);

/// Where the subject sits relative to the target point, scaled so the frame
/// edges land on ±1.
pub struct TrackingView {
    config: ControllerConfig,
    frame_size: (u32, u32),
    offset: Option<Offset>,
}

impl TrackingView {
    pub fn new(config: ControllerConfig) -> Self {
        TrackingView {
            config,
            frame_size: DEFAULT_FRAME_SIZE,
            offset: None,
        }
    }

    pub fn handle_client_message(&mut self, msg: &ClientBoundMessage) {
        if let ClientBoundMessage::UpdateTracking(update) = msg {
            self.frame_size = update.frame_size;
            self.offset = update.subject.map(|_| update.offset);
        }
    }

    fn half_extents(&self) -> (f64, f64) {
        (
            (f64::from(self.frame_size.0) / 2.0).max(1.0),
            (f64::from(self.frame_size.1) / 2.0).max(1.0),
        )
    }

    pub fn draw(&self, rect: Rect, frame: &mut Frame) {
        const CROSSHAIR_SIZE: f64 = 0.05;
        let (half_width, half_height) = self.half_extents();

        let dead_zone = Rectangle {
            x: -f64::from(self.config.yaw_dead_zone) / half_width,
            y: -f64::from(self.config.vertical_dead_zone) / half_height,
            width: 2.0 * f64::from(self.config.yaw_dead_zone) / half_width,
            height: 2.0 * f64::from(self.config.vertical_dead_zone) / half_height,
            color: Color::White,
        };

        let canvas = Canvas::default()
            .x_bounds([-1.0, 1.0])
            .y_bounds([-1.0, 1.0])
            .paint(|ctx| {
                ctx.draw(&Line {
                    x1: -1.0,
                    y1: 0.0,
                    x2: 1.0,
                    y2: 0.0,
                    color: Color::DarkGray,
                });

                ctx.draw(&Line {
                    x1: 0.0,
                    y1: -1.0,
                    x2: 0.0,
                    y2: 1.0,
                    color: Color::DarkGray,
                });
            });

        frame.render_widget(canvas, rect);

        let canvas = Canvas::default()
            .x_bounds([-1.0, 1.0])
            .y_bounds([-1.0, 1.0])
            .paint(|ctx| {
                ctx.draw(&dead_zone);
            });

        frame.render_widget(canvas, rect);

        let Some(offset) = self.offset else {
            return;
        };

        // Image rows grow downwards, canvas y grows upwards
        let center = (
            f64::clamp(f64::from(offset.x) / half_width, -1.0, 1.0),
            f64::clamp(-f64::from(offset.y) / half_height, -1.0, 1.0),
        );

        let in_band = self.config.area_band.contains(&offset.area);
        let canvas = Canvas::default()
            .x_bounds([-1.0, 1.0])
            .y_bounds([-1.0, 1.0])
            .paint(|ctx| {
                ctx.draw(&Line {
                    x1: center.0 - CROSSHAIR_SIZE,
                    y1: center.1,
                    x2: center.0 + CROSSHAIR_SIZE,
                    y2: center.1,
                    color: if offset.x.abs() <= self.config.yaw_dead_zone {
                        Color::Green
                    } else {
                        Color::Red
                    },
                });

                ctx.draw(&Line {
                    x1: center.0,
                    y1: center.1 - CROSSHAIR_SIZE,
                    x2: center.0,
                    y2: center.1 + CROSSHAIR_SIZE,
                    color: if offset.y.abs() <= self.config.vertical_dead_zone {
                        Color::Green
                    } else {
                        Color::Red
                    },
                });

                ctx.draw(&Rectangle {
                    x: center.0 - CROSSHAIR_SIZE * 2.0,
                    y: center.1 - CROSSHAIR_SIZE * 2.0,
                    width: CROSSHAIR_SIZE * 4.0,
                    height: CROSSHAIR_SIZE * 4.0,
                    color: if in_band { Color::Green } else { Color::Yellow },
                });
            });

        frame.render_widget(canvas, rect);
    }
}
