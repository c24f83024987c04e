use facetrack::{ClientBoundMessage, TrackingUpdate};
use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::{Cell, Row, Table},
    Frame,
};
use tello::Command;

pub struct TrackingTableView {
    frame_row: DisplayRow,
    faces_row: DisplayRow,

    offset_x_row: DisplayRow,
    offset_y_row: DisplayRow,
    area_row: DisplayRow,

    command_row: DisplayRow,
    ack_row: DisplayRow,
    battery_row: DisplayRow,
}

impl TrackingTableView {
    pub fn new() -> Self {
        TrackingTableView {
            frame_row: DisplayRow::new("FRAME"),
            faces_row: DisplayRow::new("FACES"),

            offset_x_row: DisplayRow::new("OFFSET X"),
            offset_y_row: DisplayRow::new("OFFSET Y"),
            area_row: DisplayRow::new("AREA"),

            command_row: DisplayRow::new("LAST CMD"),
            ack_row: DisplayRow::new("ACK"),
            battery_row: DisplayRow::new("BATTERY"),
        }
    }

    pub fn handle_client_message(&mut self, msg: &ClientBoundMessage) {
        match msg {
            ClientBoundMessage::UpdateTracking(update) => self.update_tracking(update),
            ClientBoundMessage::ManualMovement(movement) => {
                self.command_row.update(movement);
            }
            ClientBoundMessage::CommandAcknowledged {
                command: Command::Battery,
                response,
            } => {
                self.battery_row.update(format!("{response}%"));
            }
            ClientBoundMessage::CommandAcknowledged { command, response } => {
                self.command_row.update(command);
                self.ack_row.update(response);
            }
            _ => {}
        }
    }

    fn update_tracking(&mut self, update: &TrackingUpdate) {
        self.frame_row.update(update.frame);
        self.faces_row.update(update.detections);

        if update.subject.is_some() {
            self.offset_x_row.update(update.offset.x);
            self.offset_y_row.update(update.offset.y);
            self.area_row.update(update.offset.area);
        } else {
            self.offset_x_row.clear();
            self.offset_y_row.clear();
            self.area_row.clear();
        }

        if let Some(last) = update.movements.last() {
            self.command_row.update(last);
        }
    }

    pub fn draw(&self, rect: Rect, frame: &mut Frame) {
        let rows = [
            Row::new(self.frame_row.cells()),
            Row::new(self.faces_row.cells()),
            Row::new([Cell::new(""); 0]),
            Row::new(self.offset_x_row.cells()),
            Row::new(self.offset_y_row.cells()),
            Row::new(self.area_row.cells()),
            Row::new([Cell::new(""); 0]),
            Row::new(self.command_row.cells()),
            Row::new(self.ack_row.cells()),
            Row::new(self.battery_row.cells()),
        ];

        let table = Table::new(rows, [Constraint::Min(0), Constraint::Length(14)]);
        frame.render_widget(table, rect);
    }
}

struct DisplayRow {
    label: &'static str,
    value: String,
}

impl DisplayRow {
    fn new(label: &'static str) -> Self {
        DisplayRow {
            label,
            value: String::new(),
        }
    }

    fn update(&mut self, value: impl std::fmt::Display) {
        self.value = value.to_string();
    }

    fn clear(&mut self) {
        self.value.clear();
    }

    fn cells(&self) -> impl IntoIterator<Item = Cell> + '_ {
        [
            Cell::from(Span::styled(self.label, Style::default().dark_gray())),
            Cell::from(Line::from(Span::styled(&self.value, Style::default().bold())).right_aligned())
                .bg(Color::Black),
        ]
    }
}
