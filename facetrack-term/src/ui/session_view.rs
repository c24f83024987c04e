use facetrack::{ClientBoundMessage, SessionState};
use ratatui::{
    layout::Rect,
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

pub struct SessionView {
    state: SessionState,
    dry_run: bool,
}

impl SessionView {
    pub fn new(dry_run: bool) -> Self {
        SessionView {
            state: SessionState::Idle,
            dry_run,
        }
    }

    pub fn handle_client_message(&mut self, msg: &ClientBoundMessage) {
        if let ClientBoundMessage::UpdateSessionState(state) = msg {
            self.state = *state;
        }
    }

    pub fn draw(&self, rect: Rect, frame: &mut Frame) {
        let (status, color) = match self.state {
            SessionState::Idle => ("○ IDLE", Color::DarkGray),
            SessionState::Connected => ("◐ CONNECTED", Color::Yellow),
            SessionState::Airborne => ("● AIRBORNE", Color::Green),
            SessionState::Landing => ("◑ LANDING", Color::Yellow),
            SessionState::Ended => ("○ ENDED", Color::Red),
        };

        let mut spans = vec![Span::styled(status, Style::default().fg(color))];
        if self.dry_run {
            spans.push(Span::raw("  "));
            spans.push(Span::raw(" DRY RUN ").black().on_yellow().bold());
        }

        frame.render_widget(Paragraph::new(Line::from(spans)), rect);
    }
}
