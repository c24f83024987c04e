use crossterm::event::{KeyCode, KeyEvent};
use facetrack::{ClientBoundMessage, ServerBoundMessage};
use ratatui::{
    layout::{self, Constraint, Direction, Layout, Margin, Rect},
    style::{Color, Style, Stylize},
    widgets::Paragraph,
    Frame,
};
use tello::Movement;
use tui_textarea::TextArea;

use crate::app::{BridgeSink, Effects};

#[derive(Debug, PartialEq, Eq)]
enum PromptAction {
    Exit,
    Land,
    Move(Movement),
}

fn parse_prompt(line: &str) -> Result<PromptAction, tello::Error> {
    match line.trim() {
        "exit" | "quit" => Ok(PromptAction::Exit),
        "land" => Ok(PromptAction::Land),
        other => other.parse().map(PromptAction::Move),
    }
}

fn empty_prompt<'a>() -> TextArea<'a> {
    let mut prompt_field = TextArea::default();

    // Prevent the text area widget from managing the cursor
    // because it overwrites the default cursor style the terminal has configured
    prompt_field.set_cursor_style(Style::default().hidden());
    prompt_field
}

pub struct CommandView<'a> {
    prompt_field: TextArea<'a>,
    feedback: Option<(String, Color)>,
}

impl<'a> CommandView<'a> {
    pub fn new() -> Self {
        CommandView {
            prompt_field: empty_prompt(),
            feedback: None,
        }
    }

    pub fn handle_client_message(&mut self, msg: &ClientBoundMessage) {
        if let ClientBoundMessage::CommandAcknowledged { command, response } = msg {
            self.feedback = Some((format!("{command}: {response}"), Color::DarkGray));
        }
    }

    pub fn handle_user_event(&mut self, bridge: &BridgeSink, event: crossterm::event::Event) {
        if matches!(
            event,
            crossterm::event::Event::Key(KeyEvent {
                code: KeyCode::Enter,
                ..
            })
        ) {
            let line = self.prompt_field.lines()[0].clone();
            if !line.trim().is_empty() {
                self.feedback = Some(match parse_prompt(&line) {
                    Ok(PromptAction::Exit) => {
                        bridge.send(ServerBoundMessage::Shutdown);
                        ("exiting".to_string(), Color::DarkGray)
                    }
                    Ok(PromptAction::Land) => {
                        bridge.broadcast(ClientBoundMessage::Land);
                        ("landing".to_string(), Color::Yellow)
                    }
                    Ok(PromptAction::Move(movement)) => {
                        bridge.broadcast(ClientBoundMessage::ManualMovement(movement));
                        (format!("sent {movement}"), Color::Green)
                    }
                    Err(e) => (e.to_string(), Color::Red),
                });
            }

            // https://github.com/rhysd/tui-textarea/issues/57
            self.prompt_field = empty_prompt();

            return;
        }

        self.prompt_field.input(event);
    }

    pub fn draw(&self, rect: Rect, frame: &mut Frame, effects: &mut Effects, in_focus: bool) {
        let rect = rect.inner(Margin::new(1, 0));
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(0),
            ])
            .split(rect);

        // Prompt
        {
            let layout = layout::Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Length(2), Constraint::Min(0)])
                .split(layout[0]);

            frame.render_widget(Paragraph::new("> ").dark_gray(), layout[0]);
            frame.render_widget(
                Paragraph::new(self.prompt_field.lines()[0].clone())
                    .bold()
                    .fg(if in_focus {
                        Color::White
                    } else {
                        Color::DarkGray
                    }),
                layout[1],
            );

            if in_focus {
                let (cursor_y, cursor_x) = self.prompt_field.cursor();
                effects.set_cursor_position(
                    (cursor_x as u16) + layout[1].x,
                    (cursor_y as u16) + layout[1].y,
                );
            }
        }

        if let Some((feedback, color)) = &self.feedback {
            frame.render_widget(Paragraph::new(feedback.as_str()).fg(*color), layout[2]);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_prompt() {
        assert_eq!(parse_prompt("exit").unwrap(), PromptAction::Exit);
        assert_eq!(parse_prompt(" quit ").unwrap(), PromptAction::Exit);
        assert_eq!(parse_prompt("land").unwrap(), PromptAction::Land);
        assert_eq!(
            parse_prompt("cw 45").unwrap(),
            PromptAction::Move(Movement::Clockwise(45))
        );
        assert!(parse_prompt("up 5").is_err());
        assert!(parse_prompt("flip").is_err());
    }
}
