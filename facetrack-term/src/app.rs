use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crossbeam_channel::select;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use facetrack::{Bridge, ClientBoundMessage, Config, ServerBoundMessage};
use ratatui::{
    layout::{Constraint, Direction, Layout, Margin, Position},
    prelude::{Backend, CrosstermBackend},
    style::{Color, Style, Stylize},
    widgets::{Block, BorderType, Borders},
    Terminal,
};

use crate::ui::{CommandView, SessionView, TrackingTableView, TrackingView};

fn is_exit_event(event: &Event) -> bool {
    matches!(event, Event::Key(KeyEvent { code: KeyCode::Char('c'), modifiers, .. }) if modifiers.contains(KeyModifiers::CONTROL))
}

pub struct App {
    dry_run: bool,
    tracking_view: TrackingView,
}

impl App {
    pub fn new(config: &Config) -> Self {
        Self {
            dry_run: config.dummy,
            tracking_view: TrackingView::new(config.controller.clone()),
        }
    }

    pub fn run(self, bridge: Bridge) -> std::io::Result<()> {
        let mut term = {
            let mut stdout = std::io::stdout();

            crossterm::terminal::enable_raw_mode()?;
            crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
            let backend = CrosstermBackend::new(stdout);
            Terminal::new(backend)?
        };

        let cancelled = Arc::new(AtomicBool::new(false));
        let (rx1, tx1) = bridge.into_inner();
        let (tx2, rx2) = crossbeam_channel::unbounded();
        let event_loop_join_handle = {
            let cancelled = cancelled.clone();
            std::thread::spawn(move || {
                while !cancelled.load(Ordering::Acquire) {
                    if crossterm::event::poll(std::time::Duration::from_millis(50))? {
                        let e = crossterm::event::read()?;
                        let is_exit_event = is_exit_event(&e);
                        if tx2.send(e).is_err() || is_exit_event {
                            break;
                        }
                    }
                }

                std::io::Result::Ok(())
            })
        };

        let sink = BridgeSink { tx: tx1 };
        let mut view_state = ViewState {
            command_in_focus: false,
            command_view: CommandView::new(),
            session_view: SessionView::new(self.dry_run),
            tracking_table_view: TrackingTableView::new(),
            tracking_view: self.tracking_view,
        };

        _ = view_state.draw(&mut term);

        loop {
            let should_draw = select! {
                recv(rx1) -> msg => {
                    match msg {
                        Ok(ClientBoundMessage::Shutdown) | Err(_) => break,
                        Ok(msg) => view_state.handle_client_message(&msg),
                    }
                }
                recv(rx2) -> event => {
                    if let Ok(event) = event {
                        if is_exit_event(&event) {
                            sink.send(ServerBoundMessage::Shutdown);
                        } else {
                            view_state.handle_user_event(&sink, event);
                        }
                    }

                    true
                }
            };

            if should_draw {
                _ = view_state.draw(&mut term);
            }
        }

        cancelled.store(true, Ordering::Release);
        let _ = event_loop_join_handle.join();

        crossterm::terminal::disable_raw_mode()?;
        crossterm::execute!(
            term.backend_mut(),
            crossterm::terminal::LeaveAlternateScreen,
        )?;

        term.show_cursor()?;

        Ok(())
    }
}

struct ViewState<'a> {
    command_in_focus: bool,
    command_view: CommandView<'a>,
    session_view: SessionView,
    tracking_table_view: TrackingTableView,
    tracking_view: TrackingView,
}

impl<'a> ViewState<'a> {
    fn draw(&self, term: &mut Terminal<impl Backend>) -> std::io::Result<()> {
        let mut effects = Effects::none();
        term.draw(|frame| {
            let layout = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(1),
                    Constraint::Length(3),
                    Constraint::Min(0),
                    Constraint::Length(7),
                ])
                .split(frame.area());

            let layout = &layout[1..];
            const DEFAULT_MARGINS: Margin = Margin::new(1, 1);

            self.session_view
                .draw(layout[0].inner(DEFAULT_MARGINS), frame);

            {
                let layout = Layout::default()
                    .direction(Direction::Horizontal)
                    .constraints([Constraint::Length(36), Constraint::Min(0)])
                    .split(layout[1]);

                {
                    let area = layout[0].inner(Margin::new(1, 0));
                    let block = Block::default()
                        .borders(Borders::ALL)
                        .border_type(BorderType::Rounded)
                        .title(" TRACKING ")
                        .white();

                    frame.render_widget(block, area);
                    self.tracking_table_view
                        .draw(area.inner(DEFAULT_MARGINS), frame);
                }

                {
                    let area = layout[1].inner(Margin::new(1, 0)).inner(Margin::new(2, 1));
                    self.tracking_view.draw(area, frame);
                }
            }

            {
                let area = layout[2].inner(DEFAULT_MARGINS);
                let block = Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .title(" COMMAND [/] · LAND [l] ")
                    .border_style(if self.command_in_focus {
                        Style::default().fg(Color::Yellow).bold()
                    } else {
                        Style::default().fg(Color::DarkGray)
                    });

                frame.render_widget(block, area);
                self.command_view.draw(
                    area.inner(DEFAULT_MARGINS),
                    frame,
                    &mut effects,
                    self.command_in_focus,
                );
            }
        })?;

        effects.apply(term);

        Ok(())
    }

    fn handle_user_event(&mut self, sink: &BridgeSink, event: Event) {
        match &event {
            Event::Key(KeyEvent {
                code: KeyCode::Esc, ..
            }) => {
                self.command_in_focus = false;
            }
            Event::Key(KeyEvent {
                code: KeyCode::Char('/'),
                ..
            }) if !self.command_in_focus || event_utils::is_nav_event(&event) => {
                self.command_in_focus = true;
            }
            Event::Key(KeyEvent {
                code: KeyCode::Char('l'),
                ..
            }) if !self.command_in_focus || event_utils::is_nav_event(&event) => {
                sink.broadcast(ClientBoundMessage::Land);
            }
            _ if self.command_in_focus => {
                self.command_view.handle_user_event(sink, event);
            }
            _ => {}
        }
    }

    fn handle_client_message(&mut self, msg: &ClientBoundMessage) -> bool {
        self.session_view.handle_client_message(msg);
        self.tracking_table_view.handle_client_message(msg);
        self.tracking_view.handle_client_message(msg);
        self.command_view.handle_client_message(msg);

        true
    }
}

pub struct BridgeSink {
    tx: crossbeam_channel::Sender<ServerBoundMessage>,
}

impl BridgeSink {
    pub fn send(&self, msg: ServerBoundMessage) {
        let _ = self.tx.send(msg);
    }

    pub fn broadcast(&self, msg: ClientBoundMessage) {
        self.send(ServerBoundMessage::Broadcast(msg))
    }
}

pub struct Effects {
    cursor_position: Option<(u16, u16)>,
}

impl Effects {
    pub fn none() -> Self {
        Self {
            cursor_position: None,
        }
    }

    pub fn set_cursor_position(&mut self, x: u16, y: u16) {
        self.cursor_position = Some((x, y));
    }

    pub fn apply(&self, term: &mut Terminal<impl Backend>) {
        match self.cursor_position {
            Some((x, y)) => {
                _ = term.show_cursor();
                _ = term.set_cursor_position(Position { x, y });
            }
            None => {
                _ = term.hide_cursor();
            }
        }
    }
}

pub mod event_utils {
    use crossterm::event::{Event, KeyEvent, KeyModifiers};

    pub fn is_nav_event(e: &Event) -> bool {
        matches!(e, Event::Key(KeyEvent { modifiers, .. }) if modifiers.contains(KeyModifiers::ALT))
    }
}
