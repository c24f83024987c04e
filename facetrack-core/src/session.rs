use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tello::{Command, Movement, Response};

use crate::{
    config::Config,
    controller::PositionController,
    detect::{select_subject, Detector, Offset},
    error::{Error, Result},
    link::DroneLink,
    types::TrackingUpdate,
    video::{Frame, FrameSource, VideoCapture},
};

/// Lifecycle of a flight. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected,
    Airborne,
    Landing,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Land,
    Move(Movement),
}

/// Hooks into a running session. `poll` is called on every loop iteration
/// and must not block.
pub trait SessionObserver {
    fn poll(&mut self) -> Option<ControlRequest> {
        None
    }

    fn on_state(&mut self, _state: SessionState) {}

    fn on_tracking(&mut self, _update: &TrackingUpdate) {}

    fn on_acknowledged(&mut self, _command: &Command, _response: &Response) {}
}

impl SessionObserver for () {}

/// Requests a landing from any thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl SessionObserver for StopHandle {
    fn poll(&mut self) -> Option<ControlRequest> {
        self.is_stop_requested().then_some(ControlRequest::Land)
    }
}

/// One flight: handshake, visual tracking, landing.
///
/// Dropping a session that is still airborne lands it; dropping it in any
/// other state releases the link and the video source.
pub struct FlightSession<L: DroneLink, O: SessionObserver> {
    config: Config,
    state: SessionState,
    link: Option<L>,
    frames: Option<FrameSource>,
    controller: PositionController,
    observer: O,
    failure: Option<String>,
    last_sequence: Option<u64>,
}

impl<L: DroneLink, O: SessionObserver> FlightSession<L, O> {
    pub fn new(config: Config, observer: O) -> Self {
        let controller = PositionController::new(config.controller.clone());
        Self {
            config,
            state: SessionState::Idle,
            link: None,
            frames: None,
            controller,
            observer,
            failure: None,
            last_sequence: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Why the session aborted, if it did.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn connect(&mut self, open: impl FnOnce() -> tello::Result<L>) -> Result<()> {
        self.expect_state("connect", SessionState::Idle)?;

        match open() {
            Ok(link) => {
                self.link = Some(link);
                self.transition(SessionState::Connected);
                Ok(())
            }
            Err(e) => Err(self.abort(e.into())),
        }
    }

    /// Puts the drone in SDK mode, starts video, takes off and climbs.
    ///
    /// Video is opened before takeoff so a missing stream aborts with the
    /// drone still on the ground. A stop request seen before `takeoff` ends
    /// the session with [`Error::Cancelled`].
    pub fn take_off<C>(&mut self, capture: C) -> Result<()>
    where
        C: VideoCapture + 'static,
    {
        self.expect_state("take off", SessionState::Connected)?;

        match self.start(capture) {
            Ok(()) => {}
            Err(Error::Cancelled) => {
                tracing::info!("stop requested before takeoff");
                self.release();
                self.transition(SessionState::Ended);
                return Err(Error::Cancelled);
            }
            Err(e) => return Err(self.abort(e)),
        }

        self.transition(SessionState::Airborne);

        if self.config.initial_climb_cm > 0 {
            match Movement::up(self.config.initial_climb_cm) {
                Ok(climb) => self.fire(climb),
                Err(e) => tracing::warn!(error = %e, "skipping initial climb"),
            }
        }

        Ok(())
    }

    fn start<C>(&mut self, capture: C) -> Result<()>
    where
        C: VideoCapture + 'static,
    {
        self.acknowledge(Command::Command)?;
        self.acknowledge(Command::StreamOn)?;
        self.frames = Some(FrameSource::open(capture)?);

        if self.stop_requested() {
            return Err(Error::Cancelled);
        }

        self.acknowledge(Command::Takeoff)?;
        Ok(())
    }

    /// Drains pending requests while still on the ground. Movements make no
    /// sense there and are discarded.
    fn stop_requested(&mut self) -> bool {
        while let Some(request) = self.observer.poll() {
            match request {
                ControlRequest::Land => return true,
                ControlRequest::Move(movement) => {
                    tracing::warn!(%movement, "ignoring movement before takeoff");
                }
            }
        }

        false
    }

    /// Tracks until the observer asks to land or the video stream ends, then
    /// lands. A stream failure is returned after landing.
    pub fn run<D: Detector>(&mut self, detector: &mut D) -> Result<()> {
        self.expect_state("run", SessionState::Airborne)?;

        let outcome = 'control: loop {
            while let Some(request) = self.observer.poll() {
                match request {
                    ControlRequest::Land => break 'control Ok(()),
                    ControlRequest::Move(movement) => self.fire(movement),
                }
            }

            let Some(frames) = self.frames.as_ref() else {
                break Err(Error::StreamEnded);
            };

            if frames.has_ended() {
                break Err(Error::StreamEnded);
            }

            let frame = frames.latest();
            if self.last_sequence == Some(frame.sequence()) {
                std::thread::sleep(self.config.idle_wait);
                continue;
            }
            self.last_sequence = Some(frame.sequence());

            let update = self.track(&frame, detector);
            for movement in &update.movements {
                self.fire(*movement);
            }
            self.observer.on_tracking(&update);
        };

        if let Err(e) = &outcome {
            tracing::error!(error = %e, "tracking stopped");
            self.failure = Some(e.to_string());
        }

        let landed = self.land();
        outcome.and(landed)
    }

    fn track<D: Detector>(&self, frame: &Frame, detector: &mut D) -> TrackingUpdate {
        let detections = detector.detect(frame);
        let subject = select_subject(&detections);
        let offset = Offset::from_subject(
            frame.size(),
            subject.as_ref(),
            self.controller.config().vertical_bias,
        );
        let movements = self.controller.correct(&offset);

        tracing::trace!(
            frame = frame.sequence(),
            detections = detections.len(),
            ?offset,
            ?movements,
            "tick"
        );

        TrackingUpdate {
            frame: frame.sequence(),
            frame_size: frame.size(),
            detections: detections.len(),
            subject,
            offset,
            movements,
        }
    }

    /// Lands the drone, then releases video and the link.
    pub fn land(&mut self) -> Result<()> {
        match self.state {
            SessionState::Airborne => {}
            SessionState::Ended => return Ok(()),
            state => {
                return Err(Error::InvalidState {
                    operation: "land",
                    state,
                })
            }
        }

        self.transition(SessionState::Landing);

        let landed = self.acknowledge(Command::Land);
        if landed.is_ok() {
            if let Ok(response) = self.acknowledge(Command::Battery) {
                tracing::info!(battery = response.text(), "battery level");
            }
        }

        self.release();
        self.transition(SessionState::Ended);

        landed.map(|_| ())
    }

    /// Ends the session from any state, landing first when airborne.
    pub fn end(&mut self) -> Result<()> {
        match self.state {
            SessionState::Airborne => self.land(),
            SessionState::Ended => Ok(()),
            _ => {
                self.release();
                self.transition(SessionState::Ended);
                Ok(())
            }
        }
    }

    fn acknowledge(&mut self, command: Command) -> Result<Response> {
        let Some(link) = self.link.as_ref() else {
            return Err(Error::InvalidState {
                operation: "send commands",
                state: self.state,
            });
        };

        let response = link.send_and_await(&command, link.ack_timeout())?;
        if response.is_ok() {
            tracing::info!(%command, %response, "acknowledged");
        } else {
            // The drone usually acted anyway; carry on.
            tracing::warn!(%command, "no acknowledgement");
        }

        self.observer.on_acknowledged(&command, &response);
        Ok(response)
    }

    fn fire(&mut self, movement: Movement) {
        let Some(link) = self.link.as_ref() else {
            return;
        };

        let movement = match movement.validated() {
            Ok(movement) => movement,
            Err(e) => {
                tracing::warn!(%movement, error = %e, "refusing out-of-range movement");
                return;
            }
        };

        let command = Command::Move(movement);
        if let Err(e) = link.send_fire_and_forget(&command) {
            tracing::warn!(%command, error = %e, "failed to send movement");
        }
    }

    fn abort(&mut self, error: Error) -> Error {
        tracing::error!(error = %error, state = ?self.state, "session aborted");
        self.failure = Some(error.to_string());
        self.release();
        self.transition(SessionState::Ended);
        error
    }

    fn release(&mut self) {
        if let Some(frames) = self.frames.take() {
            frames.stop();
        }

        if let Some(mut link) = self.link.take() {
            link.close();
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }

        tracing::info!(from = ?self.state, to = ?next, "session state");
        self.state = next;
        self.observer.on_state(next);
    }

    fn expect_state(&self, operation: &'static str, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

impl<L: DroneLink, O: SessionObserver> Drop for FlightSession<L, O> {
    fn drop(&mut self) {
        if let Err(e) = self.end() {
            tracing::warn!(error = %e, "failed to end session cleanly");
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        collections::VecDeque,
        io,
        sync::Mutex,
        time::Duration,
    };

    use super::*;
    use crate::{
        detect::{BoundingBox, NoDetector},
        video::test::ScriptedCapture,
    };

    #[derive(Clone, Default)]
    struct RecordingLink {
        sent: Arc<Mutex<Vec<String>>>,
        fail_on: Option<&'static str>,
        silent: bool,
    }

    impl RecordingLink {
        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        fn record(&self, command: &Command) -> tello::Result<()> {
            let text = command.to_string();
            if self.fail_on == Some(text.as_str()) {
                return Err(io::Error::new(io::ErrorKind::Other, "unreachable").into());
            }
            self.sent.lock().unwrap().push(text);
            Ok(())
        }
    }

    impl DroneLink for RecordingLink {
        fn send_and_await(&self, command: &Command, _: Duration) -> tello::Result<Response> {
            self.record(command)?;
            Ok(if self.silent {
                Response::Timeout
            } else if *command == Command::Battery {
                Response::Ok("87".into())
            } else {
                Response::Ok("ok".into())
            })
        }

        fn send_fire_and_forget(&self, command: &Command) -> tello::Result<()> {
            self.record(command)
        }

        fn ack_timeout(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn close(&mut self) {}
    }

    #[derive(Default)]
    struct Record {
        states: Vec<SessionState>,
        updates: Vec<TrackingUpdate>,
        requests: VecDeque<ControlRequest>,
    }

    /// Lands after a fixed number of tracked frames. Zero never lands.
    #[derive(Clone, Default)]
    struct Recorder {
        record: Arc<Mutex<Record>>,
        land_after: usize,
    }

    impl SessionObserver for Recorder {
        fn poll(&mut self) -> Option<ControlRequest> {
            let mut record = self.record.lock().unwrap();
            if let Some(request) = record.requests.pop_front() {
                return Some(request);
            }
            (self.land_after > 0 && record.updates.len() >= self.land_after)
                .then_some(ControlRequest::Land)
        }

        fn on_state(&mut self, state: SessionState) {
            self.record.lock().unwrap().states.push(state);
        }

        fn on_tracking(&mut self, update: &TrackingUpdate) {
            self.record.lock().unwrap().updates.push(update.clone());
        }
    }

    fn airborne(
        link: &RecordingLink,
        recorder: &Recorder,
    ) -> FlightSession<RecordingLink, Recorder> {
        let mut session = FlightSession::new(Config::default(), recorder.clone());
        session.connect(|| Ok(link.clone())).unwrap();
        session
            .take_off(ScriptedCapture::endless(960, 720))
            .unwrap();
        session
    }

    fn movements(sent: &[String]) -> Vec<String> {
        sent.iter()
            .filter(|text| text.parse::<Movement>().is_ok())
            .cloned()
            .collect()
    }

    #[test]
    fn test_handshake_order() {
        let link = RecordingLink::default();
        let recorder = Recorder::default();
        let session = airborne(&link, &recorder);

        assert_eq!(session.state(), SessionState::Airborne);
        assert_eq!(link.sent(), ["command", "streamon", "takeoff", "up 160"]);
        assert_eq!(
            recorder.record.lock().unwrap().states,
            [SessionState::Connected, SessionState::Airborne]
        );
    }

    #[test]
    fn test_missing_acknowledgements_are_tolerated() {
        let link = RecordingLink {
            silent: true,
            ..RecordingLink::default()
        };
        let session = airborne(&link, &Recorder::default());
        assert_eq!(session.state(), SessionState::Airborne);
    }

    #[test]
    fn test_connect_failure_ends_session() {
        let mut session: FlightSession<RecordingLink, ()> =
            FlightSession::new(Config::default(), ());

        let result = session.connect(|| {
            Err(tello::Error::Transport(io::Error::new(
                io::ErrorKind::AddrInUse,
                "taken",
            )))
        });

        assert!(matches!(result, Err(Error::Link(_))));
        assert_eq!(session.state(), SessionState::Ended);
        assert!(session.failure().is_some());
        assert!(matches!(
            session.take_off(ScriptedCapture::endless(4, 4)),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn test_missing_stream_aborts_before_takeoff() {
        let link = RecordingLink::default();
        let mut session = FlightSession::new(Config::default(), ());
        session.connect(|| Ok(link.clone())).unwrap();

        let result = session.take_off(ScriptedCapture::finite(0));

        assert!(matches!(result, Err(Error::StreamUnavailable { .. })));
        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(link.sent(), ["command", "streamon"]);
    }

    #[test]
    fn test_transport_failure_during_handshake() {
        let link = RecordingLink {
            fail_on: Some("streamon"),
            ..RecordingLink::default()
        };
        let mut session = FlightSession::new(Config::default(), ());
        session.connect(|| Ok(link.clone())).unwrap();

        assert!(matches!(
            session.take_off(ScriptedCapture::endless(4, 4)),
            Err(Error::Link(_))
        ));
        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(link.sent(), ["command"]);
    }

    #[test]
    fn test_tracking_sends_corrections_then_lands() {
        let link = RecordingLink::default();
        let recorder = Recorder {
            land_after: 3,
            ..Recorder::default()
        };
        let mut session = airborne(&link, &recorder);

        // Far left of the 960x720 frame and small: turn left, move closer
        let mut detector = |_: &Frame| vec![BoundingBox::new(100, 330, 100, 120)];
        session.run(&mut detector).unwrap();

        assert_eq!(session.state(), SessionState::Ended);

        let sent = link.sent();
        assert_eq!(&sent[sent.len() - 2..], ["land", "battery?"]);

        let moves = movements(&sent);
        assert_eq!(moves[0], "up 160");
        assert!(moves.len() >= 7);
        assert!(moves[1..]
            .chunks(2)
            .all(|pair| pair == ["ccw 10", "forward 20"]));

        let record = recorder.record.lock().unwrap();
        assert!(record.updates.len() >= 3);
        assert_eq!(
            record.updates[0].offset,
            Offset {
                x: -330,
                y: 0,
                area: 12_000
            }
        );
        assert_eq!(
            record.states.last(),
            Some(&SessionState::Ended)
        );
        assert!(record.states.contains(&SessionState::Landing));
    }

    #[test]
    fn test_no_detection_means_no_movement() {
        let link = RecordingLink::default();
        let recorder = Recorder {
            land_after: 5,
            ..Recorder::default()
        };
        let mut session = airborne(&link, &recorder);

        session.run(&mut NoDetector).unwrap();

        assert_eq!(movements(&link.sent()), ["up 160"]);
        let record = recorder.record.lock().unwrap();
        assert!(record
            .updates
            .iter()
            .all(|update| update.offset == Offset::NONE && update.movements.is_empty()));
    }

    #[test]
    fn test_detections_do_not_persist() {
        let link = RecordingLink::default();
        let recorder = Recorder {
            land_after: 4,
            ..Recorder::default()
        };
        let mut session = airborne(&link, &recorder);

        let mut calls = 0;
        let mut detector = |_: &Frame| {
            calls += 1;
            if calls == 1 {
                vec![BoundingBox::new(800, 330, 100, 120)]
            } else {
                Vec::new()
            }
        };
        session.run(&mut detector).unwrap();

        assert_eq!(
            movements(&link.sent()),
            ["up 160", "cw 10", "forward 20"]
        );
    }

    #[test]
    fn test_manual_movement_requests() {
        let link = RecordingLink::default();
        let recorder = Recorder {
            land_after: 1,
            ..Recorder::default()
        };
        let mut session = airborne(&link, &recorder);
        recorder
            .record
            .lock()
            .unwrap()
            .requests
            .push_back(ControlRequest::Move(Movement::Left(30)));

        session.run(&mut NoDetector).unwrap();

        assert_eq!(movements(&link.sent()), ["up 160", "left 30"]);
    }

    #[test]
    fn test_out_of_range_manual_movement_is_not_sent() {
        let link = RecordingLink::default();
        let recorder = Recorder {
            land_after: 1,
            ..Recorder::default()
        };
        let mut session = airborne(&link, &recorder);
        {
            let mut record = recorder.record.lock().unwrap();
            record.requests.push_back(ControlRequest::Move(Movement::Up(5)));
            record
                .requests
                .push_back(ControlRequest::Move(Movement::Clockwise(400)));
        }

        session.run(&mut NoDetector).unwrap();

        assert_eq!(
            link.sent(),
            ["command", "streamon", "takeoff", "up 160", "land", "battery?"]
        );
    }

    #[test]
    fn test_stop_during_handshake_skips_takeoff() {
        let link = RecordingLink::default();
        let recorder = Recorder::default();
        recorder
            .record
            .lock()
            .unwrap()
            .requests
            .push_back(ControlRequest::Land);
        let mut session = FlightSession::new(Config::default(), recorder.clone());
        session.connect(|| Ok(link.clone())).unwrap();

        let result = session.take_off(ScriptedCapture::endless(4, 4));

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(link.sent(), ["command", "streamon"]);
        assert!(!recorder
            .record
            .lock()
            .unwrap()
            .states
            .contains(&SessionState::Airborne));
    }

    #[test]
    fn test_stream_end_lands() {
        let link = RecordingLink::default();
        let mut session = FlightSession::new(Config::default(), ());
        session.connect(|| Ok(link.clone())).unwrap();
        session.take_off(ScriptedCapture::finite(3)).unwrap();

        let result = session.run(&mut NoDetector);

        assert!(matches!(result, Err(Error::StreamEnded)));
        assert_eq!(session.state(), SessionState::Ended);
        assert!(session.failure().is_some());
        assert_eq!(link.sent().last().map(String::as_str), Some("battery?"));
    }

    #[test]
    fn test_stop_handle() {
        let link = RecordingLink::default();
        let stop = StopHandle::new();
        let mut session = FlightSession::new(Config::default(), stop.clone());
        session.connect(|| Ok(link.clone())).unwrap();
        session
            .take_off(ScriptedCapture::endless(4, 4))
            .unwrap();

        stop.request_stop();
        session.run(&mut NoDetector).unwrap();
        assert_eq!(session.state(), SessionState::Ended);
    }

    #[test]
    fn test_drop_lands_airborne_session() {
        let link = RecordingLink::default();
        {
            let _session = airborne(&link, &Recorder::default());
        }
        assert_eq!(link.sent().last().map(String::as_str), Some("battery?"));
        assert!(link.sent().contains(&"land".to_string()));
    }

    #[test]
    fn test_land_is_idempotent_once_ended() {
        let link = RecordingLink::default();
        let mut session = airborne(&link, &Recorder::default());

        session.land().unwrap();
        session.land().unwrap();
        assert_eq!(
            link.sent().iter().filter(|text| *text == "land").count(),
            1
        );
    }

    #[test]
    fn test_land_requires_flight() {
        let mut session: FlightSession<RecordingLink, ()> =
            FlightSession::new(Config::default(), ());
        assert!(matches!(
            session.land(),
            Err(Error::InvalidState {
                state: SessionState::Idle,
                ..
            })
        ));
    }
}
