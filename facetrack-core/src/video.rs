use std::{
    fmt,
    io::Read,
    process::{Child, ChildStdout, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, PoisonError,
    },
    thread::JoinHandle,
    time::Instant,
};

use crossbeam::sync::ShardedLock;
use image::RgbImage;

use crate::error::{Error, Result};

const UDP_INPUT_TIMEOUT_US: u64 = 5_000_000;

/// Immutable snapshot of one decoded image. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image: Arc::new(image),
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Position in the stream, starting at zero for the first decoded frame.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

/// A blocking source of decoded images.
pub trait VideoCapture: Send {
    fn is_opened(&mut self) -> bool;

    fn reopen(&mut self) -> std::io::Result<()>;

    /// Blocks until the next image is decoded. `None` once the capture failed
    /// or closed.
    fn read(&mut self) -> Option<RgbImage>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    /// Network stream URL, e.g. `udp://192.168.10.1:11111`.
    Stream(String),
    /// Local camera index, used when flying without a drone.
    Camera(u32),
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureSource::Stream(url) => f.write_str(url),
            CaptureSource::Camera(index) => write!(f, "camera {}", index),
        }
    }
}

/// Decodes video with an `ffmpeg` child process producing raw RGB24 frames
/// scaled to a fixed size.
pub struct FfmpegCapture {
    source: CaptureSource,
    width: u32,
    height: u32,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
}

impl FfmpegCapture {
    /// Starts decoding. A failed start is not an error here: the capture
    /// simply reports itself as not opened.
    pub fn open(source: CaptureSource, (width, height): (u32, u32)) -> Self {
        let mut capture = Self {
            source,
            width,
            height,
            child: None,
            stdout: None,
        };

        if let Err(e) = capture.spawn() {
            tracing::warn!(source = %capture.source, error = %e, "failed to start ffmpeg");
        }

        capture
    }

    fn input_args(&self) -> Vec<String> {
        match &self.source {
            CaptureSource::Stream(url) => {
                let mut args: Vec<String> = Vec::new();
                if url.starts_with("udp://") {
                    // Bounds the wait for the first datagram, in microseconds
                    args.extend(["-timeout".into(), UDP_INPUT_TIMEOUT_US.to_string()]);
                }
                args.extend([
                    "-fflags".into(),
                    "nobuffer".into(),
                    "-flags".into(),
                    "low_delay".into(),
                    "-i".into(),
                    url.clone(),
                ]);
                args
            }
            #[cfg(target_os = "macos")]
            CaptureSource::Camera(index) => vec![
                "-f".into(),
                "avfoundation".into(),
                "-i".into(),
                index.to_string(),
            ],
            #[cfg(not(target_os = "macos"))]
            CaptureSource::Camera(index) => vec![
                "-f".into(),
                "v4l2".into(),
                "-i".into(),
                format!("/dev/video{}", index),
            ],
        }
    }

    fn spawn(&mut self) -> std::io::Result<()> {
        self.shutdown();

        // An empty frame reads successfully forever and never signals the end
        if self.width == 0 || self.height == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("frame size {}x{} is empty", self.width, self.height),
            ));
        }

        let mut child = std::process::Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error"])
            .args(self.input_args())
            .args(["-vf", &format!("scale={}:{}", self.width, self.height)])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        self.stdout = child.stdout.take();
        self.child = Some(child);

        tracing::debug!(source = %self.source, "ffmpeg started");
        Ok(())
    }

    fn shutdown(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            _ = child.kill();
            _ = child.wait();
        }
    }
}

impl VideoCapture for FfmpegCapture {
    fn is_opened(&mut self) -> bool {
        self.stdout.is_some()
            && self
                .child
                .as_mut()
                .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    fn reopen(&mut self) -> std::io::Result<()> {
        self.spawn()
    }

    fn read(&mut self) -> Option<RgbImage> {
        let stdout = self.stdout.as_mut()?;
        let mut buffer = vec![0u8; self.width as usize * self.height as usize * 3];
        if let Err(e) = stdout.read_exact(&mut buffer) {
            tracing::debug!(source = %self.source, error = %e, "ffmpeg output ended");
            return None;
        }

        RgbImage::from_raw(self.width, self.height, buffer)
    }

    fn describe(&self) -> String {
        self.source.to_string()
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Shared {
    latest: ShardedLock<Frame>,
    stopped: AtomicBool,
    ended: AtomicBool,
}

impl Shared {
    /// Publishes `frame` unless the source was stopped. Checked under the
    /// write lock so nothing lands after `stop` returns.
    fn publish(&self, frame: Frame) -> bool {
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }

        *latest = frame;
        true
    }

    fn stop(&self) {
        let _latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        self.stopped.store(true, Ordering::Release);
    }
}

/// Keeps the most recent frame of a capture available without blocking.
///
/// A background thread decodes continuously and swaps each new frame into a
/// single slot. Readers get whatever finished last.
pub struct FrameSource {
    shared: Arc<Shared>,
    pump: Option<JoinHandle<()>>,
    name: String,
}

impl FrameSource {
    pub fn open<C>(mut capture: C) -> Result<Self>
    where
        C: VideoCapture + 'static,
    {
        let name = capture.describe();

        if !capture.is_opened() {
            tracing::info!(source = %name, "capture not open, retrying once");
            if let Err(e) = capture.reopen() {
                return Err(Error::StreamUnavailable {
                    source_name: name,
                    reason: e.to_string(),
                });
            }
        }

        if !capture.is_opened() {
            return Err(Error::StreamUnavailable {
                source_name: name,
                reason: "capture did not open".into(),
            });
        }

        let Some(first) = capture.read() else {
            return Err(Error::StreamUnavailable {
                source_name: name,
                reason: "no frame could be decoded".into(),
            });
        };

        let shared = Arc::new(Shared {
            latest: ShardedLock::new(Frame::new(first, 0)),
            stopped: AtomicBool::new(false),
            ended: AtomicBool::new(false),
        });

        let pump = {
            let shared = shared.clone();
            let source_name = name.clone();
            std::thread::Builder::new()
                .name("frame-pump".into())
                .spawn(move || run_pump(capture, &shared, &source_name))
                .map_err(|e| Error::StreamUnavailable {
                    source_name: name.clone(),
                    reason: e.to_string(),
                })?
        };

        tracing::info!(source = %name, "frame source started");

        Ok(Self {
            shared,
            pump: Some(pump),
            name,
        })
    }

    pub fn latest(&self) -> Frame {
        self.shared
            .latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        !self.shared.stopped.load(Ordering::Acquire)
    }

    /// True when decoding failed mid-stream, as opposed to a requested stop.
    pub fn has_ended(&self) -> bool {
        self.shared.ended.load(Ordering::Acquire)
    }

    /// Asks the pump to exit after its current decode. Idempotent.
    pub fn stop(&self) {
        self.shared.stop();
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();

        if let Some(pump) = self.pump.take() {
            if pump.join().is_err() {
                tracing::error!(source = %self.name, "frame pump panicked");
            }
        }
    }
}

fn run_pump(mut capture: impl VideoCapture, shared: &Shared, name: &str) {
    let mut sequence = 0;

    while !shared.stopped.load(Ordering::Acquire) {
        let Some(image) = capture.read() else {
            tracing::warn!(source = name, frames = sequence, "video stream ended");
            shared.ended.store(true, Ordering::Release);
            shared.stop();
            break;
        };

        sequence += 1;
        if !shared.publish(Frame::new(image, sequence)) {
            break;
        }
    }

    tracing::debug!(source = name, "frame pump exited");
}

#[cfg(test)]
pub(crate) mod test {
    use std::{
        collections::VecDeque,
        sync::atomic::AtomicUsize,
        time::Duration,
    };

    use super::*;

    /// Replays a fixed list of images, then either ends or keeps producing
    /// blank frames forever.
    pub(crate) struct ScriptedCapture {
        pub opened: bool,
        pub opens_on_retry: bool,
        pub reopens: Arc<AtomicUsize>,
        pub frames: VecDeque<RgbImage>,
        pub endless: bool,
        pub interval: Duration,
    }

    impl ScriptedCapture {
        pub(crate) fn endless(width: u32, height: u32) -> Self {
            Self {
                opened: true,
                opens_on_retry: false,
                reopens: Arc::new(AtomicUsize::new(0)),
                frames: VecDeque::from([RgbImage::new(width, height)]),
                endless: true,
                interval: Duration::from_millis(2),
            }
        }

        pub(crate) fn finite(count: usize) -> Self {
            Self {
                frames: (0..count).map(|_| RgbImage::new(4, 4)).collect(),
                endless: false,
                ..Self::endless(4, 4)
            }
        }
    }

    impl VideoCapture for ScriptedCapture {
        fn is_opened(&mut self) -> bool {
            self.opened
        }

        fn reopen(&mut self) -> std::io::Result<()> {
            self.reopens.fetch_add(1, Ordering::SeqCst);
            self.opened = self.opens_on_retry;
            Ok(())
        }

        fn read(&mut self) -> Option<RgbImage> {
            std::thread::sleep(self.interval);
            match self.frames.pop_front() {
                Some(frame) => {
                    if self.endless {
                        self.frames.push_back(frame.clone());
                    }
                    Some(frame)
                }
                None => None,
            }
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_stream_input_args() {
        let capture = |url: &str| FfmpegCapture {
            source: CaptureSource::Stream(url.into()),
            width: 960,
            height: 720,
            child: None,
            stdout: None,
        };

        let args = capture("udp://192.168.10.1:11111").input_args();
        assert_eq!(args[..2], ["-timeout", "5000000"]);
        assert_eq!(args.last().map(String::as_str), Some("udp://192.168.10.1:11111"));

        let args = capture("rtsp://camera.local/stream").input_args();
        assert!(!args.iter().any(|arg| arg == "-timeout"));
    }

    #[test]
    fn test_empty_frame_size_is_unavailable() {
        let mut capture = FfmpegCapture::open(CaptureSource::Camera(0), (0, 720));
        assert!(!capture.is_opened());
        assert_eq!(
            capture.reopen().unwrap_err().kind(),
            std::io::ErrorKind::InvalidInput
        );
        assert!(capture.read().is_none());

        let result = FrameSource::open(capture);
        assert!(matches!(result, Err(Error::StreamUnavailable { .. })));
    }

    #[test]
    fn test_open_retries_once() {
        let capture = ScriptedCapture {
            opened: false,
            ..ScriptedCapture::endless(4, 4)
        };
        let reopens = capture.reopens.clone();

        let result = FrameSource::open(capture);
        assert!(matches!(result, Err(Error::StreamUnavailable { .. })));
        assert_eq!(reopens.load(Ordering::SeqCst), 1);

        let capture = ScriptedCapture {
            opened: false,
            opens_on_retry: true,
            ..ScriptedCapture::endless(4, 4)
        };
        assert!(FrameSource::open(capture).is_ok());
    }

    #[test]
    fn test_open_requires_a_first_frame() {
        let result = FrameSource::open(ScriptedCapture::finite(0));
        assert!(matches!(result, Err(Error::StreamUnavailable { .. })));
    }

    #[test]
    fn test_latest_advances() {
        let source = FrameSource::open(ScriptedCapture::endless(8, 6)).unwrap();
        let first = source.latest();
        assert_eq!(first.size(), (8, 6));

        wait_until(|| source.latest().sequence() > first.sequence());
        assert!(source.is_running());
    }

    #[test]
    fn test_no_updates_after_stop() {
        let source = FrameSource::open(ScriptedCapture::endless(4, 4)).unwrap();
        wait_until(|| source.latest().sequence() > 2);

        source.stop();
        source.stop();
        let frozen = source.latest().sequence();

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(source.latest().sequence(), frozen);
        assert!(!source.is_running());
        assert!(!source.has_ended());
    }

    #[test]
    fn test_stream_end_keeps_last_frame() {
        let source = FrameSource::open(ScriptedCapture::finite(3)).unwrap();
        wait_until(|| source.has_ended());

        assert!(!source.is_running());
        assert_eq!(source.latest().sequence(), 2);
        assert_eq!(source.latest().sequence(), 2);
    }
}
