use std::{
    fmt,
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crossbeam_channel::{RecvTimeoutError, Sender};

use crate::{
    command::Command,
    error::{Error, Result},
};

/// What callers see when the drone said nothing usable.
pub const NONE_RESPONSE: &str = "none_response";

pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(500);

const RECV_BUFFER_SIZE: usize = 3000;

// Upper bound on how long the responder takes to notice `close`.
const RESPONDER_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok(String),
    Timeout,
    Undecodable(Vec<u8>),
}

impl Response {
    fn decode(payload: Vec<u8>) -> Self {
        match String::from_utf8(payload) {
            Ok(text) => Response::Ok(text.trim_end().to_string()),
            Err(e) => Response::Undecodable(e.into_bytes()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Response::Ok(text) => text,
            Response::Timeout | Response::Undecodable(_) => NONE_RESPONSE,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

struct PendingCommand {
    id: u64,
    command: String,
    deadline: Instant,
    reply: Sender<Vec<u8>>,
}

struct Shared {
    socket: UdpSocket,
    drone: SocketAddr,
    pending: Mutex<Option<PendingCommand>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, Option<PendingCommand>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn clear_pending(&self, id: u64) {
        let mut pending = self.pending();
        if pending.as_ref().is_some_and(|p| p.id == id) {
            *pending = None;
        }
    }

    fn deliver(&self, payload: &[u8], from: SocketAddr) {
        if from != self.drone {
            tracing::debug!(%from, len = payload.len(), "dropping datagram from unknown sender");
            return;
        }

        let Some(pending) = self.pending().take() else {
            tracing::trace!(%from, len = payload.len(), "dropping unsolicited datagram");
            return;
        };

        if Instant::now() > pending.deadline {
            tracing::debug!(command = %pending.command, "response arrived after deadline");
            return;
        }

        tracing::trace!(command = %pending.command, %from, len = payload.len(), "response received");

        // Bounded(1) and single use, so this never blocks.
        _ = pending.reply.try_send(payload.to_vec());
    }

    fn respond(&self) {
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        while !self.closed.load(Ordering::Acquire) {
            match self.socket.recv_from(&mut buffer) {
                Ok((len, from)) => self.deliver(&buffer[..len], from),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read from drone socket");
                }
            }
        }

        tracing::debug!("responder loop exited");
    }
}

/// Owns the UDP socket to the drone and the background responder thread.
///
/// At most one blocking command can be in flight. A second call to
/// [`CommandChannel::send_and_await`] while the first is still waiting is
/// rejected with [`Error::ProtocolBusy`] rather than queued, so the caller
/// always knows which command a response belongs to.
pub struct CommandChannel {
    shared: Arc<Shared>,
    ack_timeout: Duration,
    responder: Option<JoinHandle<()>>,
}

impl CommandChannel {
    pub fn open(local: SocketAddr, drone: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local).map_err(|source| Error::Bind {
            addr: local,
            source,
        })?;
        socket.set_read_timeout(Some(RESPONDER_POLL_INTERVAL))?;

        let shared = Arc::new(Shared {
            socket,
            drone,
            pending: Mutex::new(None),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });

        let responder = {
            let shared = shared.clone();
            std::thread::Builder::new()
                .name("tello-responder".into())
                .spawn(move || shared.respond())?
        };

        tracing::info!(local = %shared.socket.local_addr()?, %drone, "command channel open");

        Ok(Self {
            shared,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            responder: Some(responder),
        })
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.shared.socket.local_addr()?)
    }

    pub fn drone_addr(&self) -> SocketAddr {
        self.shared.drone
    }

    /// Sends `command` and parks the caller until a response arrives or
    /// `timeout` elapses. A timeout is not an error: it yields
    /// [`Response::Timeout`].
    pub fn send_and_await(&self, command: &str, timeout: Duration) -> Result<Response> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut pending = self.shared.pending();
            if let Some(outstanding) = pending.as_ref() {
                tracing::debug!(command, outstanding = %outstanding.command, "channel busy");
                return Err(Error::ProtocolBusy);
            }

            *pending = Some(PendingCommand {
                id,
                command: command.to_string(),
                deadline: Instant::now() + timeout,
                reply: tx,
            });
        }

        if let Err(e) = self.shared.socket.send_to(command.as_bytes(), self.shared.drone) {
            self.shared.clear_pending(id);
            return Err(e.into());
        }

        tracing::debug!(command, "sent, awaiting response");

        let response = match rx.recv_timeout(timeout) {
            Ok(payload) => Response::decode(payload),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                tracing::warn!(command, ?timeout, "no response from drone");
                Response::Timeout
            }
        };

        self.shared.clear_pending(id);

        Ok(response)
    }

    pub fn send_fire_and_forget(&self, command: &str) -> Result<()> {
        self.shared.socket.send_to(command.as_bytes(), self.shared.drone)?;
        tracing::trace!(command, "sent");
        Ok(())
    }

    /// Sends a typed command, waiting for the acknowledgement only when the
    /// protocol defines one.
    pub fn execute(&self, command: &Command) -> Result<Option<Response>> {
        let text = command.to_string();
        if command.expects_reply() {
            self.send_and_await(&text, self.ack_timeout).map(Some)
        } else {
            self.send_fire_and_forget(&text).map(|_| None)
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stops the responder and waits for it. Safe to call more than once.
    pub fn close(&mut self) {
        self.shared.closed.store(true, Ordering::Release);

        if let Some(responder) = self.responder.take() {
            if responder.join().is_err() {
                tracing::error!("responder thread panicked");
            }
            tracing::info!(drone = %self.shared.drone, "command channel closed");
        }
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        self.close();
    }
}
