use crossbeam_channel::TryRecvError;
use tello::{Command, Response};

use crate::{
    session::{ControlRequest, SessionObserver, SessionState},
    types::{ClientBoundMessage, ServerBoundMessage, TrackingUpdate},
};

/// Routes messages between client threads. Every broadcast reaches every
/// client; a `Shutdown` from anyone stops them all.
pub struct Hub {
    clients: Vec<ClientHandle>,
    rx: crossbeam_channel::Receiver<ServerBoundMessage>,
    tx: crossbeam_channel::Sender<ServerBoundMessage>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Hub {
            clients: Vec::new(),
            rx,
            tx,
        }
    }

    pub fn spawn_client(&mut self, id: &'static str, f: impl FnOnce(Bridge) + Send + 'static) {
        let (client_tx, client_rx) = crossbeam_channel::unbounded();
        let bridge = Bridge {
            rx: client_rx,
            tx: self.tx.clone(),
        };

        match std::thread::Builder::new()
            .name(id.into())
            .spawn(move || f(bridge))
        {
            Ok(join_handle) => self.clients.push(ClientHandle {
                id,
                join_handle,
                tx: client_tx,
            }),
            Err(e) => tracing::error!(client = id, error = %e, "failed to spawn client"),
        }
    }

    pub fn run(self) {
        tracing::debug!(clients = self.clients.len(), "hub running");

        if !self.clients.is_empty() {
            loop {
                match self.rx.recv() {
                    Ok(ServerBoundMessage::Broadcast(message)) => {
                        self.post_to_all_clients(message);
                    }
                    Ok(ServerBoundMessage::Shutdown) => {
                        tracing::info!("shutdown requested");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "hub channel closed");
                        break;
                    }
                }
            }
        }

        self.post_to_all_clients(ClientBoundMessage::Shutdown);
        for client in self.clients {
            if client.join_handle.join().is_err() {
                tracing::error!(client = client.id, "client panicked");
            }
        }

        tracing::debug!("hub stopped");
    }

    fn post_to_all_clients(&self, message: ClientBoundMessage) {
        for client in &self.clients {
            _ = client.tx.send(message.clone());
        }
    }
}

/// A client's end of the hub.
pub struct Bridge {
    rx: crossbeam_channel::Receiver<ClientBoundMessage>,
    tx: crossbeam_channel::Sender<ServerBoundMessage>,
}

impl Bridge {
    pub fn into_inner(
        self,
    ) -> (
        crossbeam_channel::Receiver<ClientBoundMessage>,
        crossbeam_channel::Sender<ServerBoundMessage>,
    ) {
        (self.rx, self.tx)
    }

    pub fn send(&self, message: ServerBoundMessage) {
        if self.tx.send(message).is_err() {
            tracing::debug!("hub is gone, dropping message");
        }
    }

    pub fn broadcast(&self, message: ClientBoundMessage) {
        self.send(ServerBoundMessage::Broadcast(message));
    }

    /// Blocks for the next message. A closed hub reads as `Shutdown`.
    pub fn recv(&self) -> ClientBoundMessage {
        self.rx.recv().unwrap_or(ClientBoundMessage::Shutdown)
    }

    /// Never blocks. A closed hub reads as `Shutdown`.
    pub fn try_recv(&self) -> Option<ClientBoundMessage> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(ClientBoundMessage::Shutdown),
        }
    }
}

/// Lets a flight session run as a hub client: progress is broadcast, and
/// `Land`, `Shutdown` and manual movements from other clients steer it.
impl SessionObserver for Bridge {
    fn poll(&mut self) -> Option<ControlRequest> {
        while let Some(message) = self.try_recv() {
            match message {
                ClientBoundMessage::Shutdown | ClientBoundMessage::Land => {
                    return Some(ControlRequest::Land);
                }
                ClientBoundMessage::ManualMovement(movement) => {
                    return Some(ControlRequest::Move(movement));
                }
                // Our own broadcasts come back around
                _ => {}
            }
        }

        None
    }

    fn on_state(&mut self, state: SessionState) {
        self.broadcast(ClientBoundMessage::UpdateSessionState(state));
    }

    fn on_tracking(&mut self, update: &TrackingUpdate) {
        self.broadcast(ClientBoundMessage::UpdateTracking(update.clone()));
    }

    fn on_acknowledged(&mut self, command: &Command, response: &Response) {
        self.broadcast(ClientBoundMessage::CommandAcknowledged {
            command: *command,
            response: response.text().to_string(),
        });
    }
}

struct ClientHandle {
    id: &'static str,
    join_handle: std::thread::JoinHandle<()>,
    tx: crossbeam_channel::Sender<ClientBoundMessage>,
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut hub = Hub::new();

        hub.spawn_client("c1", move |bridge| loop {
            if let ClientBoundMessage::Shutdown = bridge.recv() {
                break;
            }
        });

        hub.spawn_client("c2", move |bridge| {
            bridge.send(ServerBoundMessage::Shutdown);
            loop {
                if let ClientBoundMessage::Shutdown = bridge.recv() {
                    break;
                }
            }
        });

        hub.run();
    }

    #[test]
    fn test_broadcast_reaches_other_clients() {
        let (seen_tx, seen_rx) = crossbeam_channel::unbounded();
        let mut hub = Hub::new();

        hub.spawn_client("listener", move |bridge| loop {
            match bridge.recv() {
                ClientBoundMessage::Shutdown => break,
                ClientBoundMessage::Land => {
                    _ = seen_tx.send(());
                    bridge.send(ServerBoundMessage::Shutdown);
                }
                _ => {}
            }
        });

        hub.spawn_client("speaker", move |bridge| {
            bridge.broadcast(ClientBoundMessage::Land);
            while !matches!(bridge.recv(), ClientBoundMessage::Shutdown) {}
        });

        hub.run();
        assert!(seen_rx.recv_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_bridge_steers_session() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (hub_tx, hub_rx) = crossbeam_channel::unbounded();
        let mut bridge = Bridge { rx, tx: hub_tx };

        tx.send(ClientBoundMessage::UpdateSessionState(SessionState::Airborne))
            .unwrap();
        tx.send(ClientBoundMessage::ManualMovement(tello::Movement::Up(40)))
            .unwrap();
        tx.send(ClientBoundMessage::Land).unwrap();

        assert_eq!(
            bridge.poll(),
            Some(ControlRequest::Move(tello::Movement::Up(40)))
        );
        assert_eq!(bridge.poll(), Some(ControlRequest::Land));
        assert_eq!(bridge.poll(), None);

        bridge.on_state(SessionState::Landing);
        assert!(matches!(
            hub_rx.try_recv(),
            Ok(ServerBoundMessage::Broadcast(
                ClientBoundMessage::UpdateSessionState(SessionState::Landing)
            ))
        ));
    }

    #[test]
    fn test_try_recv_on_closed_hub() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (hub_tx, _hub_rx) = crossbeam_channel::unbounded();
        let bridge = Bridge { rx, tx: hub_tx };

        assert!(bridge.try_recv().is_none());
        drop(tx);
        assert!(matches!(
            bridge.try_recv(),
            Some(ClientBoundMessage::Shutdown)
        ));
    }
}
