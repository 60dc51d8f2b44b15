use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use crate::state::ParticipantId;

/// Reliable, ordered per-sender channel between participants.
pub trait Transport {
    fn send(&mut self, to: ParticipantId, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Everything received since the last poll, in arrival order.
    fn poll(&mut self) -> Vec<(ParticipantId, Vec<u8>)>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("no route to {0}")]
    UnknownPeer(ParticipantId),
    #[error("{0} disconnected")]
    Disconnected(ParticipantId),
}

type Envelope = (ParticipantId, Vec<u8>);
type Routes = Arc<Mutex<HashMap<ParticipantId, Sender<Envelope>>>>;

/// In-process switchboard. Every connected endpoint can reach every other.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    routes: Routes,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any endpoint already registered for `id`.
    pub fn connect(&self, id: ParticipantId) -> LoopbackTransport {
        let (sender, receiver) = mpsc::channel();
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, sender);
        LoopbackTransport {
            local: id,
            receiver,
            routes: Arc::clone(&self.routes),
        }
    }

    pub fn disconnect(&self, id: ParticipantId) -> bool {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn is_connected(&self, id: ParticipantId) -> bool {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }
}

#[derive(Debug)]
pub struct LoopbackTransport {
    local: ParticipantId,
    receiver: Receiver<Envelope>,
    routes: Routes,
}

impl LoopbackTransport {
    pub fn local_id(&self) -> ParticipantId {
        self.local
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, to: ParticipantId, bytes: Vec<u8>) -> Result<(), TransportError> {
        let routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = routes.get(&to).ok_or(TransportError::UnknownPeer(to))?;
        sender
            .send((self.local, bytes))
            .map_err(|_| TransportError::Disconnected(to))
    }

    fn poll(&mut self) -> Vec<(ParticipantId, Vec<u8>)> {
        self.receiver.try_iter().collect()
    }
}
