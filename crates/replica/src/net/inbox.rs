use std::collections::VecDeque;

use log::warn;

use crate::state::ParticipantId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPacket {
    pub from: ParticipantId,
    pub received_ms: u64,
    pub bytes: Vec<u8>,
}

/// Packets received off the transport, held until the next tick drains them.
#[derive(Debug)]
pub struct Inbox {
    pending: VecDeque<InboundPacket>,
    warn_threshold: usize,
    warned: bool,
}

impl Inbox {
    pub fn new(warn_threshold: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            warn_threshold,
            warned: false,
        }
    }

    pub fn push(&mut self, from: ParticipantId, received_ms: u64, bytes: Vec<u8>) {
        self.pending.push_back(InboundPacket {
            from,
            received_ms,
            bytes,
        });

        if self.pending.len() > self.warn_threshold && !self.warned {
            warn!(
                "Inbox backlog at {} packets (threshold {})",
                self.pending.len(),
                self.warn_threshold
            );
            self.warned = true;
        }
    }

    /// Takes everything queued so far in arrival order.
    pub fn drain(&mut self) -> Vec<InboundPacket> {
        self.warned = false;
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_arrival_order_once() {
        let mut inbox = Inbox::new(16);
        inbox.push(ParticipantId(2), 5, vec![1]);
        inbox.push(ParticipantId(3), 6, vec![2]);

        let drained = inbox.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].from, ParticipantId(2));
        assert_eq!(drained[1].bytes, vec![2]);
        assert!(inbox.is_empty());
        assert!(inbox.drain().is_empty());
    }
}
