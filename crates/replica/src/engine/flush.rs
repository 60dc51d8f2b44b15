use log::{error, warn};

use crate::clock::Clock;
use crate::codec::{write_delta, write_full};
use crate::lifecycle::InstanceId;
use crate::net::{Message, Packet, PacketHeader, Transport};
use crate::rpc::{BufferedCall, ReceiverSet};
use crate::state::{ParticipantId, ReplicatedObject, Role};

use super::{EngineEvent, Outgoing, ReplicationEngine};

fn create_message(object: &ReplicatedObject) -> Message {
    Message::Create {
        instance_id: object.id().0,
        schema_id: object.schema().id().0,
        creator: object.creator().0,
        snapshot: write_full(object.schema(), &object.authoritative_values()),
    }
}

impl<T: Transport, C: Clock> ReplicationEngine<T, C> {
    /// Sends queued operations in the order they were made, then one delta per
    /// dirty object.
    pub(super) fn flush(&mut self) {
        for op in std::mem::take(&mut self.outbox) {
            match op {
                Outgoing::Create(instance) => self.flush_create(instance),
                Outgoing::Rpc {
                    instance,
                    receivers,
                    owner,
                    body,
                } => self.flush_rpc(instance, receivers, owner, body),
                Outgoing::Destroy(instance) => {
                    let targets = self.broadcast_targets();
                    self.send_message(
                        &targets,
                        self.local,
                        Message::Destroy {
                            instance_id: instance.0,
                        },
                    );
                }
            }
        }
        self.flush_deltas();
    }

    fn flush_create(&mut self, instance: InstanceId) {
        let Some(object) = self.objects.get_mut(&instance) else {
            return;
        };
        let message = create_message(object);
        object.clear_dirty();
        object.mark_announced();

        let targets = self.broadcast_targets();
        self.send_message(&targets, self.local, message);
    }

    fn flush_rpc(
        &mut self,
        instance: InstanceId,
        receivers: ReceiverSet,
        owner: ParticipantId,
        body: Vec<u8>,
    ) {
        if !self.objects.contains_key(&instance) {
            return;
        }
        let targets = match self.role {
            Role::Client { .. } if receivers == ReceiverSet::Owner && owner == self.local => {
                Vec::new()
            }
            Role::Client { server } => vec![server],
            Role::Server => match receivers {
                ReceiverSet::Server => Vec::new(),
                ReceiverSet::Owner if owner != self.local && self.peers.contains(&owner) => {
                    vec![owner]
                }
                ReceiverSet::Owner => Vec::new(),
                _ => self.broadcast_targets(),
            },
        };

        self.send_message(
            &targets,
            self.local,
            Message::Rpc {
                receivers: receivers.into(),
                call: body.clone(),
            },
        );

        if self.role.is_server() && receivers.is_buffered() {
            self.rpc.buffer(BufferedCall {
                instance,
                receivers,
                origin: self.local,
                body,
            });
        }
    }

    fn flush_deltas(&mut self) {
        let mut updates = Vec::new();
        for object in self.objects.values_mut() {
            if !object.is_announced() {
                continue;
            }
            if let Some(mask) = object.take_dirty() {
                updates.push(Message::Update {
                    instance_id: object.id().0,
                    delta: write_delta(object.schema(), &mask, &object.authoritative_values()),
                });
            }
        }

        let targets = self.broadcast_targets();
        for message in updates {
            self.stats.deltas_sent += 1;
            self.send_message(&targets, self.local, message);
        }
    }

    /// Brings a newly connected participant up to date: every announced
    /// object, then the buffered calls in the order they were made.
    pub(super) fn bootstrap(&mut self, participant: ParticipantId) {
        let creates: Vec<Message> = self
            .objects
            .values()
            .filter(|object| object.is_announced())
            .map(create_message)
            .collect();
        let buffered: Vec<(ParticipantId, Message)> = self
            .rpc
            .buffered()
            .filter(|call| self.objects.contains_key(&call.instance))
            .map(|call| {
                (
                    call.origin,
                    Message::Rpc {
                        receivers: call.receivers.into(),
                        call: call.body.clone(),
                    },
                )
            })
            .collect();

        for message in creates {
            self.send_message(&[participant], self.local, message);
        }
        for (origin, message) in buffered {
            self.send_message(&[participant], origin, message);
        }
    }

    fn broadcast_targets(&self) -> Vec<ParticipantId> {
        self.peers.iter().copied().collect()
    }

    fn send_message(&mut self, targets: &[ParticipantId], origin: ParticipantId, message: Message) {
        if targets.is_empty() {
            return;
        }
        let kind = message.kind();
        let packet = Packet::new(PacketHeader::new(origin.0, self.tick), message);
        let bytes = match packet.serialize() {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("Failed to serialize {} packet: {}", kind, err);
                return;
            }
        };
        for target in targets {
            self.send_bytes(*target, bytes.clone());
        }
    }

    pub(super) fn send_bytes(&mut self, to: ParticipantId, bytes: Vec<u8>) {
        let len = bytes.len() as u64;
        match self.transport.send(to, bytes) {
            Ok(()) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += len;
            }
            Err(error) => {
                warn!("Send to {} failed: {}", to, error);
                self.events
                    .push_back(EngineEvent::SendFailed { to, error });
            }
        }
    }
}
