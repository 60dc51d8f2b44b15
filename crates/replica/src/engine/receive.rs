use std::sync::Arc;

use log::{debug, error, warn};

use crate::clock::Clock;
use crate::codec::{DeltaReader, read_full, write_delta};
use crate::lifecycle::InstanceId;
use crate::net::{InboundPacket, Message, Packet, Transport};
use crate::rpc::{BufferedCall, ReceiverSet, RpcCall, RpcInvocation};
use crate::schema::SchemaId;
use crate::state::{DirtyMask, ParticipantId, ReplicatedObject};

use super::{EngineEvent, LifecycleEvent, ReplicationEngine};

/// Where the server forwards a client message after applying it.
enum Relay {
    None,
    Others,
    To(ParticipantId),
    /// Forward a re-encoded message to the others instead of the raw bytes.
    OthersRewritten(Message),
}

impl<T: Transport, C: Clock> ReplicationEngine<T, C> {
    pub(super) fn poll_transport(&mut self) {
        let now = self.clock.now_ms();
        for (from, bytes) in self.transport.poll() {
            self.stats.packets_received += 1;
            self.stats.bytes_received += bytes.len() as u64;
            self.inbox.push(from, now, bytes);
        }
    }

    /// Runs calls this participant made to itself, then every queued packet.
    pub(super) fn drain_inbox(&mut self) {
        for (schema, invocation) in self.rpc.take_deferred() {
            if self.objects.contains_key(&invocation.instance)
                && self.rpc.invoke(schema, &invocation)
            {
                self.stats.rpcs_invoked += 1;
            }
        }

        for inbound in self.inbox.drain() {
            self.handle_packet(inbound);
        }
    }

    fn handle_packet(&mut self, inbound: InboundPacket) {
        let from = inbound.from;
        let packet = match Packet::deserialize(&inbound.bytes) {
            Ok(packet) => packet,
            Err(err) => {
                warn!("Dropping undecodable packet from {}: {}", from, err);
                self.events.push_back(EngineEvent::UndecodablePacket {
                    from,
                    reason: err.to_string(),
                });
                return;
            }
        };

        // Clients only hear from the server, which keeps the sender as origin
        // when relaying.
        let origin = if self.role.is_server() {
            from
        } else {
            ParticipantId(packet.header.origin)
        };
        let header = packet.header;
        let tick = header.tick;

        let relay = match packet.message {
            Message::Create {
                instance_id,
                schema_id,
                creator,
                snapshot,
            } => self.receive_create(
                from,
                InstanceId(instance_id),
                SchemaId(schema_id),
                ParticipantId(creator),
                &snapshot,
            ),
            Message::Update { instance_id, delta } => {
                self.receive_update(from, InstanceId(instance_id), tick, &delta)
            }
            Message::Destroy { instance_id } => self.receive_destroy(from, InstanceId(instance_id)),
            Message::Rpc { receivers, call } => {
                self.receive_rpc(from, origin, tick, receivers, call)
            }
        };

        if !self.role.is_server() {
            return;
        }
        let (relay, bytes) = match relay {
            Relay::OthersRewritten(message) => match Packet::new(header, message).serialize() {
                Ok(bytes) => (Relay::Others, bytes),
                Err(err) => {
                    error!("Failed to re-encode relay from {}: {}", from, err);
                    return;
                }
            },
            relay => (relay, inbound.bytes),
        };
        let targets: Vec<ParticipantId> = match relay {
            Relay::None | Relay::OthersRewritten(_) => return,
            Relay::Others => self.peers.iter().copied().filter(|p| *p != from).collect(),
            Relay::To(target) if self.peers.contains(&target) => vec![target],
            Relay::To(target) => {
                debug!("Cannot relay to {}: not connected", target);
                return;
            }
        };
        for target in targets {
            self.stats.packets_relayed += 1;
            self.send_bytes(target, bytes.clone());
        }
    }

    fn receive_create(
        &mut self,
        from: ParticipantId,
        instance: InstanceId,
        schema_id: SchemaId,
        creator: ParticipantId,
        snapshot: &[u8],
    ) -> Relay {
        // Ids are minted by their creator, so a client may only announce its own.
        if self.role.is_server() && (instance.creator() != from || creator != from) {
            warn!("{} announced {} as created by {}", from, instance, creator);
            self.events.push_back(EngineEvent::UnauthorizedWrite {
                from,
                instance,
                owner: instance.creator(),
            });
            return Relay::None;
        }
        if self.lifecycle.is_retired(instance) {
            debug!("Ignoring create for retired {}", instance);
            self.events
                .push_back(EngineEvent::UnknownInstance { from, instance });
            return Relay::None;
        }
        if self.objects.contains_key(&instance) {
            debug!("Ignoring duplicate create for {}", instance);
            self.events
                .push_back(EngineEvent::DuplicateCreate { from, instance });
            return Relay::None;
        }
        let Some(schema) = self.registry.get(schema_id).cloned() else {
            warn!("Create for {} names unknown {}", instance, schema_id);
            self.events.push_back(EngineEvent::UnknownSchema {
                from,
                schema: schema_id,
            });
            return Relay::None;
        };
        let values = match read_full(&schema, snapshot) {
            Ok(values) => values,
            Err(error) => {
                warn!("Malformed snapshot for {} from {}: {}", instance, from, error);
                self.events.push_back(EngineEvent::MalformedPayload {
                    from,
                    instance,
                    error,
                });
                return Relay::None;
            }
        };

        let mut object = ReplicatedObject::new(instance, schema, creator, self.local, values);
        object.mark_announced();
        self.lifecycle.register(instance);
        self.objects.insert(instance, object);

        debug!("Replicated {} ({}) from {}", instance, schema_id, from);
        self.create_observers.notify(&LifecycleEvent {
            instance,
            schema: schema_id,
            creator,
            remote: true,
        });
        self.events.push_back(EngineEvent::Created {
            instance,
            schema: schema_id,
            creator,
        });
        Relay::Others
    }

    fn receive_update(
        &mut self,
        from: ParticipantId,
        instance: InstanceId,
        tick: u32,
        delta: &[u8],
    ) -> Relay {
        let Some(object) = self.objects.get_mut(&instance) else {
            debug!("Ignoring update for unknown {}", instance);
            self.events
                .push_back(EngineEvent::UnknownInstance { from, instance });
            return Relay::None;
        };

        if self.role.is_server() {
            let owner = object.owner();
            if owner != from {
                warn!("{} wrote {} owned by {}", from, instance, owner);
                self.events.push_back(EngineEvent::UnauthorizedWrite {
                    from,
                    instance,
                    owner,
                });
                return Relay::None;
            }
        } else if object.is_local_authority() {
            debug!("Dropping update for locally owned {}", instance);
            return Relay::None;
        }

        let schema = Arc::clone(object.schema());
        let mut owner_changed = false;
        let mut applied = DirtyMask::new(schema.field_count());
        let mut failure = None;
        match DeltaReader::new(&schema, delta) {
            Ok(reader) => {
                for item in reader {
                    match item {
                        Ok((index, value)) => {
                            owner_changed |= object.apply_remote(index, value, tick);
                            applied.mark(index);
                            self.stats.fields_applied += 1;
                        }
                        Err(error) => {
                            failure = Some(error);
                            break;
                        }
                    }
                }
            }
            Err(error) => failure = Some(error),
        }

        if owner_changed {
            object.snap_interpolations();
        }
        if let Some(error) = failure {
            warn!("Malformed delta for {} from {}: {}", instance, from, error);
            self.events.push_back(EngineEvent::MalformedPayload {
                from,
                instance,
                error,
            });
            // Applied fields stay applied, so the others must see them too.
            if !self.role.is_server() || applied.is_empty() {
                return Relay::None;
            }
            return Relay::OthersRewritten(Message::Update {
                instance_id: instance.0,
                delta: write_delta(&schema, &applied, &object.authoritative_values()),
            });
        }
        Relay::Others
    }

    fn receive_destroy(&mut self, from: ParticipantId, instance: InstanceId) -> Relay {
        let Some(object) = self.objects.get(&instance) else {
            debug!("Ignoring destroy for unknown {}", instance);
            self.events
                .push_back(EngineEvent::UnknownInstance { from, instance });
            return Relay::None;
        };
        if self.role.is_server() {
            let owner = object.owner();
            if owner != from {
                warn!("{} tried to destroy {} owned by {}", from, instance, owner);
                self.events.push_back(EngineEvent::UnauthorizedWrite {
                    from,
                    instance,
                    owner,
                });
                return Relay::None;
            }
        }
        if self.remove_object(instance, true) {
            self.stats.destroyed += 1;
        }
        Relay::Others
    }

    fn receive_rpc(
        &mut self,
        from: ParticipantId,
        origin: ParticipantId,
        tick: u32,
        tag: u8,
        call: Vec<u8>,
    ) -> Relay {
        let receivers = match ReceiverSet::try_from(tag) {
            Ok(receivers) => receivers,
            Err(err) => {
                warn!("Dropping rpc from {}: {}", from, err);
                self.events.push_back(EngineEvent::UndecodablePacket {
                    from,
                    reason: err.to_string(),
                });
                return Relay::None;
            }
        };
        let (instance, method) = match RpcCall::peek(&call) {
            Ok(target) => target,
            Err(err) => {
                warn!("Dropping rpc from {}: {}", from, err);
                self.events.push_back(EngineEvent::UndecodablePacket {
                    from,
                    reason: err.to_string(),
                });
                return Relay::None;
            }
        };
        let Some(object) = self.objects.get(&instance) else {
            debug!("Ignoring rpc for unknown {}", instance);
            self.events
                .push_back(EngineEvent::UnknownInstance { from, instance });
            return Relay::None;
        };
        let schema = Arc::clone(object.schema());
        let owner = object.owner();

        let Some(declaration) = schema.method(method) else {
            warn!("{} has no rpc #{} (from {})", schema.name(), method, from);
            self.events.push_back(EngineEvent::InvalidRpcArguments {
                from,
                instance,
                reason: format!("{} has no rpc #{}", schema.name(), method),
            });
            return Relay::None;
        };
        let decoded = match RpcCall::decode(&call, declaration) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!("Rejecting rpc from {}: {}", from, err);
                self.events.push_back(EngineEvent::InvalidRpcArguments {
                    from,
                    instance,
                    reason: err.to_string(),
                });
                return Relay::None;
            }
        };

        let (invoke, relay) = if self.role.is_server() {
            match receivers {
                ReceiverSet::Server => (true, Relay::None),
                ReceiverSet::All
                | ReceiverSet::AllBuffered
                | ReceiverSet::Others
                | ReceiverSet::OthersBuffered => (true, Relay::Others),
                ReceiverSet::Owner if owner == self.local => (true, Relay::None),
                ReceiverSet::Owner if owner == from => (false, Relay::None),
                ReceiverSet::Owner => (false, Relay::To(owner)),
            }
        } else {
            (true, Relay::None)
        };

        if self.role.is_server() && receivers.is_buffered() {
            self.rpc.buffer(BufferedCall {
                instance,
                receivers,
                origin,
                body: call,
            });
        }

        if invoke {
            let invocation = RpcInvocation {
                instance,
                method,
                name: declaration.name.clone(),
                args: decoded.args,
                sender: origin,
                tick,
            };
            if self.rpc.invoke(schema.id(), &invocation) {
                self.stats.rpcs_invoked += 1;
            }
        }
        relay
    }
}
