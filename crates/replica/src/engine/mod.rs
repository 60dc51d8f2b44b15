//! The per-participant replication node and its logic tick.

mod events;
mod flush;
mod receive;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::{debug, info};

use crate::clock::Clock;
use crate::config::ReplicationConfig;
use crate::error::ReplicationError;
use crate::lifecycle::{DestroySchedule, InstanceId, LifecycleManager};
use crate::net::{Inbox, Transport};
use crate::rpc::{ReceiverSet, RpcCall, RpcDispatcher, RpcInvocation, validate_args};
use crate::schema::{FieldValue, SchemaId, SchemaRegistry};
use crate::state::{Observers, ParticipantId, ReplicatedObject, Role, SubscriptionId};

pub use events::{EngineEvent, LifecycleEvent, TickStats};

/// Initial state for a locally created object.
#[derive(Debug, Clone, PartialEq)]
pub struct Spawn {
    pub schema: SchemaId,
    pub values: Vec<(String, FieldValue)>,
    /// Written into the owner field; defaults to the creating participant.
    pub owner: Option<ParticipantId>,
}

impl Spawn {
    pub fn new(schema: SchemaId) -> Self {
        Self {
            schema,
            values: Vec::new(),
            owner: None,
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.push((field.into(), value.into()));
        self
    }

    pub fn owned_by(mut self, owner: ParticipantId) -> Self {
        self.owner = Some(owner);
        self
    }
}

#[derive(Debug)]
enum Outgoing {
    Create(InstanceId),
    Rpc {
        instance: InstanceId,
        receivers: ReceiverSet,
        owner: ParticipantId,
        body: Vec<u8>,
    },
    Destroy(InstanceId),
}

pub struct ReplicationEngine<T: Transport, C: Clock> {
    config: ReplicationConfig,
    registry: SchemaRegistry,
    local: ParticipantId,
    role: Role,
    transport: T,
    clock: C,
    objects: BTreeMap<InstanceId, ReplicatedObject>,
    lifecycle: LifecycleManager,
    rpc: RpcDispatcher,
    inbox: Inbox,
    outbox: Vec<Outgoing>,
    peers: BTreeSet<ParticipantId>,
    tick: u32,
    events: VecDeque<EngineEvent>,
    stats: TickStats,
    create_observers: Observers<LifecycleEvent>,
    destroy_observers: Observers<LifecycleEvent>,
}

impl<T: Transport, C: Clock> ReplicationEngine<T, C> {
    pub fn new(
        config: ReplicationConfig,
        registry: SchemaRegistry,
        local: ParticipantId,
        role: Role,
        transport: T,
        clock: C,
    ) -> Self {
        let mut peers = BTreeSet::new();
        if let Role::Client { server } = role {
            peers.insert(server);
        }
        Self {
            rpc: RpcDispatcher::new(config.buffered_rpc_limit),
            inbox: Inbox::new(config.inbox_warn_threshold),
            lifecycle: LifecycleManager::new(local),
            config,
            registry,
            local,
            role,
            transport,
            clock,
            objects: BTreeMap::new(),
            outbox: Vec::new(),
            peers,
            tick: 0,
            events: VecDeque::new(),
            stats: TickStats::default(),
            create_observers: Observers::new(),
            destroy_observers: Observers::new(),
        }
    }

    pub fn local_id(&self) -> ParticipantId {
        self.local
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn current_tick(&self) -> u32 {
        self.tick
    }

    pub fn peers(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.peers.iter().copied()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn object(&self, instance: InstanceId) -> Option<&ReplicatedObject> {
        self.objects.get(&instance)
    }

    pub fn object_mut(&mut self, instance: InstanceId) -> Option<&mut ReplicatedObject> {
        self.objects.get_mut(&instance)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ReplicatedObject> {
        self.objects.values()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn is_local_authority(&self, instance: InstanceId) -> bool {
        self.objects
            .get(&instance)
            .is_some_and(ReplicatedObject::is_local_authority)
    }

    pub fn is_retired(&self, instance: InstanceId) -> bool {
        self.lifecycle.is_retired(instance)
    }

    pub fn is_destroy_pending(&self, instance: InstanceId) -> bool {
        self.lifecycle.is_pending(instance)
    }

    /// Registers a new object owned by this participant unless the spawn names
    /// another owner. Its full snapshot goes out on the next flush.
    pub fn create(&mut self, spawn: Spawn) -> Result<InstanceId, ReplicationError> {
        let schema = self
            .registry
            .get(spawn.schema)
            .cloned()
            .ok_or(ReplicationError::UnknownSchema(spawn.schema))?;

        let mut values = schema.default_values();
        for (name, value) in spawn.values {
            let index = schema
                .field_index(&name)
                .ok_or_else(|| ReplicationError::UnknownField {
                    schema: schema.name().to_owned(),
                    field: name.clone(),
                })?;
            let expected = schema.fields()[index].kind;
            if value.kind() != expected {
                return Err(ReplicationError::KindMismatch {
                    field: name,
                    expected,
                    found: value.kind(),
                });
            }
            if !value.fits_wire() {
                return Err(ReplicationError::TextTooLong {
                    len: value.as_text().map_or(0, str::len),
                    field: name,
                });
            }
            values[index] = value;
        }
        if let Some(owner_field) = schema.owner_field() {
            let explicit = spawn.owner.map(|p| p.0);
            let current = values[owner_field].as_u32().unwrap_or(0);
            let owner = explicit.unwrap_or(if current == 0 { self.local.0 } else { current });
            values[owner_field] = FieldValue::U32(owner);
        }

        let instance = self.lifecycle.allocate();
        if !self.lifecycle.register(instance) {
            return Err(ReplicationError::DuplicateInstance(instance));
        }
        let object = ReplicatedObject::new(instance, schema.clone(), self.local, self.local, values);
        self.objects.insert(instance, object);
        self.outbox.push(Outgoing::Create(instance));

        debug!("Created {} ({})", instance, schema.name());
        self.create_observers.notify(&LifecycleEvent {
            instance,
            schema: schema.id(),
            creator: self.local,
            remote: false,
        });
        Ok(instance)
    }

    /// Schedules removal after `delay_ms`. Unknown, destroyed, and already
    /// scheduled instances are left alone.
    pub fn destroy(&mut self, instance: InstanceId, delay_ms: u64) -> Result<(), ReplicationError> {
        let Some(object) = self.objects.get(&instance) else {
            return Ok(());
        };
        let owner = object.owner();
        if owner != self.local && !self.role.is_server() {
            return Err(ReplicationError::NotAuthority {
                instance,
                owner,
                local: self.local,
            });
        }
        let now = self.clock.now_ms();
        match self.lifecycle.schedule_destroy(instance, now, delay_ms) {
            DestroySchedule::Scheduled { due_ms } => {
                debug!("Destroy of {} scheduled at {}ms", instance, due_ms);
            }
            DestroySchedule::AlreadyPending => {
                debug!("Destroy of {} already pending", instance);
            }
            DestroySchedule::Unknown => {}
        }
        Ok(())
    }

    pub fn send_rpc(
        &mut self,
        instance: InstanceId,
        method: &str,
        receivers: ReceiverSet,
        args: Vec<FieldValue>,
    ) -> Result<(), ReplicationError> {
        let object = self
            .objects
            .get(&instance)
            .ok_or(ReplicationError::UnknownInstance(instance))?;
        let schema = object.schema();
        let method_id = schema
            .method_id(method)
            .ok_or_else(|| ReplicationError::UnknownMethod {
                schema: schema.name().to_owned(),
                method: method.to_owned(),
            })?;
        let schema_id = schema.id();
        if let Some(declaration) = schema.method(method_id) {
            validate_args(declaration, &args)?;
        }
        let owner = object.owner();

        let invoke_here = match receivers.unbuffered() {
            ReceiverSet::All => true,
            ReceiverSet::Server => self.role.is_server(),
            ReceiverSet::Owner => owner == self.local,
            _ => false,
        };
        let call = RpcCall {
            instance,
            method: method_id,
            args,
        };
        let body = call.encode();
        if invoke_here {
            self.rpc.defer(
                schema_id,
                RpcInvocation {
                    instance,
                    method: method_id,
                    name: method.to_owned(),
                    args: call.args,
                    sender: self.local,
                    tick: self.tick,
                },
            );
        }
        self.outbox.push(Outgoing::Rpc {
            instance,
            receivers,
            owner,
            body,
        });
        Ok(())
    }

    pub fn bind_rpc(
        &mut self,
        schema: SchemaId,
        method: &str,
        handler: impl FnMut(&RpcInvocation) + Send + 'static,
    ) -> Result<(), ReplicationError> {
        let declared = self
            .registry
            .get(schema)
            .ok_or(ReplicationError::UnknownSchema(schema))?;
        let method_id = declared
            .method_id(method)
            .ok_or_else(|| ReplicationError::UnknownMethod {
                schema: declared.name().to_owned(),
                method: method.to_owned(),
            })?;
        self.rpc.bind(schema, method_id, handler);
        Ok(())
    }

    pub fn on_create(
        &mut self,
        callback: impl FnMut(&LifecycleEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.create_observers.subscribe(callback)
    }

    pub fn on_destroy(
        &mut self,
        callback: impl FnMut(&LifecycleEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.destroy_observers.subscribe(callback)
    }

    /// On the server: starts relaying to `participant` and sends it every
    /// announced object followed by the buffered calls.
    pub fn participant_connected(&mut self, participant: ParticipantId) {
        if participant == self.local || !self.peers.insert(participant) {
            return;
        }
        info!("{} connected to {}", participant, self.local);
        if self.role.is_server() {
            self.bootstrap(participant);
        }
    }

    /// On the server: destroys every object the participant owned.
    pub fn participant_disconnected(&mut self, participant: ParticipantId) {
        if !self.peers.remove(&participant) {
            return;
        }
        info!("{} disconnected from {}", participant, self.local);
        if !self.role.is_server() {
            return;
        }
        let owned: Vec<InstanceId> = self
            .objects
            .values()
            .filter(|object| object.owner() == participant)
            .map(ReplicatedObject::id)
            .collect();
        let now = self.clock.now_ms();
        for instance in owned {
            self.lifecycle.schedule_destroy(instance, now, 0);
        }
    }

    /// Runs one logic frame: receive, apply, interpolate, destroy, flush.
    pub fn tick(&mut self) -> TickStats {
        self.tick = self.tick.wrapping_add(1);
        self.stats.tick = self.tick;

        self.poll_transport();
        self.drain_inbox();
        self.step_interpolation();
        self.run_due_destroys();
        self.flush();
        std::mem::take(&mut self.stats)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = EngineEvent> + '_ {
        self.events.drain(..)
    }

    fn step_interpolation(&mut self) {
        let epsilon = self.config.interpolation_epsilon;
        for object in self.objects.values_mut() {
            if !object.is_local_authority() {
                self.stats.interpolation_steps += object.step_interpolation(epsilon) as u32;
            }
        }
    }

    fn run_due_destroys(&mut self) {
        let now = self.clock.now_ms();
        for instance in self.lifecycle.due(now) {
            if self.remove_object(instance, false) {
                self.stats.destroyed += 1;
                self.queue_destroy(instance);
            }
        }
    }

    /// Drops the object and retires its id. Returns false if it was not live.
    fn remove_object(&mut self, instance: InstanceId, remote: bool) -> bool {
        let Some(object) = self.objects.remove(&instance) else {
            return false;
        };
        self.lifecycle.retire(instance);
        self.rpc.forget_instance(instance);
        debug!("Destroyed {}", instance);
        self.destroy_observers.notify(&LifecycleEvent {
            instance,
            schema: object.schema().id(),
            creator: object.creator(),
            remote,
        });
        if remote {
            self.events.push_back(EngineEvent::Destroyed { instance });
        }
        true
    }

    /// Announces a local destroy. An object whose create never went out
    /// simply disappears from the outbox.
    fn queue_destroy(&mut self, instance: InstanceId) {
        let before = self.outbox.len();
        self.outbox.retain(|op| !matches!(op, Outgoing::Create(id) if *id == instance));
        if self.outbox.len() != before {
            self.outbox.retain(
                |op| !matches!(op, Outgoing::Rpc { instance: id, .. } if *id == instance),
            );
            return;
        }
        self.outbox.push(Outgoing::Destroy(instance));
    }
}
