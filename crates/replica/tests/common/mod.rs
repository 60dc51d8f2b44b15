#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use replica::{
    FieldDescriptor, FieldKind, LoopbackHub, LoopbackTransport, ManualClock, Message,
    ObjectSchema, Packet, PacketHeader, ParticipantId, ReplicationConfig, ReplicationEngine, Role,
    RpcInvocation, RpcMethod, SchemaId, SchemaRegistry, Transport,
};

pub type Node = ReplicationEngine<LoopbackTransport, ManualClock>;

pub const SERVER: ParticipantId = ParticipantId(1);
pub const CUBE: SchemaId = SchemaId(4);
pub const PLAYER: SchemaId = SchemaId(8);

pub fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            ObjectSchema::builder(CUBE, "Cube")
                .field(FieldDescriptor::new("position", FieldKind::Vec3).interpolated(0.15))
                .field(FieldDescriptor::new("rotation", FieldKind::Quat).interpolated(0.15))
                .field(FieldDescriptor::new("ownerId", FieldKind::U32).owner())
                .field(FieldDescriptor::new("colorId", FieldKind::I32).identity())
                .rpc(RpcMethod::new("hit", &[FieldKind::Vec3]))
                .rpc(RpcMethod::new("status", &[FieldKind::Text]))
                .rpc(RpcMethod::new("ping", &[]))
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .register(
            ObjectSchema::builder(PLAYER, "Player")
                .field(FieldDescriptor::new("position", FieldKind::Vec3).interpolated(0.5))
                .field(FieldDescriptor::new("owner_net_id", FieldKind::U32).owner())
                .field(FieldDescriptor::new("player_id", FieldKind::U32).identity())
                .field(FieldDescriptor::new("score", FieldKind::I32))
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
}

pub struct Session {
    pub hub: LoopbackHub,
    pub clock: ManualClock,
    pub server: Node,
    pub clients: Vec<Node>,
}

impl Session {
    /// Server plus `clients` connected clients with ids 2, 3, ...
    pub fn new(clients: u32) -> Self {
        let hub = LoopbackHub::new();
        let clock = ManualClock::new(0);
        let server = ReplicationEngine::new(
            ReplicationConfig::default(),
            registry(),
            SERVER,
            Role::Server,
            hub.connect(SERVER),
            clock.clone(),
        );
        let mut session = Self {
            hub,
            clock,
            server,
            clients: Vec::new(),
        };
        for _ in 0..clients {
            session.join();
        }
        session
    }

    /// Connects a new client and returns its index in `clients`.
    pub fn join(&mut self) -> usize {
        let id = ParticipantId(self.clients.len() as u32 + 2);
        let client = ReplicationEngine::new(
            ReplicationConfig::default(),
            registry(),
            id,
            Role::Client { server: SERVER },
            self.hub.connect(id),
            self.clock.clone(),
        );
        self.server.participant_connected(id);
        self.clients.push(client);
        self.clients.len() - 1
    }

    pub fn client(&mut self, index: usize) -> &mut Node {
        &mut self.clients[index]
    }

    /// One round: server first, then every client.
    pub fn round(&mut self) {
        self.server.tick();
        for client in &mut self.clients {
            client.tick();
        }
    }

    /// Enough rounds for client traffic to reach the server and come back out.
    pub fn settle(&mut self) {
        for _ in 0..3 {
            self.round();
        }
    }
}

/// A hand-driven endpoint for injecting raw packets.
pub struct RawPeer {
    pub id: ParticipantId,
    pub transport: LoopbackTransport,
}

impl RawPeer {
    pub fn connect(hub: &LoopbackHub, id: ParticipantId) -> Self {
        Self {
            id,
            transport: hub.connect(id),
        }
    }

    pub fn send(&mut self, to: ParticipantId, message: Message) {
        let packet = Packet::new(PacketHeader::new(self.id.0, 1), message);
        self.transport
            .send(to, packet.serialize().unwrap())
            .unwrap();
    }

    pub fn received(&mut self) -> Vec<Message> {
        self.transport
            .poll()
            .into_iter()
            .map(|(_, bytes)| Packet::deserialize(&bytes).unwrap().message)
            .collect()
    }
}

pub type Calls = Arc<Mutex<Vec<RpcInvocation>>>;

/// Binds a recording handler for `method` on the cube schema.
pub fn record(node: &mut Node, method: &str) -> Calls {
    let calls: Calls = Arc::default();
    let sink = Arc::clone(&calls);
    node.bind_rpc(CUBE, method, move |call| sink.lock().unwrap().push(call.clone()))
        .unwrap();
    calls
}

pub fn count(calls: &Calls) -> usize {
    calls.lock().unwrap().len()
}
