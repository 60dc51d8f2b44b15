pub mod clock;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod rpc;
pub mod schema;
pub mod state;

pub use clock::{Clock, FixedTimestep, ManualClock, SystemClock};
pub use codec::{DeltaReader, PayloadError, read_delta, read_full, write_delta, write_full};
pub use config::{DEFAULT_TICK_RATE, ReplicationConfig};
pub use engine::{EngineEvent, LifecycleEvent, ReplicationEngine, Spawn, TickStats};
pub use error::ReplicationError;
pub use lifecycle::{DestroySchedule, InstanceId, LifecycleManager};
pub use net::{
    LoopbackHub, LoopbackTransport, Message, Packet, PacketError, PacketHeader, Transport,
    TransportError,
};
pub use rpc::{ReceiverSet, RpcCall, RpcInvocation};
pub use schema::{
    FieldDescriptor, FieldFlags, FieldKind, FieldValue, ObjectSchema, RpcMethod, SchemaError,
    SchemaId, SchemaRegistry,
};
pub use state::{
    DirtyMask, FieldChange, ParticipantId, ReplicatedObject, Role, SubscriptionId,
};
