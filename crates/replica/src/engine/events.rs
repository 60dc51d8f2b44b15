use crate::codec::PayloadError;
use crate::lifecycle::InstanceId;
use crate::net::TransportError;
use crate::schema::SchemaId;
use crate::state::ParticipantId;

/// Recoverable conditions surfaced to the embedding application.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Created {
        instance: InstanceId,
        schema: SchemaId,
        creator: ParticipantId,
    },
    Destroyed {
        instance: InstanceId,
    },
    MalformedPayload {
        from: ParticipantId,
        instance: InstanceId,
        error: PayloadError,
    },
    InvalidRpcArguments {
        from: ParticipantId,
        instance: InstanceId,
        reason: String,
    },
    UnauthorizedWrite {
        from: ParticipantId,
        instance: InstanceId,
        owner: ParticipantId,
    },
    DuplicateCreate {
        from: ParticipantId,
        instance: InstanceId,
    },
    UnknownInstance {
        from: ParticipantId,
        instance: InstanceId,
    },
    UnknownSchema {
        from: ParticipantId,
        schema: SchemaId,
    },
    UndecodablePacket {
        from: ParticipantId,
        reason: String,
    },
    SendFailed {
        to: ParticipantId,
        error: TransportError,
    },
}

/// Passed to `on_create` and `on_destroy` observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub instance: InstanceId,
    pub schema: SchemaId,
    pub creator: ParticipantId,
    /// False when this participant created or destroyed the object itself.
    pub remote: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub tick: u32,
    pub packets_received: u32,
    pub bytes_received: u64,
    pub packets_sent: u32,
    pub bytes_sent: u64,
    pub packets_relayed: u32,
    pub fields_applied: u32,
    pub rpcs_invoked: u32,
    pub interpolation_steps: u32,
    pub destroyed: u32,
    pub deltas_sent: u32,
}
