use crate::codec::PayloadError;
use crate::lifecycle::InstanceId;
use crate::net::{PacketError, TransportError};
use crate::schema::{FieldKind, SchemaError, SchemaId};
use crate::state::ParticipantId;

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("malformed payload for {instance}: {source}")]
    MalformedPayload {
        instance: InstanceId,
        #[source]
        source: PayloadError,
    },
    #[error("invalid arguments for rpc `{method}`: {reason}")]
    InvalidRpcArguments { method: String, reason: String },
    #[error("unknown {0}")]
    UnknownSchema(SchemaId),
    #[error("unknown instance {0}")]
    UnknownInstance(InstanceId),
    #[error("{0} is already in use")]
    DuplicateInstance(InstanceId),
    #[error("text for `{field}` is {len} bytes, longer than a u32 length prefix allows")]
    TextTooLong { field: String, len: usize },
    #[error("{schema} has no field `{field}`")]
    UnknownField { schema: String, field: String },
    #[error("{schema} has no rpc `{method}`")]
    UnknownMethod { schema: String, method: String },
    #[error("field `{field}` is {expected}, got {found}")]
    KindMismatch {
        field: String,
        expected: FieldKind,
        found: FieldKind,
    },
    #[error("{local} is not the authority of {instance} (owner {owner})")]
    NotAuthority {
        instance: InstanceId,
        owner: ParticipantId,
        local: ParticipantId,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
