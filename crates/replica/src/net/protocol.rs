use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

pub const PROTOCOL_VERSION: u32 = 1;
/// "REPL"
pub const PROTOCOL_MAGIC: u32 = 0x5245504C;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u32,
    /// Participant that produced the message; preserved when the server relays.
    pub origin: u32,
    /// Sender tick, used as the interpolation timestep on receipt.
    pub tick: u32,
}

impl PacketHeader {
    pub fn new(origin: u32, tick: u32) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            origin,
            tick,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum Message {
    Create {
        instance_id: u64,
        schema_id: u32,
        creator: u32,
        snapshot: Vec<u8>,
    },
    Update {
        instance_id: u64,
        delta: Vec<u8>,
    },
    Destroy {
        instance_id: u64,
    },
    Rpc {
        receivers: u8,
        call: Vec<u8>,
    },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Create { .. } => "create",
            Message::Update { .. } => "update",
            Message::Destroy { .. } => "destroy",
            Message::Rpc { .. } => "rpc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Packet {
    pub header: PacketHeader,
    pub message: Message,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("bad header: magic {magic:#010x}, version {version}")]
    InvalidHeader { magic: u32, version: u32 },
}

impl Packet {
    pub fn new(header: PacketHeader, message: Message) -> Self {
        Self { header, message }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        // Transport buffers carry no alignment guarantee.
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);
        let packet =
            rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(PacketError::Deserialize)?;
        if !packet.header.is_valid() {
            return Err(PacketError::InvalidHeader {
                magic: packet.header.magic,
                version: packet.header.version,
            });
        }
        Ok(packet)
    }
}
