mod inbox;
mod protocol;
mod transport;

pub use inbox::{InboundPacket, Inbox};
pub use protocol::{Message, PROTOCOL_MAGIC, PROTOCOL_VERSION, Packet, PacketError, PacketHeader};
pub use transport::{LoopbackHub, LoopbackTransport, Transport, TransportError};
