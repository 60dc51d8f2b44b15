use std::fmt;

/// Network participant. `0` means no participant has been assigned yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ParticipantId(pub u32);

impl ParticipantId {
    pub const NONE: ParticipantId = ParticipantId(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Hub of the star: relays client traffic and bootstraps late joiners.
    Server,
    Client { server: ParticipantId },
}

impl Role {
    pub fn is_server(self) -> bool {
        matches!(self, Role::Server)
    }
}

/// The one participant allowed to write an object's business fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authority {
    pub owner: ParticipantId,
    pub local: ParticipantId,
}

impl Authority {
    /// Without an owner field the creator owns the object for its lifetime.
    pub fn resolve(owner_field: Option<u32>, creator: ParticipantId, local: ParticipantId) -> Self {
        let owner = owner_field.map(ParticipantId).unwrap_or(creator);
        Self { owner, local }
    }

    pub fn is_local(self) -> bool {
        self.owner == self.local
    }

    /// Whether an update from `sender` may be accepted by a server.
    pub fn accepts_write_from(self, sender: ParticipantId) -> bool {
        self.owner == sender
    }
}
