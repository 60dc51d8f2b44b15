use replica::{EngineEvent, ParticipantId};

#[derive(Debug, Clone)]
pub enum SessionEvent {
    ClientJoined {
        participant: ParticipantId,
        late: bool,
    },
    ClientLeft {
        participant: ParticipantId,
        reason: LeaveReason,
    },
    Replication {
        at: ParticipantId,
        event: EngineEvent,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy)]
pub enum LeaveReason {
    Graceful,
    Shutdown,
}

impl LeaveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveReason::Graceful => "left",
            LeaveReason::Shutdown => "was dropped at shutdown",
        }
    }
}
