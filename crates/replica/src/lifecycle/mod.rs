//! Instance ids, registration, and scheduled destruction.

use std::collections::HashSet;
use std::fmt;

use crate::state::ParticipantId;

/// Network-unique without a round trip: creator in the high 32 bits, the
/// creator's serial in the low 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

impl InstanceId {
    pub fn new(creator: ParticipantId, serial: u32) -> Self {
        Self(((creator.0 as u64) << 32) | serial as u64)
    }

    pub fn creator(self) -> ParticipantId {
        ParticipantId((self.0 >> 32) as u32)
    }

    pub fn serial(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}:{}", self.creator().0, self.serial())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroySchedule {
    Scheduled { due_ms: u64 },
    AlreadyPending,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
struct PendingDestroy {
    instance: InstanceId,
    due_ms: u64,
}

#[derive(Debug)]
pub struct LifecycleManager {
    local: ParticipantId,
    next_serial: u32,
    live: HashSet<InstanceId>,
    retired: HashSet<InstanceId>,
    pending: Vec<PendingDestroy>,
}

impl LifecycleManager {
    pub fn new(local: ParticipantId) -> Self {
        Self {
            local,
            next_serial: 1,
            live: HashSet::new(),
            retired: HashSet::new(),
            pending: Vec::new(),
        }
    }

    pub fn allocate(&mut self) -> InstanceId {
        let id = InstanceId::new(self.local, self.next_serial);
        self.next_serial = self.next_serial.wrapping_add(1).max(1);
        id
    }

    /// False for ids already live or retired.
    pub fn register(&mut self, instance: InstanceId) -> bool {
        if self.retired.contains(&instance) {
            return false;
        }
        self.live.insert(instance)
    }

    pub fn schedule_destroy(
        &mut self,
        instance: InstanceId,
        now_ms: u64,
        delay_ms: u64,
    ) -> DestroySchedule {
        if !self.live.contains(&instance) {
            return DestroySchedule::Unknown;
        }
        if self.is_pending(instance) {
            return DestroySchedule::AlreadyPending;
        }
        let due_ms = now_ms.saturating_add(delay_ms);
        self.pending.push(PendingDestroy { instance, due_ms });
        DestroySchedule::Scheduled { due_ms }
    }

    pub fn is_pending(&self, instance: InstanceId) -> bool {
        self.pending.iter().any(|p| p.instance == instance)
    }

    /// Removes and returns destroys due at `now_ms`, earliest first.
    pub fn due(&mut self, now_ms: u64) -> Vec<InstanceId> {
        let mut due: Vec<PendingDestroy> = Vec::new();
        self.pending.retain(|p| {
            if p.due_ms <= now_ms {
                due.push(*p);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|p| p.due_ms);
        due.into_iter().map(|p| p.instance).collect()
    }

    /// Retires a live instance. Any pending destroy for it is dropped.
    pub fn retire(&mut self, instance: InstanceId) -> bool {
        self.pending.retain(|p| p.instance != instance);
        if self.live.remove(&instance) {
            self.retired.insert(instance);
            true
        } else {
            false
        }
    }

    pub fn is_live(&self, instance: InstanceId) -> bool {
        self.live.contains(&instance)
    }

    pub fn is_retired(&self, instance: InstanceId) -> bool {
        self.retired.contains(&instance)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
