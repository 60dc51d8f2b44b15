use std::collections::VecDeque;
use std::time::Instant;

use log::info;
use replica::{
    EngineEvent, FixedTimestep, LoopbackHub, LoopbackTransport, ParticipantId, ReplicationEngine,
    ReplicationError, Role, SchemaRegistry, SystemClock, TickStats,
};

use crate::config::SessionConfig;
use crate::events::{LeaveReason, SessionEvent};
use crate::gameplay::{self, HostGame, PlayerController};

pub const HOST: ParticipantId = ParticipantId(1);

type Node = ReplicationEngine<LoopbackTransport, SystemClock>;

struct Host {
    engine: Node,
    game: HostGame,
}

struct Client {
    engine: Node,
    controller: PlayerController,
}

/// Traffic summed over every participant since the last report.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    pub ticks: u32,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_relayed: u64,
    pub fields_applied: u64,
    pub rpcs_invoked: u64,
    pub destroyed: u64,
}

impl SessionStats {
    fn record(&mut self, stats: &TickStats) {
        self.packets_sent += stats.packets_sent as u64;
        self.bytes_sent += stats.bytes_sent;
        self.packets_relayed += stats.packets_relayed as u64;
        self.fields_applied += stats.fields_applied as u64;
        self.rpcs_invoked += stats.rpcs_invoked as u64;
        self.destroyed += stats.destroyed as u64;
    }
}

/// A host and its clients in one process, wired through a loopback hub.
pub struct Session {
    config: SessionConfig,
    registry: SchemaRegistry,
    hub: LoopbackHub,
    host: Host,
    clients: Vec<Client>,
    next_participant: u32,
    timestep: FixedTimestep,
    last_tick_time: Instant,
    ticks: u64,
    window: SessionStats,
    pending_events: VecDeque<SessionEvent>,
}

impl Session {
    pub fn new(config: SessionConfig) -> anyhow::Result<Self> {
        let registry = gameplay::registry()?;
        let hub = LoopbackHub::new();
        let mut engine = ReplicationEngine::new(
            config.replication.clone(),
            registry.clone(),
            HOST,
            Role::Server,
            hub.connect(HOST),
            SystemClock::new(),
        );
        let mut game = HostGame::new(&config);
        game.setup(&mut engine)?;

        let mut session = Self {
            timestep: FixedTimestep::new(config.tick_rate()),
            registry,
            hub,
            host: Host { engine, game },
            clients: Vec::new(),
            next_participant: HOST.0 + 1,
            last_tick_time: Instant::now(),
            ticks: 0,
            window: SessionStats::default(),
            pending_events: VecDeque::new(),
            config,
        };
        for _ in 0..session.config.clients {
            session.join(false)?;
        }
        Ok(session)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = SessionEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn join(&mut self, late: bool) -> Result<ParticipantId, ReplicationError> {
        let id = ParticipantId(self.next_participant);
        self.next_participant += 1;

        let mut engine = ReplicationEngine::new(
            self.config.replication.clone(),
            self.registry.clone(),
            id,
            Role::Client { server: HOST },
            self.hub.connect(id),
            SystemClock::new(),
        );
        let mut controller = PlayerController::new(id, &self.config);
        controller.attach(&mut engine)?;

        self.host.engine.participant_connected(id);
        self.clients.push(Client { engine, controller });
        self.pending_events
            .push_back(SessionEvent::ClientJoined { participant: id, late });
        Ok(id)
    }

    pub fn leave(&mut self, participant: ParticipantId, reason: LeaveReason) {
        let Some(index) = self
            .clients
            .iter()
            .position(|client| client.engine.local_id() == participant)
        else {
            return;
        };
        let client = self.clients.remove(index);
        if let Some(player) = client.controller.player() {
            info!("{} leaves, taking {} with it", participant, player);
        }
        self.hub.disconnect(participant);
        self.host.engine.participant_disconnected(participant);
        self.pending_events
            .push_back(SessionEvent::ClientLeft { participant, reason });
    }

    pub fn tick_once(&mut self) {
        let now = Instant::now();
        self.timestep.accumulate(now - self.last_tick_time);
        self.last_tick_time = now;

        while self.timestep.consume_tick() {
            self.tick();
        }
    }

    fn tick(&mut self) {
        self.ticks += 1;
        let dt = self.timestep.dt();

        if self.ticks == self.config.late_join_tick() {
            for _ in 0..self.config.late_joiners {
                if let Err(e) = self.join(true) {
                    self.report(format!("Late join failed: {}", e));
                }
            }
        }
        if self.ticks == self.config.leave_tick() {
            let leaving: Vec<ParticipantId> = self
                .clients
                .iter()
                .take(self.config.leavers as usize)
                .map(|client| client.engine.local_id())
                .collect();
            for participant in leaving {
                self.leave(participant, LeaveReason::Graceful);
            }
        }

        if let Err(e) = self.host.game.step(&mut self.host.engine, dt) {
            self.report(format!("Host gameplay failed: {}", e));
        }
        let stats = self.host.engine.tick();
        self.window.record(&stats);
        for event in self.host.engine.drain_events() {
            self.pending_events
                .push_back(SessionEvent::Replication { at: HOST, event });
        }

        for client in &mut self.clients {
            let at = client.engine.local_id();
            if let Err(e) = client.controller.step(&mut client.engine, dt) {
                self.pending_events.push_back(SessionEvent::Error {
                    message: format!("{} gameplay failed: {}", at, e),
                });
            }
            let stats = client.engine.tick();
            self.window.record(&stats);
            for event in client.engine.drain_events() {
                self.pending_events
                    .push_back(SessionEvent::Replication { at, event });
            }
        }

        self.window.ticks += 1;
        if self.window.ticks >= self.config.tick_rate() {
            self.log_window();
        }
    }

    fn log_window(&mut self) {
        let window = std::mem::take(&mut self.window);
        info!(
            "tick {} | game {} ({} cubes standing) | {} objects, {} clients | sent {} pkts / {} B, relayed {} | {} fields, {} rpcs, {} destroyed",
            self.ticks,
            self.host.game.status().as_str(),
            self.host.game.standing_cubes(),
            self.host.engine.object_count(),
            self.clients.len(),
            window.packets_sent,
            window.bytes_sent,
            window.packets_relayed,
            window.fields_applied,
            window.rpcs_invoked,
            window.destroyed,
        );
    }

    fn report(&mut self, message: String) {
        self.pending_events
            .push_back(SessionEvent::Error { message });
    }

    /// Disconnects every client and lets the host flush the resulting destroys.
    pub fn shutdown(&mut self) {
        let participants: Vec<ParticipantId> = self
            .clients
            .iter()
            .map(|client| client.engine.local_id())
            .collect();
        for participant in participants {
            self.leave(participant, LeaveReason::Shutdown);
        }
        self.host.engine.tick();
        info!(
            "Session closed after {} ticks with {} objects left on the host",
            self.ticks,
            self.host.engine.object_count()
        );
    }
}

/// Events worth surfacing above debug level.
pub fn is_notable(event: &EngineEvent) -> bool {
    !matches!(
        event,
        EngineEvent::Created { .. } | EngineEvent::Destroyed { .. }
    )
}
