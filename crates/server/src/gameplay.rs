//! The cube-wall game the demo session plays on top of the replication core.
//!
//! The host owns the game manager, the wall and every projectile. Each client
//! owns one player, walks it around and asks the host to fire.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use glam::{Quat, Vec3};
use log::{debug, info};
use replica::{
    Clock, FieldDescriptor, FieldKind, FieldValue, InstanceId, ObjectSchema, ParticipantId,
    ReceiverSet, ReplicatedObject, ReplicationEngine, ReplicationError, RpcMethod, SchemaError,
    SchemaId, SchemaRegistry, Spawn, Transport,
};

use crate::config::SessionConfig;

pub const GAME_MANAGER: SchemaId = SchemaId(1);
pub const CUBE: SchemaId = SchemaId(4);
pub const PLAYER: SchemaId = SchemaId(8);
pub const PROJECTILE: SchemaId = SchemaId(16);

pub const GREEN: i32 = 1;
pub const RED: i32 = 2;

const WALL_Z: f32 = -10.0;
const PLAYER_Z: f32 = 6.0;
const WALK_RADIUS: f32 = 3.0;
const PROJECTILE_SPEED: f32 = 14.0;
const GRAVITY: f32 = 9.8;
const HIT_RADIUS: f32 = 0.9;
const FALL_SPEED: f32 = 3.0;

pub fn registry() -> Result<SchemaRegistry, SchemaError> {
    let mut registry = SchemaRegistry::new();
    registry.register(
        ObjectSchema::builder(GAME_MANAGER, "GameManager")
            .field(FieldDescriptor::new("ownerId", FieldKind::U32).owner())
            .field(FieldDescriptor::new("round", FieldKind::U32).identity())
            .rpc(RpcMethod::new(
                "player_scores_point",
                &[FieldKind::U32, FieldKind::I32],
            ))
            .rpc(RpcMethod::new("game_time", &[FieldKind::F32]))
            .rpc(RpcMethod::new("game_status", &[FieldKind::Text]))
            .build()?,
    )?;
    registry.register(
        ObjectSchema::builder(CUBE, "Cube")
            .field(FieldDescriptor::new("position", FieldKind::Vec3).interpolated(0.15))
            .field(FieldDescriptor::new("rotation", FieldKind::Quat).interpolated(0.15))
            .field(FieldDescriptor::new("ownerId", FieldKind::U32).owner())
            .field(FieldDescriptor::new("colorId", FieldKind::I32).identity())
            .build()?,
    )?;
    registry.register(
        ObjectSchema::builder(PLAYER, "Player")
            .field(FieldDescriptor::new("position", FieldKind::Vec3).interpolated(0.5))
            .field(FieldDescriptor::new("owner_net_id", FieldKind::U32).owner())
            .field(FieldDescriptor::new("player_id", FieldKind::U32).identity())
            .field(FieldDescriptor::new("score", FieldKind::I32))
            .rpc(RpcMethod::new(
                "create_projectile",
                &[FieldKind::Vec3, FieldKind::Vec3],
            ))
            .build()?,
    )?;
    registry.register(
        ObjectSchema::builder(PROJECTILE, "Projectile")
            .field(FieldDescriptor::new("position", FieldKind::Vec3).interpolated(0.5))
            .field(FieldDescriptor::new("velocity", FieldKind::Vec3))
            .field(FieldDescriptor::new("ownerId", FieldKind::U32).owner())
            .field(FieldDescriptor::new("shooter", FieldKind::U32))
            .build()?,
    )?;
    Ok(registry)
}

static RAND_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn rand_u64() -> u64 {
    let mut hasher = DefaultHasher::new();
    Instant::now().hash(&mut hasher);
    RAND_COUNTER.fetch_add(1, Ordering::Relaxed).hash(&mut hasher);
    hasher.finish()
}

pub fn rand_unit() -> f32 {
    rand_u64() as f32 / u64::MAX as f32
}

/// Hands out every item once per round, in shuffled order.
#[derive(Debug, Clone)]
pub struct ShuffleBag<T> {
    items: Vec<T>,
    cursor: usize,
}

impl<T: Clone> ShuffleBag<T> {
    pub fn new(items: Vec<T>) -> Self {
        let mut bag = Self { items, cursor: 0 };
        bag.shuffle();
        bag
    }

    pub fn draw(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        if self.cursor == self.items.len() {
            self.shuffle();
            self.cursor = 0;
        }
        let item = self.items[self.cursor].clone();
        self.cursor += 1;
        Some(item)
    }

    fn shuffle(&mut self) {
        for i in (1..self.items.len()).rev() {
            let j = (rand_u64() % (i as u64 + 1)) as usize;
            self.items.swap(i, j);
        }
    }
}

/// Half green, half red; an odd count gets the extra green.
pub fn wall_colors(count: usize) -> ShuffleBag<i32> {
    ShuffleBag::new(
        (0..count)
            .map(|i| if i % 2 == 0 { GREEN } else { RED })
            .collect(),
    )
}

fn vec3(object: &ReplicatedObject, field: &str) -> Vec3 {
    object
        .get(field)
        .ok()
        .and_then(FieldValue::as_vec3)
        .unwrap_or(Vec3::ZERO)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy)]
struct FireRequest {
    shooter: ParticipantId,
    origin: Vec3,
    direction: Vec3,
}

#[derive(Debug, Clone, Copy, Default)]
struct CubeState {
    hitter: Option<ParticipantId>,
    falling: bool,
    landed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Running,
    Finished,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Running => "running",
            GameStatus::Finished => "finished",
        }
    }
}

/// Host-side game logic.
pub struct HostGame {
    manager: Option<InstanceId>,
    cubes: HashMap<InstanceId, CubeState>,
    projectiles: Vec<InstanceId>,
    requests: Arc<Mutex<Vec<FireRequest>>>,
    status: GameStatus,
    elapsed: f32,
    next_time_broadcast: f32,
    time_broadcast_secs: f32,
    projectile_lifetime_ms: u64,
    wall_rows: u32,
    wall_columns: u32,
}

impl HostGame {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            manager: None,
            cubes: HashMap::new(),
            projectiles: Vec::new(),
            requests: Arc::default(),
            status: GameStatus::Running,
            elapsed: 0.0,
            next_time_broadcast: 0.0,
            time_broadcast_secs: config.time_broadcast_secs,
            projectile_lifetime_ms: config.projectile_lifetime_ms,
            wall_rows: config.wall_rows,
            wall_columns: config.wall_columns,
        }
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn standing_cubes(&self) -> usize {
        self.cubes.values().filter(|cube| !cube.landed).count()
    }

    /// Creates the manager and the wall, and starts accepting fire requests.
    pub fn setup<T: Transport, C: Clock>(
        &mut self,
        engine: &mut ReplicationEngine<T, C>,
    ) -> Result<(), ReplicationError> {
        let manager = engine.create(Spawn::new(GAME_MANAGER).with("round", 1u32))?;
        self.manager = Some(manager);

        let mut colors = wall_colors((self.wall_rows * self.wall_columns) as usize);
        let half_width = self.wall_columns as f32 / 2.0;
        for row in 0..self.wall_rows {
            for column in 0..self.wall_columns {
                let position = Vec3::new(column as f32 - half_width, row as f32 + 0.5, WALL_Z);
                let color = colors.draw().unwrap_or(GREEN);
                let cube = engine.create(
                    Spawn::new(CUBE)
                        .with("position", position)
                        .with("colorId", color),
                )?;
                self.cubes.insert(cube, CubeState::default());
            }
        }

        let requests = Arc::clone(&self.requests);
        engine.bind_rpc(PLAYER, "create_projectile", move |call| {
            let origin = call.args.first().and_then(FieldValue::as_vec3);
            let direction = call.args.get(1).and_then(FieldValue::as_vec3);
            if let (Some(origin), Some(direction)) = (origin, direction) {
                lock(&requests).push(FireRequest {
                    shooter: call.sender,
                    origin,
                    direction,
                });
            }
        })?;

        info!(
            "Game set up: {} cubes, manager {}",
            self.cubes.len(),
            manager
        );
        self.broadcast_status(engine)
    }

    pub fn step<T: Transport, C: Clock>(
        &mut self,
        engine: &mut ReplicationEngine<T, C>,
        dt: f32,
    ) -> Result<(), ReplicationError> {
        self.elapsed += dt;
        self.spawn_projectiles(engine)?;
        self.move_projectiles(engine, dt)?;
        self.topple_cubes(engine);
        self.drop_cubes(engine, dt)?;

        if self.elapsed >= self.next_time_broadcast {
            self.next_time_broadcast += self.time_broadcast_secs;
            if let Some(manager) = self.manager {
                engine.send_rpc(
                    manager,
                    "game_time",
                    ReceiverSet::AllBuffered,
                    vec![self.elapsed.into()],
                )?;
            }
        }

        if self.status == GameStatus::Running && self.standing_cubes() == 0 {
            self.status = GameStatus::Finished;
            info!("Wall cleared after {:.1}s", self.elapsed);
            self.broadcast_status(engine)?;
        }
        Ok(())
    }

    fn broadcast_status<T: Transport, C: Clock>(
        &self,
        engine: &mut ReplicationEngine<T, C>,
    ) -> Result<(), ReplicationError> {
        let Some(manager) = self.manager else {
            return Ok(());
        };
        engine.send_rpc(
            manager,
            "game_status",
            ReceiverSet::AllBuffered,
            vec![self.status.as_str().into()],
        )
    }

    fn spawn_projectiles<T: Transport, C: Clock>(
        &mut self,
        engine: &mut ReplicationEngine<T, C>,
    ) -> Result<(), ReplicationError> {
        let requests = std::mem::take(&mut *lock(&self.requests));
        for request in requests {
            let velocity = request.direction.normalize_or_zero() * PROJECTILE_SPEED;
            let projectile = engine.create(
                Spawn::new(PROJECTILE)
                    .with("position", request.origin)
                    .with("velocity", velocity)
                    .with("shooter", request.shooter.0),
            )?;
            engine.destroy(projectile, self.projectile_lifetime_ms)?;
            self.projectiles.push(projectile);
            debug!("{} fired {}", request.shooter, projectile);
        }
        Ok(())
    }

    fn move_projectiles<T: Transport, C: Clock>(
        &mut self,
        engine: &mut ReplicationEngine<T, C>,
        dt: f32,
    ) -> Result<(), ReplicationError> {
        self.projectiles.retain(|id| engine.object(*id).is_some());
        for id in &self.projectiles {
            let Some(object) = engine.object_mut(*id) else {
                continue;
            };
            let mut velocity = vec3(object, "velocity");
            if velocity == Vec3::ZERO {
                continue;
            }
            velocity.y -= GRAVITY * dt;
            let mut position = vec3(object, "position") + velocity * dt;
            if position.y < 0.0 {
                position.y = 0.0;
                velocity = Vec3::ZERO;
            }
            object.set("velocity", velocity)?;
            object.set("position", position)?;
        }
        Ok(())
    }

    fn topple_cubes<T: Transport, C: Clock>(&mut self, engine: &ReplicationEngine<T, C>) {
        let shots: Vec<(Vec3, ParticipantId)> = self
            .projectiles
            .iter()
            .filter_map(|id| engine.object(*id))
            .map(|object| {
                let shooter = object
                    .get("shooter")
                    .ok()
                    .and_then(FieldValue::as_u32)
                    .unwrap_or(0);
                (vec3(object, "position"), ParticipantId(shooter))
            })
            .collect();
        if shots.is_empty() {
            return;
        }

        for (id, cube) in &mut self.cubes {
            if cube.falling || cube.landed {
                continue;
            }
            let Some(object) = engine.object(*id) else {
                continue;
            };
            let position = vec3(object, "position");
            if let Some((_, shooter)) = shots
                .iter()
                .find(|(shot, _)| shot.distance(position) < HIT_RADIUS)
            {
                debug!("{} knocked {} off the wall", shooter, id);
                cube.falling = true;
                cube.hitter = Some(*shooter);
            }
        }
    }

    fn drop_cubes<T: Transport, C: Clock>(
        &mut self,
        engine: &mut ReplicationEngine<T, C>,
        dt: f32,
    ) -> Result<(), ReplicationError> {
        let mut scored = Vec::new();
        for (id, cube) in &mut self.cubes {
            if !cube.falling {
                continue;
            }
            let Some(object) = engine.object_mut(*id) else {
                continue;
            };
            let mut position = vec3(object, "position");
            let rotation = object
                .get("rotation")
                .ok()
                .and_then(FieldValue::as_quat)
                .unwrap_or(Quat::IDENTITY);

            position.y -= FALL_SPEED * dt;
            if position.y <= 0.0 {
                position.y = 0.0;
                cube.falling = false;
                cube.landed = true;
                let color = object
                    .get("colorId")
                    .ok()
                    .and_then(FieldValue::as_i32)
                    .unwrap_or(0);
                if let Some(hitter) = cube.hitter {
                    scored.push((hitter, color));
                }
            }
            object.set("position", position)?;
            object.set("rotation", rotation * Quat::from_rotation_x(2.0 * dt))?;
        }

        let Some(manager) = self.manager else {
            return Ok(());
        };
        for (player, color) in scored {
            engine.send_rpc(
                manager,
                "player_scores_point",
                ReceiverSet::All,
                vec![player.0.into(), color.into()],
            )?;
        }
        Ok(())
    }
}

/// Client-side logic for one participant's player.
pub struct PlayerController {
    local: ParticipantId,
    player: Option<InstanceId>,
    angle: f32,
    since_fire: f32,
    fire_interval: f32,
    points: Arc<Mutex<u32>>,
    finished: Arc<Mutex<bool>>,
}

impl PlayerController {
    pub fn new(local: ParticipantId, config: &SessionConfig) -> Self {
        Self {
            local,
            player: None,
            angle: rand_unit() * std::f32::consts::TAU,
            since_fire: 0.0,
            fire_interval: config.fire_interval_ms as f32 / 1000.0,
            points: Arc::default(),
            finished: Arc::default(),
        }
    }

    pub fn player(&self) -> Option<InstanceId> {
        self.player
    }

    /// Binds the manager broadcasts this participant reacts to.
    pub fn attach<T: Transport, C: Clock>(
        &mut self,
        engine: &mut ReplicationEngine<T, C>,
    ) -> Result<(), ReplicationError> {
        let local = self.local;
        let points = Arc::clone(&self.points);
        engine.bind_rpc(GAME_MANAGER, "player_scores_point", move |call| {
            let player = call.args.first().and_then(FieldValue::as_u32);
            if player == Some(local.0) {
                *lock(&points) += 1;
            }
        })?;

        let finished = Arc::clone(&self.finished);
        engine.bind_rpc(GAME_MANAGER, "game_status", move |call| {
            let status = call.args.first().and_then(FieldValue::as_text).unwrap_or("");
            debug!("{} sees game {}", local, status);
            *lock(&finished) = status == GameStatus::Finished.as_str();
        })?;

        engine.bind_rpc(GAME_MANAGER, "game_time", move |call| {
            if let Some(time) = call.args.first().and_then(FieldValue::as_f32) {
                debug!("{} synced game time {:.1}s", local, time);
            }
        })
    }

    pub fn step<T: Transport, C: Clock>(
        &mut self,
        engine: &mut ReplicationEngine<T, C>,
        dt: f32,
    ) -> Result<(), ReplicationError> {
        let player = match self.player {
            Some(player) => player,
            None => {
                let player = engine.create(
                    Spawn::new(PLAYER)
                        .with("player_id", self.local.0)
                        .with("position", self.walk_position()),
                )?;
                self.player = Some(player);
                player
            }
        };
        let Some(object) = engine.object_mut(player) else {
            return Ok(());
        };

        self.angle = (self.angle + dt * 0.5) % std::f32::consts::TAU;
        let position = self.walk_position();
        object.set("position", position)?;

        let earned = std::mem::take(&mut *lock(&self.points));
        if earned > 0 {
            let score = object
                .get("score")
                .ok()
                .and_then(FieldValue::as_i32)
                .unwrap_or(0)
                + earned as i32;
            object.set("score", score)?;
            info!("{} scored, total {}", self.local, score);
        }

        self.since_fire += dt;
        if self.since_fire < self.fire_interval || *lock(&self.finished) {
            return Ok(());
        }
        self.since_fire = 0.0;
        let aim = Vec3::new((rand_unit() - 0.5) * 6.0, 1.0 + rand_unit() * 3.0, WALL_Z);
        engine.send_rpc(
            player,
            "create_projectile",
            ReceiverSet::Server,
            vec![position.into(), (aim - position).into()],
        )
    }

    fn walk_position(&self) -> Vec3 {
        Vec3::new(
            self.angle.cos() * WALK_RADIUS,
            1.0,
            PLAYER_Z + self.angle.sin() * WALK_RADIUS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffle_bag_deals_each_item_once_per_round() {
        let mut bag = wall_colors(6);
        let mut round: Vec<i32> = (0..6).filter_map(|_| bag.draw()).collect();
        round.sort();
        assert_eq!(round, vec![GREEN, GREEN, GREEN, RED, RED, RED]);

        let mut next: Vec<i32> = (0..6).filter_map(|_| bag.draw()).collect();
        next.sort();
        assert_eq!(next, round);
    }

    #[test]
    fn empty_bag_draws_nothing() {
        let mut bag: ShuffleBag<i32> = ShuffleBag::new(Vec::new());
        assert_eq!(bag.draw(), None);
    }

    #[test]
    fn registry_declares_demo_schemas() {
        let registry = registry().unwrap();
        assert_eq!(registry.len(), 4);
        let player = registry.get(PLAYER).unwrap();
        assert_eq!(player.owner_field(), Some(1));
        assert!(player.method_id("create_projectile").is_some());
    }
}
