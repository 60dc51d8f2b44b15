use replica::ReplicationConfig;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub clients: u32,
    pub late_joiners: u32,
    pub late_join_after_ms: u64,
    pub leavers: u32,
    pub leave_after_ms: u64,
    pub wall_rows: u32,
    pub wall_columns: u32,
    pub fire_interval_ms: u64,
    pub projectile_lifetime_ms: u64,
    pub time_broadcast_secs: f32,
    pub replication: ReplicationConfig,
}

impl SessionConfig {
    pub fn tick_rate(&self) -> u32 {
        self.replication.tick_rate.max(1)
    }

    /// Tick on which the late joiners connect.
    pub fn late_join_tick(&self) -> u64 {
        self.late_join_after_ms * self.tick_rate() as u64 / 1000
    }

    /// Tick on which the earliest clients disconnect.
    pub fn leave_tick(&self) -> u64 {
        self.leave_after_ms * self.tick_rate() as u64 / 1000
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            clients: 2,
            late_joiners: 1,
            late_join_after_ms: 3000,
            leavers: 1,
            leave_after_ms: 8000,
            wall_rows: 4,
            wall_columns: 6,
            fire_interval_ms: 1500,
            projectile_lifetime_ms: 2000,
            time_broadcast_secs: 10.0,
            replication: ReplicationConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_follows_replication_tick_rate() {
        let config = SessionConfig {
            replication: ReplicationConfig {
                tick_rate: 20,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(config.tick_rate(), 20);
        assert_eq!(config.late_join_tick(), 60);
        assert_eq!(config.leave_tick(), 160);
    }
}
