mod config;
mod events;
mod gameplay;
mod session;

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use log::{debug, error, info, warn};
use replica::{DEFAULT_TICK_RATE, ReplicationConfig};
use tokio::time::MissedTickBehavior;

use config::SessionConfig;
use events::SessionEvent;
use session::{Session, is_notable};

#[derive(Parser)]
#[command(name = "replica-server")]
#[command(about = "Runs a host and in-process clients over the loopback transport")]
struct Args {
    #[arg(short, long, default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 2)]
    clients: u32,

    #[arg(long, default_value_t = 1, help = "Clients that connect after the session starts")]
    late_joiners: u32,

    #[arg(long, default_value_t = 3000)]
    late_join_after_ms: u64,

    #[arg(long, default_value_t = 1, help = "Clients that disconnect mid-session")]
    leavers: u32,

    #[arg(long, default_value_t = 8000)]
    leave_after_ms: u64,

    #[arg(long, default_value_t = 4)]
    rows: u32,

    #[arg(long, default_value_t = 6)]
    columns: u32,

    #[arg(long, default_value_t = 1500)]
    fire_interval_ms: u64,

    #[arg(long, default_value_t = 2000)]
    projectile_lifetime_ms: u64,

    #[arg(long, default_value_t = 0, help = "Stop after this many seconds (0 runs until Ctrl-C)")]
    duration: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = SessionConfig {
        clients: args.clients,
        late_joiners: args.late_joiners,
        late_join_after_ms: args.late_join_after_ms,
        leavers: args.leavers,
        leave_after_ms: args.leave_after_ms,
        wall_rows: args.rows,
        wall_columns: args.columns,
        fire_interval_ms: args.fire_interval_ms,
        projectile_lifetime_ms: args.projectile_lifetime_ms,
        replication: ReplicationConfig {
            tick_rate: args.tick_rate.max(1),
            ..Default::default()
        },
        ..Default::default()
    };
    let tick_rate = config.tick_rate();

    let mut session = Session::new(config)?;
    info!(
        "Session started at {} Hz with {} clients",
        tick_rate,
        session.client_count()
    );

    let deadline = (args.duration > 0).then(|| Instant::now() + Duration::from_secs(args.duration));
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / tick_rate as f64));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                session.tick_once();
                for event in session.drain_events() {
                    log_event(event);
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
    }

    info!("Session shutting down");
    session.shutdown();
    for event in session.drain_events() {
        log_event(event);
    }
    Ok(())
}

fn log_event(event: SessionEvent) {
    match event {
        SessionEvent::ClientJoined { participant, late } => {
            if late {
                info!("{} joined late", participant);
            } else {
                info!("{} joined", participant);
            }
        }
        SessionEvent::ClientLeft { participant, reason } => {
            info!("{} {}", participant, reason.as_str());
        }
        SessionEvent::Replication { at, event } if is_notable(&event) => {
            warn!("{}: {:?}", at, event);
        }
        SessionEvent::Replication { at, event } => {
            debug!("{}: {:?}", at, event);
        }
        SessionEvent::Error { message } => {
            error!("{}", message);
        }
    }
}
