//! # STARFALL Client
//!
//! Headless bot client: joins, flies a square pattern and logs what it sees.
//!
//! ```bash
//! starfall_client                        # localhost, username "pilot"
//! starfall_client client.toml ace        # explicit config and username
//! ```

use anyhow::Context;
use starfall_core::components::InputState;
use starfall_networking::{ClientConfig, ClientTransport, GameClient, TickLoop};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

const DEFAULT_USERNAME: &str = "pilot";
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Input for `tick`: one side of a square per second, tapping fire twice a second.
fn bot_input(tick: u32, tick_rate: u32) -> InputState {
    let side = (tick / tick_rate.max(1)) % 4;
    InputState {
        right: side == 0,
        down: side == 1,
        left: side == 2,
        up: side == 3,
        // One-tick taps; the server fires on the press edge.
        shoot: tick % (tick_rate / 2).max(2) == 0,
    }
}

fn main() -> anyhow::Result<()> {
    starfall::init_logging();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => ClientConfig::load(&path).with_context(|| format!("cannot load client config {path}"))?,
        None => ClientConfig::default(),
    };
    let username = args.next().unwrap_or_else(|| DEFAULT_USERNAME.to_owned());

    let runtime = starfall::build_runtime()?;
    let (transport, channels) = runtime
        .block_on(ClientTransport::connect(&config, &username))
        .with_context(|| format!("cannot join {}", config.tcp_addr()))?;
    let stop = starfall::stop_on_ctrl_c(&runtime);
    let mut client = GameClient::new(transport, channels)?;
    client.set_replica_timeout(config.replica_timeout_ticks);

    let mut tick_loop = TickLoop::new(config.tick_rate);
    let mut last_status = Instant::now();
    while !stop.load(Ordering::Relaxed) && client.is_connected() {
        while tick_loop.should_tick() {
            let start = tick_loop.begin_tick();
            client.set_input(bot_input(client.current_tick(), config.tick_rate));
            client.tick()?;
            tick_loop.end_tick(start);
        }
        if last_status.elapsed() >= STATUS_INTERVAL {
            let stats = client.stats();
            tracing::info!(
                player_id = client.player_id(),
                server_tick = ?client.synchronizer().last_applied_tick(),
                entities = client.registry().alive_count(),
                applied = stats.snapshots_applied,
                stale = stats.snapshots_stale,
                despawned = stats.replicas_despawned,
                "client status"
            );
            last_status = Instant::now();
        }
        tick_loop.wait_for_next_tick();
    }

    if client.is_connected() {
        client.disconnect();
        // Let the outbound task flush DISCONNECT_REQ before the runtime stops.
        std::thread::sleep(Duration::from_millis(50));
    } else {
        tracing::warn!("server closed the connection");
    }
    Ok(())
}
