//! # STARFALL Server
//!
//! Headless authoritative server.
//!
//! ```bash
//! starfall_server                # defaults: 0.0.0.0, TCP/UDP 50000, 60 Hz
//! starfall_server server.toml    # explicit config
//! RUST_LOG=starfall_networking=debug starfall_server
//! ```

use anyhow::Context;
use starfall_core::components::Transform;
use starfall_networking::{GameServer, ServerConfig, ServerTransport};

/// Hostiles present when the server starts.
const INITIAL_ENEMIES: u8 = 8;

fn main() -> anyhow::Result<()> {
    starfall::init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(&path).with_context(|| format!("cannot load server config {path}"))?,
        None => ServerConfig::default(),
    };

    let runtime = starfall::build_runtime()?;
    let (transport, channels) = runtime
        .block_on(ServerTransport::bind(&config))
        .context("cannot start server transport")?;
    let stop = starfall::stop_on_ctrl_c(&runtime);

    let mut server = GameServer::new(&config, channels)?;
    #[allow(clippy::cast_precision_loss)]
    let (width, height) = (config.playfield_width as f32, config.playfield_height as f32);
    for i in 0..INITIAL_ENEMIES {
        let lane = f32::from(i) + 0.5;
        let y = height * lane / f32::from(INITIAL_ENEMIES);
        server.spawn_actor("enemy", Transform::at(width * 0.8, y))?;
    }

    tracing::info!(
        tcp = %transport.tcp_addr(),
        udp = %transport.udp_addr(),
        max_players = config.max_players,
        "starfall server ready"
    );
    server.run(&stop)?;

    transport.shutdown();
    Ok(())
}
