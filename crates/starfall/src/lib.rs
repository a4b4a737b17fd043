//! # STARFALL
//!
//! Entry-point helpers shared by the `starfall_server` and
//! `starfall_client` binaries, plus re-exports of the engine crates.
//!
//! ## Startup sequence
//!
//! 1. Install the log subscriber (`RUST_LOG`, default `info`)
//! 2. Load the TOML config named on the command line, or use defaults
//! 3. Build the tokio runtime that owns every socket
//! 4. Bind / connect, then run the simulation loop on the main thread

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub use starfall_core;
pub use starfall_networking;

use starfall_networking::NetError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

/// Worker threads in the network I/O runtime.
pub const IO_WORKER_THREADS: usize = 2;

/// Installs the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Builds the multi-threaded runtime for the network I/O context.
///
/// # Errors
///
/// [`NetError::Runtime`] if the runtime cannot start.
pub fn build_runtime() -> Result<Runtime, NetError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(IO_WORKER_THREADS)
        .thread_name("starfall-io")
        .enable_all()
        .build()
        .map_err(NetError::Runtime)
}

/// Returns a flag that becomes `true` on Ctrl-C.
pub fn stop_on_ctrl_c(runtime: &Runtime) -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    runtime.spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, shutting down"),
            Err(err) => tracing::warn!(error = %err, "cannot listen for Ctrl-C"),
        }
        flag.store(true, Ordering::Relaxed);
    });
    stop
}
