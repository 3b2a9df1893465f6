//! rowlink-sim: runs a full session against the simulated ergometer.
//!
//! ```text
//!  operator thread ──UserCommand──▶ ┌───────┐
//!                                   │ Inbox │──▶ runtime::run ──▶ RowerService
//!  SimErg threads ──TransportEvent─▶└───────┘         │
//!                                                     ├──▶ LogEventSink (stderr)
//!                                                     └──▶ JsonRelaySink (stdout)
//! ```
//!
//! Usage: `rowlink-sim [config.json]`.  Set `RUST_LOG` to change verbosity.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::info;

use rowlink::RowerService;
use rowlink::adapters::log_sink::LogEventSink;
use rowlink::adapters::relay::JsonRelaySink;
use rowlink::adapters::sim::SimErg;
use rowlink::adapters::time::MonotonicClock;
use rowlink::app::commands::UserCommand;
use rowlink::app::ports::DeviceId;
use rowlink::channels::{Inbox, Message};
use rowlink::config::EngineConfig;
use rowlink::runtime;

const WORKOUT_DISTANCE_M: u32 = 2000;

fn load_config() -> Result<EngineConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config: EngineConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;
    config.validate()?;
    info!("config loaded from {path}");
    Ok(config)
}

/// Scripted collaborator: scan, connect, set up a piece, row for a while,
/// then hang up.
fn operator(inbox: Arc<Inbox>, device: DeviceId) {
    let step = |cmd: UserCommand, wait_ms: u64| {
        inbox.post_command(cmd);
        thread::sleep(Duration::from_millis(wait_ms));
    };
    step(UserCommand::StartScan, 300);
    step(UserCommand::Connect(device), 1_000);
    step(
        UserCommand::ConfigureWorkout {
            distance_m: WORKOUT_DISTANCE_M,
        },
        4_000,
    );
    step(UserCommand::Disconnect, 200);
    inbox.post(Message::Shutdown);
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("rowlink-sim v{}", env!("CARGO_PKG_VERSION"));
    let config = load_config()?;

    let inbox = Arc::new(Inbox::new());
    let sim = SimErg::new(Arc::clone(&inbox));
    let device = sim.device();

    let operator = {
        let inbox = Arc::clone(&inbox);
        thread::Builder::new()
            .name("operator".into())
            .spawn(move || operator(inbox, device))
            .context("spawning operator thread")?
    };

    let mut service = RowerService::new(config, sim, MonotonicClock::new());
    let mut sink = (LogEventSink::new(), JsonRelaySink::new(std::io::stdout()));
    runtime::block_on_session(&mut service, &inbox, &mut sink);

    operator
        .join()
        .map_err(|_| anyhow::anyhow!("operator thread panicked"))?;

    info!("relayed {} record(s)", sink.1.records());
    info!("machine received {:?}", service.transport().written());
    info!("diagnostics: {:?}", service.diagnostics());
    Ok(())
}
