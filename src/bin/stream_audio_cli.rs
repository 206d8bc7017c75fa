use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use stream_audio::managers::ChannelObserver;
use stream_audio::{
    init_logging, AppConfig, ControlService, DisplayUpdate, LifecycleCommand, SessionStatus,
    StubEngine,
};

#[derive(Parser, Debug)]
#[command(
    name = "stream_audio_cli",
    about = "Headless harness for the stream audio control core"
)]
struct Cli {
    /// JSON configuration file (defaults to assets/stream_audio_config.json)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play on the stub engine, drive the delay controller, print display updates
    Demo {
        #[arg(long)]
        address: String,
        /// Simulated engine delay reports, applied in order
        #[arg(long = "report")]
        reports: Vec<i64>,
        #[arg(long, default_value_t = 0)]
        increase: u32,
        #[arg(long, default_value_t = 0)]
        decrease: u32,
        /// Pin the delay at this value after the steps
        #[arg(long)]
        fix: Option<i64>,
        /// Number of poller deliveries to print before stopping
        #[arg(long, default_value_t = 3)]
        ticks: u32,
        /// Override the poller cadence
        #[arg(long)]
        poll_ms: Option<u64>,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> ExitCode {
    init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli
        .config
        .map(AppConfig::load_from_file)
        .unwrap_or_else(AppConfig::load);

    match cli.command {
        Commands::Demo {
            address,
            reports,
            increase,
            decrease,
            fix,
            ticks,
            poll_ms,
        } => {
            let mut config = config;
            if let Some(poll_ms) = poll_ms {
                config.control.poll_interval_ms = poll_ms;
            }
            let script = DemoScript {
                address,
                reports,
                increase,
                decrease,
                fix,
                ticks,
            };
            run_demo(config, script)
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::from(0))
        }
    }
}

struct DemoScript {
    address: String,
    reports: Vec<i64>,
    increase: u32,
    decrease: u32,
    fix: Option<i64>,
    ticks: u32,
}

fn run_demo(config: AppConfig, script: DemoScript) -> Result<ExitCode> {
    let engine = Arc::new(StubEngine::new());
    let service =
        ControlService::new(config, engine.clone()).context("starting control service")?;

    let (observer, mut updates) = ChannelObserver::new();
    let proxy = service.attach(observer);

    service
        .handle_command(LifecycleCommand::Play {
            address: script.address.clone(),
        })
        .with_context(|| format!("playing {}", script.address))?;

    for delay_ms in &script.reports {
        if engine.emit_delay(*delay_ms) == 0 {
            bail!("engine dropped delay report {}", delay_ms);
        }
    }
    for _ in 0..script.increase {
        proxy.increase_delay()?;
    }
    for _ in 0..script.decrease {
        proxy.decrease_delay()?;
    }
    if let Some(delay_ms) = script.fix {
        proxy.fix_delay_at(delay_ms)?;
    }

    let mut printed = 0;
    while printed < script.ticks {
        let Some(update) = updates.blocking_recv() else {
            break;
        };
        emit(&update)?;
        if matches!(update, DisplayUpdate::Delay { .. }) {
            printed += 1;
        }
    }

    emit(&StatusLine::from(proxy.status()?))?;
    service.handle_command(LifecycleCommand::Stop)?;
    emit(&StatusLine::from(proxy.status()?))?;

    proxy.detach();
    Ok(ExitCode::from(0))
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

#[derive(Serialize)]
struct StatusLine {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    status: SessionStatus,
}

impl From<SessionStatus> for StatusLine {
    fn from(status: SessionStatus) -> Self {
        Self {
            kind: "status",
            status,
        }
    }
}
