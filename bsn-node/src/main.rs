use std::path::PathBuf;

use bsn_core::RoundOutcome;
use bsn_node::{Config, NetworkReport, Simulation};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "bsn-sim")]
#[command(about = "TinyBSN body sensor network simulator")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "bsn-sim.toml")]
    config: PathBuf,

    /// Override the configured run time
    #[arg(short, long)]
    duration_secs: Option<u64>,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "tracing=info,bsn_node=info,bsn_core=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    if let Some(secs) = cli.duration_secs {
        config.simulation.duration_secs = secs;
    }
    let duration = config.simulation.duration();

    let simulation = Simulation::new(config)?;
    let cancel = CancellationToken::new();
    let run = tokio::spawn(simulation.run(cancel.clone()));

    tokio::select! {
        _ = tokio::time::sleep(duration) => {
            info!(duration_secs = duration.as_secs(), "Simulation time elapsed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }
    cancel.cancel();

    let report = run.await??;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(())
}

fn print_summary(report: &NetworkReport) {
    println!(
        "rounds: {} ({} complete, {} crisis, {} timed out)",
        report.rounds.len(),
        report.complete_rounds(),
        report.crisis_rounds(),
        report.timed_out_rounds()
    );

    for summary in &report.rounds {
        let detail = match &summary.outcome {
            RoundOutcome::Crisis { source, .. } => format!("CRISIS from {source}"),
            RoundOutcome::Complete { state, .. } => format!("complete, {state:?}"),
            RoundOutcome::Timeout { missing, .. } => {
                let missing: Vec<String> = missing.iter().map(ToString::to_string).collect();
                format!("timeout, missing {}", missing.join(", "))
            }
        };
        let reports: Vec<String> = summary
            .outcome
            .record()
            .reports()
            .map(|(node, state)| format!("{node}={state:?}"))
            .collect();
        println!(
            "  [{}] round {:>5}: {detail} [{}]",
            summary.resolved_at,
            summary.outcome.msg_id(),
            reports.join(" ")
        );
    }

    println!("alerts: {}", report.alerts.len());
    for alert in &report.alerts {
        println!(
            "  [{}] {} crisis on {} (round {})",
            alert.raised_at, alert.id.0, alert.source, alert.msg_id
        );
    }

    let frames = &report.frames;
    println!(
        "frames: {} sent, {} lost, {} overflow, {} malformed",
        frames.sent, frames.lost, frames.overflow, frames.malformed
    );

    for (node, stats) in &report.peripherals {
        println!(
            "  {node}: {} reported, {} dropped, last {:?}",
            stats.reported, stats.dropped, stats.last_state
        );
    }
}
