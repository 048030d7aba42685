use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tcplike_abstract::SimConfig;
use tcplike_core::timer::DEFAULT_INITIAL_TIMEOUT;
use tcplike_simulator::{SimLink, SimulationReport, load_scenario, run_scenario, simulate};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a sender/receiver pair over a simulated lossy link")]
struct Args {
    /// Load a scenario from disk and check its assertions.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// File to transfer in the default simulation.
    #[arg(long, conflicts_with = "scenario")]
    input: Option<PathBuf>,

    /// Number of generated bytes when no input file is given.
    #[arg(long, default_value_t = 4000)]
    size: usize,

    #[arg(long, default_value_t = 0.1)]
    loss_rate: f64,

    #[arg(long, default_value_t = 0.0)]
    corrupt_rate: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();
    info!("tcplike-sim starting…");

    // Virtual time: latencies and timeouts cost nothing on the wall clock.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .context("Failed to build tokio runtime")?;

    let report = runtime.block_on(run(&args))?;

    print_summary(&report);
    if let Some(path) = &args.trace_out {
        write_trace(path, &report)?;
        info!("Trace written to {}", path.display());
    }
    Ok(())
}

async fn run(args: &Args) -> Result<SimulationReport> {
    match &args.scenario {
        Some(path) => {
            let scenario = load_scenario(path)?;
            run_scenario(&scenario).await
        }
        None => run_default_sim(args).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_default_config(args: &Args) -> SimConfig {
    SimConfig {
        loss_rate: args.loss_rate,
        corrupt_rate: args.corrupt_rate,
        min_latency: 100,
        max_latency: 500,
        seed: args.seed,
    }
}

async fn run_default_sim(args: &Args) -> Result<SimulationReport> {
    let data = match &args.input {
        Some(path) => {
            fs::read(path).with_context(|| format!("Failed to read input {}", path.display()))?
        }
        None => (0..args.size).map(|i| (i % 251) as u8).collect(),
    };
    let config = build_default_config(args);
    info!("Starting default simulation: {} bytes, {:?}", data.len(), config);

    let report = simulate(SimLink::new(config), &data, 1, DEFAULT_INITIAL_TIMEOUT)
        .await
        .context("Simulated transfer failed")?;
    info!("Simulation complete.");
    Ok(report)
}

fn print_summary(report: &SimulationReport) {
    let t = &report.transfer;
    println!(
        "Delivered {} bytes ({} written) in {} ms of simulated time",
        report.input_len, report.output_len, report.duration_ms
    );
    println!("Total bytes sent = {}", t.bytes_sent);
    println!("Total packets sent = {}", t.packets_sent);
    println!("Total packets retransmitted = {}", t.retransmissions);
    println!(
        "Final estimated RTT = {:.1} ms, timeout = {:.1} ms",
        t.estimated_rtt_ms, t.timeout_ms
    );
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
