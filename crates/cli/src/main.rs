//! Multicore architectural simulator CLI.
//!
//! This binary provides the single entry point described by the engine's
//! wire contract: a config path (`carbon_sim.cfg` by default) and a trace
//! path, replayed to completion or until a fatal error aborts the run.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use carbon_sim_core::config::Config;
use carbon_sim_core::sim::Trace;
use carbon_sim_core::{Error, Simulator};

#[derive(Parser, Debug)]
#[command(name = "carbon_sim", author, version, about = "Timing-accurate multicore architectural simulator")]
struct Cli {
    /// Path to the trace file to replay.
    trace: PathBuf,

    /// Path to a `.cfg` configuration file. Falls back to every section's
    /// own default when omitted.
    #[arg(short, long, default_value = "carbon_sim.cfg")]
    config: PathBuf,
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        eprintln!("carbon_sim: {err}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    let config = if cli.config.exists() {
        Config::load_file(&cli.config)?
    } else {
        Config::default()
    };

    let trace = Trace::load_file(&cli.trace)?;
    let simulator = Simulator::new(config);
    let report = simulator.run(&trace)?;
    simulator.shutdown()?;

    println!("carbon_sim: {} logical cores simulated", report.total_cores);
    for (core, elapsed) in &report.elapsed {
        println!("  core {}: {} ns elapsed", core.get(), elapsed.as_ns());
    }

    Ok(())
}
