//! Async Callback Demo Application
//!
//! Command-line driver for the async-callback library. It adds the parts the
//! library leaves to its users:
//! - Worker thread destination contexts
//! - System mode publishers (locked and lock-free)
//! - TOML configuration of the transport pools
//! - Allocator statistics and a concurrent stress run

use anyhow::{Context, Result};
use async_callback::{PoolStats, TransportAllocator};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

mod config;
mod demo;
mod stress;
mod sys_data;
mod sys_data_no_lock;
mod worker;

/// Async Callback Demo - Multicast callbacks across worker threads
#[derive(Parser, Debug)]
#[command(name = "callback-demo")]
#[command(about = "Publish synchronous and asynchronous callbacks over a fixed-block transport", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print transport allocator statistics after the run
    #[arg(long)]
    stats: bool,

    /// Format of the statistics output
    #[arg(long, value_enum, default_value_t = StatsFormat::Text)]
    format: StatsFormat,

    /// Publish values concurrently instead of running the walkthrough
    /// (count defaults to [demo].stress_iterations)
    #[arg(long, value_name = "COUNT", num_args = 0..=1)]
    stress: Option<Option<u64>>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StatsFormat {
    Text,
    Json,
}

/// Statistics printed by `--stats`
#[derive(Debug, Serialize)]
struct StatsReport {
    outstanding_blocks: usize,
    pools: Vec<PoolStats>,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Async Callback Demo v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using async-callback library v{}", async_callback::VERSION);

    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => config::DemoConfig::default(),
    };

    if let Some(count) = args.stress {
        let iterations = count.unwrap_or(config.demo.stress_iterations);
        let report = stress::run(&config.transport, iterations)?;
        print_stress_report(&report, args.format)?;
        return Ok(());
    }

    let transport = Arc::new(
        TransportAllocator::new(&config.transport).context("Failed to create transport allocator")?,
    );

    println!("═══════════════════════════════════════════════");
    println!("  Async Callback Demo");
    println!("═══════════════════════════════════════════════\n");

    demo::run(&config.demo, &transport)?;

    if args.stats {
        print_stats(
            &StatsReport {
                outstanding_blocks: transport.outstanding_blocks(),
                pools: transport.stats(),
            },
            args.format,
        )?;
    }

    Ok(())
}

fn print_stats(report: &StatsReport, format: StatsFormat) -> Result<()> {
    match format {
        StatsFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        StatsFormat::Text => {
            println!("\n📊 Transport Allocator:");
            print_pool_table(&report.pools);
            println!("  Outstanding blocks: {}", report.outstanding_blocks);
        }
    }
    Ok(())
}

fn print_stress_report(report: &stress::StressReport, format: StatsFormat) -> Result<()> {
    match format {
        StatsFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        StatsFormat::Text => {
            println!("\n⚡ Stress run: {} values in {} ms", report.iterations, report.elapsed_ms);
            println!("  Synchronous calls:    {}", report.sync_calls);
            println!("  Asynchronous calls:   {}", report.async_delivered);
            println!("  Dropped (exhaustion): {}", report.async_dropped);
            print_pool_table(&report.pools);
        }
    }
    Ok(())
}

fn print_pool_table(pools: &[PoolStats]) {
    println!(
        "  {:>6} {:>6} {:>6} {:>10} {:>10} {:>8}",
        "block", "total", "free", "allocs", "frees", "failed"
    );
    for pool in pools {
        println!(
            "  {:>6} {:>6} {:>6} {:>10} {:>10} {:>8}",
            pool.block_size,
            pool.capacity,
            pool.free_blocks,
            pool.allocations,
            pool.frees,
            pool.failures
        );
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
