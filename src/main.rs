use std::process;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use log::error;

use ramutex::cluster::{Checker, Cluster, ClusterConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a local process group and check its CS history
    Run {
        /// Number of processes in the group
        #[arg(long, default_value_t = 3)]
        processes: u32,

        /// CS entries per process
        #[arg(long, default_value_t = 10)]
        rounds: usize,

        /// Minimum injected message latency in milliseconds
        #[arg(long, default_value_t = 0)]
        min_latency_ms: u64,

        /// Maximum injected message latency in milliseconds
        #[arg(long, default_value_t = 2)]
        max_latency_ms: u64,

        /// Time spent inside the CS in milliseconds
        #[arg(long, default_value_t = 1)]
        hold_ms: u64,

        /// Upper bound on the pause between entries in milliseconds
        #[arg(long, default_value_t = 2)]
        think_ms: u64,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            processes,
            rounds,
            min_latency_ms,
            max_latency_ms,
            hold_ms,
            think_ms,
        } => {
            let config = ClusterConfig::new(processes).with_latency(
                Duration::from_millis(min_latency_ms),
                Duration::from_millis(max_latency_ms),
            );
            let passed = run_group(
                &config,
                rounds,
                Duration::from_millis(hold_ms),
                Duration::from_millis(think_ms),
            );
            if !passed {
                process::exit(1);
            }
        }
    }
}

/// Run the group, print a summary, and report whether the history checked out.
fn run_group(config: &ClusterConfig, rounds: usize, hold: Duration, think: Duration) -> bool {
    let mut cluster = match Cluster::spawn(config) {
        Ok(cluster) => cluster,
        Err(e) => {
            error!("failed to start cluster: {}", e);
            return false;
        }
    };

    println!(
        "Running {} processes x {} rounds (latency {:?}..{:?})",
        config.ids.len(),
        rounds,
        config.latency.0,
        config.latency.1
    );

    let started = Instant::now();
    let history = match cluster.run_rounds(rounds, hold, think) {
        Ok(history) => history,
        Err(e) => {
            error!("run failed: {}", e);
            cluster.shutdown();
            return false;
        }
    };
    let elapsed = started.elapsed();

    for process in cluster.processes() {
        let stats = process.stats();
        println!(
            "  p{}: entries={} immediate={} deferred={} unsolicited={} clock={}",
            process.id(),
            stats.entries,
            stats.immediate_replies,
            stats.deferred_requests,
            stats.unsolicited_replies,
            process.snapshot().clock
        );
    }
    let dispatchers_clean = cluster.shutdown();
    if !dispatchers_clean {
        error!("a dispatcher thread panicked during the run");
    }

    let result = Checker::check(&history.snapshot());
    println!(
        "{} tenures across {} processes in {:?}",
        result.stats.tenures, result.stats.processes, elapsed
    );

    if result.passed {
        println!("History check PASSED");
    } else {
        for violation in &result.violations {
            eprintln!("VIOLATION {:?}: {}", violation.kind, violation.description);
        }
        eprintln!("History check FAILED ({} violations)", result.violations.len());
    }
    result.passed && dispatchers_clean
}
