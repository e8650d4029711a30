//! optrack demo harness
//!
//! Submits a batch of simulated remote operations, monitors them through the
//! engine and prints how each one ended.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod json_output;
mod simulate;

use config::Config;
use optrack_core::{translate, OperationDefinition, OperationEvent, OperationId};
use optrack_engine::metrics::collect_metrics;
use optrack_engine::{EngineConfig, OperationTracker};
use simulate::{Plan, SimulatedResolver};

/// optrack - track long-running remote operations
#[derive(Parser)]
#[command(name = "optrack")]
#[command(about = "Demo harness for the optrack polling engine", long_about = None)]
struct Cli {
    /// Emit JSON lines on stdout instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch of simulated operations to completion
    Simulate {
        /// Number of operations to submit
        #[arg(short = 'n', long, default_value = "3")]
        operations: usize,

        /// Polls a healthy operation needs before completing
        #[arg(long, default_value = "4")]
        steps: u32,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "250")]
        interval_ms: u64,

        /// Operation timeout in milliseconds
        #[arg(long, default_value = "10000")]
        timeout_ms: u64,

        /// Index of an operation that finishes with errors (repeatable)
        #[arg(long)]
        fail: Vec<usize>,

        /// Index of an operation that never finishes (repeatable)
        #[arg(long)]
        hang: Vec<usize>,

        /// Index of an operation with unreliable status reads (repeatable)
        #[arg(long)]
        flaky: Vec<usize>,

        /// Index of an operation to cancel
        #[arg(long)]
        cancel: Option<usize>,

        /// Delay before cancelling, in milliseconds
        #[arg(long, default_value = "500")]
        cancel_after_ms: u64,

        /// Fail an operation after this many consecutive status read errors
        #[arg(long)]
        max_resolver_failures: Option<u32>,

        /// Print Prometheus metrics at the end
        #[arg(long)]
        metrics: bool,
    },

    /// Show how a raw server status string is interpreted
    Translate {
        /// Raw status text, e.g. CompletedSuccessfully
        raw: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr so stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if cli.json {
        json_output::enable_json_mode();
    }

    match cli.command {
        Commands::Simulate {
            operations,
            steps,
            interval_ms,
            timeout_ms,
            fail,
            hang,
            flaky,
            cancel,
            cancel_after_ms,
            max_resolver_failures,
            metrics,
        } => {
            let mut engine = EngineConfig::default()
                .with_poll_interval(Duration::from_millis(interval_ms))
                .with_operation_timeout(Duration::from_millis(timeout_ms));
            if let Some(failures) = max_resolver_failures {
                engine = engine.with_max_resolver_failures(failures);
            }

            let config = Config {
                operations,
                steps,
                fail,
                hang,
                flaky,
                cancel: cancel.map(|index| (index, Duration::from_millis(cancel_after_ms))),
                engine,
            };
            simulate(config, metrics).await?;
        }
        Commands::Translate { raw } => match translate(&raw) {
            Some(status) => println!("{raw} -> {status}"),
            None => println!("{raw} -> unrecognized (cached status is kept)"),
        },
    }

    Ok(())
}

fn plan_for(config: &Config, index: usize) -> Plan {
    if config.hang.contains(&index) {
        Plan::Hang
    } else if config.fail.contains(&index) {
        Plan::Fail {
            steps: config.steps,
            message: format!("simulated failure in operation {index}"),
        }
    } else if config.flaky.contains(&index) {
        Plan::Flaky {
            steps: config.steps,
        }
    } else {
        Plan::Succeed {
            steps: config.steps,
        }
    }
}

async fn simulate(config: Config, show_metrics: bool) -> Result<(), Box<dyn std::error::Error>> {
    let resolver = Arc::new(SimulatedResolver::new());
    let tracker = OperationTracker::new(resolver.clone(), config.engine.clone());
    let sweeper = tracker.spawn_sweeper();

    let events = tokio::spawn(forward_events(tracker.subscribe_events()));

    info!(
        operations = config.operations,
        interval_ms = tracker.config().poll_interval.as_millis() as u64,
        timeout_ms = tracker.config().operation_timeout.as_millis() as u64,
        "Starting simulation"
    );

    let mut ids: Vec<OperationId> = Vec::with_capacity(config.operations);
    for index in 0..config.operations {
        let definition =
            OperationDefinition::new("process_execution", format!("simulated-process-{index}"))
                .with_parameter("index", index)
                .with_metadata("source", "optrack-cli");
        let id = tracker.create_operation(definition).await?;
        resolver.plan(&id, plan_for(&config, index));
        ids.push(id);
    }

    let monitors: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                let outcome = tracker
                    .monitor(&id, |op| {
                        json_output::emit_progress(op);
                        if !json_output::is_json_mode() {
                            println!(
                                "  {} {:<10} {:>5.1}%",
                                op.name,
                                op.status,
                                op.progress.unwrap_or(0.0)
                            );
                        }
                    })
                    .await;
                (id, outcome)
            })
        })
        .collect();

    if let Some((index, delay)) = config.cancel {
        match ids.get(index) {
            Some(id) => {
                tokio::time::sleep(delay).await;
                if let Err(e) = tracker.cancel(id).await {
                    warn!(operation_id = %id, error = %e, "Cancel refused");
                }
            }
            None => warn!(index, "No operation with this index to cancel"),
        }
    }

    for monitor in monitors {
        let (id, outcome) = monitor.await?;
        let op = tracker.get(&id).await?;
        json_output::emit_summary(&op);
        if !json_output::is_json_mode() {
            match outcome {
                Ok(result) => println!("{} completed: {}", op.name, result),
                Err(e) => println!("{} ended: {}", op.name, e),
            }
        }
    }

    if show_metrics {
        print!("{}", collect_metrics(&tracker).await);
    }

    let evicted = tracker.cleanup(Duration::ZERO).await;
    info!(evicted, "Simulation finished");

    tracker.shutdown();
    sweeper.await?;
    // Watchers exit on shutdown; once the last handle is gone the event
    // channel closes and the forwarder drains and returns.
    drop(tracker);
    events.await?;
    Ok(())
}

async fn forward_events(mut rx: broadcast::Receiver<OperationEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => json_output::emit_lifecycle(&event),
            Err(RecvError::Lagged(n)) => {
                warn!("Event channel lagged by {} messages", n);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
