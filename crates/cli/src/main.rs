///! # CLI - parameter-server worker shell
///!
///! Runs one worker attempt with snapshotting enabled: on startup it
///! recovers matrix state from the newest snapshot of an earlier attempt,
///! applies the coordinator's task clocks, then snapshots in the background
///! while reading matrix commands from stdin. Designed for both interactive
///! use and scripted testing (pipe commands via stdin).
///!
///! ## Commands
///!
///! ```text
///! CREATE matrix               Create an empty matrix partition
///! ADD matrix row delta        Add delta to one row
///! GET matrix row              Print a row value (or "(nil)")
///! CLOCK matrix task value     Set a task clock
///! CLOCKS                      Print every (matrix, task, clock)
///! STATUS                      Print the snapshot manager state
///! SLEEP ms                    Pause the shell (lets the writer run)
///! EXIT / QUIT                 Stop the writer and shut down
///! ```
///!
///! ## Configuration
///!
///! ```text
///! PSNAP_OUTPUT_DIR          Snapshot output root           (required)
///! PSNAP_BACKUP_INTERVAL_MS  Snapshot interval              (default: 300000)
///! PSNAP_SNAPSHOT_ORDER      lexicographic | numeric        (default: lexicographic)
///! PSNAP_WORKER_INDEX        Worker group index             (default: 0)
///! PSNAP_ATTEMPT_INDEX       Attempt number of this run     (default: 0)
///! PSNAP_CLOCKS_FILE         Coordinator task clocks file   (optional)
///! PSNAP_LOG                 Log filter, written to stderr  (default: info)
///! ```
mod coordinator;

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use config::Config;
use matrix::PartitionManager;
use namespace::LocalNamespace;
use snapshot::{ReconcileOutcome, RecoveryOutcome, SnapshotManager, WorkerAttemptId};
use tracing_subscriber::EnvFilter;

use crate::coordinator::FileCoordinator;

fn init_logging() {
    let filter = EnvFilter::try_from_env("PSNAP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn parse_arg<T: std::str::FromStr>(arg: Option<&str>) -> Option<T> {
    arg.and_then(|s| s.parse().ok())
}

fn main() -> Result<()> {
    init_logging();

    let config = Config::from_env().context("invalid configuration")?;
    let attempt = WorkerAttemptId::new(config.worker_index, config.attempt_index);

    let engine = Arc::new(PartitionManager::new());
    let mut manager = SnapshotManager::new(
        attempt,
        config.snapshot.clone(),
        Arc::new(LocalNamespace::new()),
        engine.clone(),
        Arc::new(FileCoordinator::new(config.clocks_file.clone())),
    );
    manager.init().context("snapshot manager init failed")?;

    if let Some(report) = manager.process_recovery() {
        match &report.recovery {
            RecoveryOutcome::Recovered(found) => println!(
                "recovered from {} (attempt {})",
                found.path.display(),
                found.attempt_index
            ),
            RecoveryOutcome::NotFound => println!("no previous snapshot"),
            RecoveryOutcome::Failed(e) => println!("recovery failed: {}", e),
        }
        match &report.clocks {
            ReconcileOutcome::Applied { tasks, entries } => {
                println!("clocks applied ({} tasks, {} entries)", tasks, entries)
            }
            ReconcileOutcome::Unreachable(e) => println!("clocks not applied: {}", e),
        }
    }

    manager.start().context("snapshot writer start failed")?;

    println!(
        "worker started ({}, interval={}ms, matrices={})",
        attempt,
        config.snapshot.backup_interval.as_millis(),
        engine.len()
    );
    println!("Commands: CREATE m | ADD m row delta | GET m row | CLOCK m task value");
    println!("          CLOCKS | STATUS | SLEEP ms | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "CREATE" => match parse_arg::<u32>(parts.next()) {
                    Some(m) => {
                        if engine.create_matrix(m) {
                            println!("OK");
                        } else {
                            println!("ERR matrix {} exists", m);
                        }
                    }
                    None => println!("ERR usage: CREATE matrix"),
                },
                "ADD" => {
                    let m = parse_arg::<u32>(parts.next());
                    let row = parse_arg::<u64>(parts.next());
                    let delta = parse_arg::<f64>(parts.next());
                    match (m, row, delta) {
                        (Some(m), Some(row), Some(delta)) => {
                            println!("{}", engine.increment(m, row, delta))
                        }
                        _ => println!("ERR usage: ADD matrix row delta"),
                    }
                }
                "GET" => {
                    let m = parse_arg::<u32>(parts.next());
                    let row = parse_arg::<u64>(parts.next());
                    match (m, row) {
                        (Some(m), Some(row)) => match engine.get(m, row) {
                            Some(v) => println!("{}", v),
                            None => println!("(nil)"),
                        },
                        _ => println!("ERR usage: GET matrix row"),
                    }
                }
                "CLOCK" => {
                    let m = parse_arg::<u32>(parts.next());
                    let task = parse_arg::<u32>(parts.next());
                    let value = parse_arg::<u32>(parts.next());
                    match (m, task, value) {
                        (Some(m), Some(task), Some(value)) => {
                            if engine.set_clock(m, task, value) {
                                println!("OK");
                            } else {
                                println!("ERR no matrix {}", m);
                            }
                        }
                        _ => println!("ERR usage: CLOCK matrix task value"),
                    }
                }
                "CLOCKS" => {
                    let clocks = engine.clocks();
                    if clocks.is_empty() {
                        println!("(empty)");
                    }
                    for (m, task, clock) in clocks {
                        println!("clock matrix={} task={} value={}", m, task, clock);
                    }
                }
                "STATUS" => {
                    println!("{:?}", manager);
                }
                "SLEEP" => match parse_arg::<u64>(parts.next()) {
                    Some(ms) => {
                        std::thread::sleep(std::time::Duration::from_millis(ms));
                        println!("OK");
                    }
                    None => println!("ERR usage: SLEEP ms"),
                },
                "EXIT" | "QUIT" => {
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    manager.stop();
    println!("bye (snapshots={})", manager.snapshot_generation());
    Ok(())
}
