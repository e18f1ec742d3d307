//! logsentry -- cron-driven log monitor.
//!
//! Each invocation loads the configuration, takes the run lock, performs one
//! unit of work (pass, digest, or test alert), and exits.
//!
//! # Exit codes
//!
//! - `0`: success, or another run holds the lock
//! - `1`: state, delivery, or runtime error; interrupted by a signal
//! - `2`: configuration error

use std::process::ExitCode;

use clap::Parser;

use logsentry::app::{self, RunOutcome, ShutdownSignal};
use logsentry::cli::Cli;
use logsentry::error::CliError;
use logsentry::logging;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("logsentry: failed to start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    ExitCode::from(runtime.block_on(run(cli)))
}

async fn run(cli: Cli) -> u8 {
    // 로깅 초기화 전이므로 설정 에러는 stderr로 직접 출력
    let config = match app::load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("logsentry: {e}");
            return e.exit_code();
        }
    };

    if let Err(e) = logging::init_tracing(&config.general) {
        eprintln!("logsentry: {e}");
        return CliError::Runtime(e.to_string()).exit_code();
    }

    if cli.validate {
        return match app::compile_rules(&config).await {
            Ok(rules) => {
                println!(
                    "configuration OK: {} rules, config {}",
                    rules.len(),
                    cli.config.display()
                );
                0
            }
            Err(e) => {
                eprintln!("logsentry: {e}");
                e.exit_code()
            }
        };
    }

    let mut shutdown = match ShutdownSignal::install() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            tracing::error!(error = %e, "signal setup failed");
            return CliError::Runtime(e.to_string()).exit_code();
        }
    };

    tracing::info!(mode = ?cli.mode(), dry_run = cli.dry_run, "logsentry starting");

    // 시그널을 받으면 실행 future가 drop되며 락 가드도 함께 해제된다
    tokio::select! {
        result = app::execute(&cli, &config) => match result {
            Ok(outcome) => {
                log_outcome(&outcome);
                0
            }
            Err(e) => {
                tracing::error!(error = %e, exit_code = e.exit_code(), "run failed");
                e.exit_code()
            }
        },
        signal = shutdown.recv() => {
            tracing::warn!(signal, "shutdown signal received, run interrupted");
            1
        }
    }
}

fn log_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Pass(summary) => tracing::info!(
            sources_scanned = summary.sources_scanned,
            sources_failed = summary.sources_failed,
            criticals_sent = summary.criticals_sent,
            criticals_lost = summary.criticals_lost,
            warn_events = summary.warn_events,
            health_issues = summary.health_issues,
            "pass finished"
        ),
        RunOutcome::Digest(summary) => tracing::info!(
            date = %summary.date,
            sent = summary.sent,
            pruned = summary.pruned,
            "digest finished"
        ),
        RunOutcome::TestSent => tracing::info!("test finished"),
        RunOutcome::LockDenied { pid } => {
            tracing::info!(holder_pid = ?pid, "skipped, lock held")
        }
    }
}
