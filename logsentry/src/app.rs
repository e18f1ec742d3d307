//! One invocation, from loaded configuration to a finished run.
//!
//! Kept separate from `main` so integration tests can drive a complete
//! pass without a global tracing subscriber or a real notification channel.

use chrono::NaiveDate;

use logsentry_core::config::MonitorConfig;
use logsentry_monitor::{
    DigestSummary, HostProbe, LockOutcome, Notifier, PassSummary, RuleSet, RunCoordinator,
    SystemProbe,
};

use crate::cli::{Cli, Mode};
use crate::error::CliError;
use crate::notifier::ChannelNotifier;

/// What an invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A monitoring pass completed.
    Pass(PassSummary),
    /// The digest step completed (delivered or not).
    Digest(DigestSummary),
    /// The test alert was delivered.
    TestSent,
    /// Another live process holds the run lock; nothing was done.
    LockDenied {
        /// PID recorded in the lock file, if the holder has written it yet.
        pid: Option<u32>,
    },
}

/// Load the configuration file, then apply CLI overrides and re-validate.
///
/// Precedence: CLI flags > environment variables > config file > defaults.
///
/// # Errors
///
/// Returns [`CliError::Config`] when the file is missing, unparsable, or invalid.
pub async fn load_config(cli: &Cli) -> Result<MonitorConfig, CliError> {
    let mut config = MonitorConfig::load(&cli.config).await?;

    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }
    config.validate()?;

    Ok(config)
}

/// Compile all rules, failing on the first invalid one.
///
/// # Errors
///
/// Returns [`CliError::Config`] for unreadable rule files or invalid rules.
pub async fn compile_rules(config: &MonitorConfig) -> Result<RuleSet, CliError> {
    Ok(RuleSet::from_config(&config.rules, &config.rule_files).await?)
}

/// Run the mode selected on the command line against the host.
///
/// # Errors
///
/// See [`CliError::exit_code`] for how failures map to exit codes.
pub async fn execute(cli: &Cli, config: &MonitorConfig) -> Result<RunOutcome, CliError> {
    let rules = compile_rules(config).await?;
    let notifier = ChannelNotifier::from_config(&config.notify, cli.dry_run)?;
    let today = chrono::Local::now().date_naive();

    execute_with(cli.mode(), config, rules, notifier, HostProbe::new(), today).await
}

/// Run one mode with explicit collaborators.
///
/// Test mode takes no lock and touches no state. The other modes skip
/// quietly when another live process holds the lock.
///
/// # Errors
///
/// Fails when the state directory is unusable, when the counter log cannot
/// be read during a digest, or when the test alert is not delivered.
pub async fn execute_with<N, P>(
    mode: Mode,
    config: &MonitorConfig,
    rules: RuleSet,
    notifier: N,
    probe: P,
    today: NaiveDate,
) -> Result<RunOutcome, CliError>
where
    N: Notifier,
    P: SystemProbe,
{
    let mut coordinator = RunCoordinator::new(config, rules, notifier, probe);

    if mode == Mode::Test {
        coordinator.run_test().await?;
        tracing::info!(notifier = coordinator.dispatcher().notifier().name(), "test alert sent");
        return Ok(RunOutcome::TestSent);
    }

    let guard = match coordinator.acquire_lock()? {
        LockOutcome::Acquired(guard) => guard,
        LockOutcome::Denied { pid } => {
            tracing::info!(
                holder_pid = ?pid,
                lock = %coordinator.layout().lock.display(),
                "another run is in progress, skipping"
            );
            return Ok(RunOutcome::LockDenied { pid });
        }
    };

    let outcome = if mode == Mode::Digest {
        RunOutcome::Digest(coordinator.run_digest(&guard, today).await?)
    } else {
        RunOutcome::Pass(coordinator.run_pass(&guard, today).await?)
    };

    drop(guard);
    Ok(outcome)
}

/// SIGTERM/SIGINT listener installed before the run starts.
pub struct ShutdownSignal {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    /// Install SIGTERM and SIGINT handlers.
    ///
    /// # Errors
    ///
    /// Returns an error if either handler cannot be installed.
    pub fn install() -> anyhow::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

        Ok(Self { sigterm, sigint })
    }

    /// Wait for the first signal and return its name.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}
