//! RunGate CLI - evaluate upstream dependency checks against a history snapshot.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rungate_core::{CoreError, JobDefinition, JobId, JobRun, RunId, RunState, ScheduleSpec};
use rungate_sensor::{
    CheckOutcome, DependencySet, GateConfig, HistorySnapshot, Poller, ReadinessGate,
};

/// Exit code for a check that is still pending (EX_TEMPFAIL).
const EXIT_PENDING: u8 = 75;

/// RunGate CLI - upstream dependency gate
#[derive(Parser)]
#[command(name = "rungate")]
#[command(about = "Gate a job run on the run history of its upstream jobs", long_about = None)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the responsibility interval of a run
    Interval {
        /// Schedule expression (cron, @daily, every:6h, ...)
        #[arg(short, long)]
        schedule: String,

        /// First valid logical time of the schedule (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,

        /// Logical time of the run (RFC 3339)
        #[arg(short, long)]
        logical_time: DateTime<Utc>,
    },

    /// Register a job in a history snapshot
    #[command(name = "register-job")]
    RegisterJob {
        /// History snapshot file (created if missing)
        #[arg(long)]
        history: PathBuf,

        /// Job ID
        #[arg(short, long)]
        job: String,

        /// Schedule expression
        #[arg(short, long)]
        schedule: String,

        /// First valid logical time (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,
    },

    /// Record a run of a registered job in a history snapshot
    #[command(name = "record-run")]
    RecordRun {
        /// History snapshot file
        #[arg(long)]
        history: PathBuf,

        /// Job ID
        #[arg(short, long)]
        job: String,

        /// Logical time of the run (RFC 3339)
        #[arg(short, long)]
        logical_time: DateTime<Utc>,

        /// Run state: running, success or failed
        #[arg(long, default_value = "success", value_parser = parse_run_state)]
        state: RunState,
    },

    /// Move a running run to its final state
    #[command(name = "finish-run")]
    FinishRun {
        /// History snapshot file
        #[arg(long)]
        history: PathBuf,

        /// Run ID printed by record-run
        #[arg(short, long)]
        run_id: String,

        /// Final state: success or failed
        #[arg(long, value_parser = parse_run_state)]
        state: RunState,
    },

    /// Create a check context file for a downstream run
    #[command(name = "init-context")]
    InitContext {
        /// Output context file
        #[arg(short, long)]
        out: PathBuf,

        /// Downstream job ID
        #[arg(long)]
        own_job: String,

        /// Downstream schedule expression
        #[arg(short, long)]
        schedule: String,

        /// Downstream schedule start (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,

        /// Downstream run logical time (RFC 3339)
        #[arg(short, long)]
        logical_time: DateTime<Utc>,

        /// Upstream job ID (repeat for several upstreams)
        #[arg(short, long = "target", required = true)]
        targets: Vec<String>,

        /// JSON gate config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Fail immediately if an upstream job is not registered
        #[arg(long)]
        existence_check: bool,

        /// Seconds between polls
        #[arg(long)]
        poke_interval_secs: Option<u64>,

        /// Seconds to wait before timing out
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Poll once, update the context file and exit (0 ready, 75 pending, 1 failed)
    Check {
        /// History snapshot file
        #[arg(long)]
        history: PathBuf,

        /// Context file created by init-context
        #[arg(long)]
        context: PathBuf,

        /// Evaluate as of this time instead of now (RFC 3339)
        #[arg(long)]
        now: Option<DateTime<Utc>>,

        /// Print gate metrics after the poll
        #[arg(long)]
        metrics: bool,
    },

    /// Poll until the check settles, sleeping the poke interval between polls
    Wait {
        /// History snapshot file
        #[arg(long)]
        history: PathBuf,

        /// Context file created by init-context
        #[arg(long)]
        context: PathBuf,

        /// Print gate metrics after settling
        #[arg(long)]
        metrics: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Interval {
            schedule,
            start,
            logical_time,
        } => {
            print_interval(&schedule, start, logical_time)?;
        }
        Commands::RegisterJob {
            history,
            job,
            schedule,
            start,
        } => {
            register_job(&history, job, &schedule, start).await?;
        }
        Commands::RecordRun {
            history,
            job,
            logical_time,
            state,
        } => {
            record_run(&history, job, logical_time, state).await?;
        }
        Commands::FinishRun {
            history,
            run_id,
            state,
        } => {
            finish_run(&history, RunId::new(run_id), state).await?;
        }
        Commands::InitContext {
            out,
            own_job,
            schedule,
            start,
            logical_time,
            targets,
            config,
            existence_check,
            poke_interval_secs,
            timeout_secs,
        } => {
            let mut gate_config = match config {
                Some(path) => GateConfig::from_file(path)?,
                None => GateConfig::default(),
            };
            gate_config.existence_check |= existence_check;
            if let Some(secs) = poke_interval_secs {
                gate_config.poke_interval_secs = secs;
            }
            if let Some(secs) = timeout_secs {
                gate_config.timeout_secs = secs;
            }
            gate_config.validate()?;

            let own_schedule = ScheduleSpec::parse(&schedule, start)?;
            // Fail now rather than on the first poll.
            own_schedule.interval_for(logical_time)?;

            let set = DependencySet::new(
                &gate_config,
                own_job,
                own_schedule,
                logical_time,
                targets.into_iter().map(JobId::from),
                Utc::now(),
            );
            write_context(&out, &set)?;
            println!("Context written to {}", out.display());
        }
        Commands::Check {
            history,
            context,
            now,
            metrics,
        } => {
            let outcome = check(&history, &context, now, metrics).await?;
            return Ok(exit_code(outcome));
        }
        Commands::Wait {
            history,
            context,
            metrics,
        } => {
            let outcome = wait(&history, &context, metrics).await?;
            return Ok(exit_code(outcome));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_interval(
    schedule: &str,
    start: DateTime<Utc>,
    logical_time: DateTime<Utc>,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec = ScheduleSpec::parse(schedule, start)?;
    let interval = spec.interval_for(logical_time)?;

    println!("  Schedule:   {}", spec.cadence);
    println!("  Start:      {}", interval.start().to_rfc3339());
    println!("  End:        {}", interval.end().to_rfc3339());
    println!("  Duration:   {}", format_span(interval.duration()));

    Ok(())
}

async fn register_job(
    history: &Path,
    job: String,
    schedule: &str,
    start: DateTime<Utc>,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = if history.exists() {
        HistorySnapshot::load(history).await?
    } else {
        HistorySnapshot::default()
    };
    let (registry, runs) = snapshot.into_stores().await?;

    let definition = JobDefinition::new(job, ScheduleSpec::parse(schedule, start)?);
    println!("Registered {} ({})", definition.job_id, definition.schedule.cadence);
    registry.register(definition).await;

    HistorySnapshot::capture(&registry, &runs).await.save(history).await?;
    Ok(())
}

async fn record_run(
    history: &Path,
    job: String,
    logical_time: DateTime<Utc>,
    state: RunState,
) -> Result<(), Box<dyn std::error::Error>> {
    let (registry, runs) = HistorySnapshot::load(history).await?.into_stores().await?;

    let job_id = JobId::from(job);
    let definition = registry
        .get(&job_id)
        .await
        .ok_or_else(|| CoreError::JobNotFound(job_id.to_string()))?;

    let run = JobRun::scheduled(&definition, logical_time)?.with_state(state);
    println!("Recorded run {} of {} at {} ({})", run.run_id, job_id, logical_time.to_rfc3339(), state);
    runs.record(run).await?;

    HistorySnapshot::capture(&registry, &runs).await.save(history).await?;
    Ok(())
}

async fn finish_run(
    history: &Path,
    run_id: RunId,
    state: RunState,
) -> Result<(), Box<dyn std::error::Error>> {
    let (registry, runs) = HistorySnapshot::load(history).await?.into_stores().await?;

    runs.set_state(&run_id, state).await?;
    println!("Run {} is now {}", run_id, state);

    HistorySnapshot::capture(&registry, &runs).await.save(history).await?;
    Ok(())
}

async fn build_gate(history: &Path) -> Result<ReadinessGate, Box<dyn std::error::Error>> {
    let (registry, runs) = HistorySnapshot::load(history).await?.into_stores().await?;
    Ok(ReadinessGate::new(Arc::new(registry), Arc::new(runs)))
}

async fn check(
    history: &Path,
    context: &Path,
    now: Option<DateTime<Utc>>,
    metrics: bool,
) -> Result<CheckOutcome, Box<dyn std::error::Error>> {
    let gate = build_gate(history).await?;
    let mut set = read_context(context)?;

    let now = now.unwrap_or_else(Utc::now);
    // Members settled before an error are kept.
    let result = set.check_at(&gate, now).await;
    write_context(context, &set)?;
    let outcome = result?;

    print_set(&set, outcome);
    if !outcome.is_terminal() {
        if let Some(next) = set.members().iter().filter_map(|m| m.next_poke_at(now)).min() {
            println!("  Next poke:  {}", next.to_rfc3339());
        }
    }
    if metrics {
        print!("{}", gate.metrics().render());
    }

    Ok(outcome)
}

async fn wait(
    history: &Path,
    context: &Path,
    metrics: bool,
) -> Result<CheckOutcome, Box<dyn std::error::Error>> {
    let poller = Poller::new(build_gate(history).await?);
    let mut set = read_context(context)?;

    info!(context = %context.display(), members = set.members().len(), "Polling until settled");
    let result = poller.run_set(&mut set).await;
    write_context(context, &set)?;
    let outcome = result?;

    print_set(&set, outcome);
    if metrics {
        print!("{}", poller.gate().metrics().render());
    }

    Ok(outcome)
}

fn read_context(path: &Path) -> Result<DependencySet, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read context '{}': {}", path.display(), e))?;
    let set: DependencySet = serde_json::from_str(&json)?;
    set.validate()?;
    Ok(set)
}

fn write_context(path: &Path, set: &DependencySet) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(set)?;
    std::fs::write(path, json)
        .map_err(|e| format!("Failed to write context '{}': {}", path.display(), e))?;
    Ok(())
}

fn print_set(set: &DependencySet, outcome: CheckOutcome) {
    println!("Outcome: {}", outcome_name(outcome));
    println!("{:<24}  {:<20}  {:>6}  {}", "UPSTREAM", "STATUS", "POLLS", "WAITED");
    println!("{}", "-".repeat(64));

    for member in set.members() {
        let status = member
            .terminal_outcome()
            .map(outcome_name)
            .unwrap_or("PENDING");
        let waited = chrono::Duration::from_std(member.state.elapsed)
            .map(format_span)
            .unwrap_or_else(|_| "-".to_string());
        println!(
            "{:<24}  {:<20}  {:>6}  {}",
            member.target_job_id, status, member.state.polls, waited
        );
    }
}

fn outcome_name(outcome: CheckOutcome) -> &'static str {
    match outcome {
        CheckOutcome::Ready => "READY",
        CheckOutcome::Pending => "PENDING",
        CheckOutcome::Failed(rungate_sensor::FailureReason::TargetNotFound) => {
            "FAILED (NOT FOUND)"
        }
        CheckOutcome::Failed(rungate_sensor::FailureReason::TimedOut) => "FAILED (TIMED OUT)",
    }
}

fn exit_code(outcome: CheckOutcome) -> ExitCode {
    match outcome {
        CheckOutcome::Ready => ExitCode::SUCCESS,
        CheckOutcome::Pending => ExitCode::from(EXIT_PENDING),
        CheckOutcome::Failed(_) => ExitCode::FAILURE,
    }
}

fn parse_run_state(s: &str) -> Result<RunState, String> {
    match s.to_ascii_lowercase().as_str() {
        "running" => Ok(RunState::Running),
        "success" => Ok(RunState::Success),
        "failed" => Ok(RunState::Failed),
        other => Err(format!("unknown run state '{}'", other)),
    }
}

fn format_span(span: chrono::Duration) -> String {
    let secs = span.num_seconds();
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let minutes = rem / 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
