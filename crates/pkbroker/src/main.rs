//! pkbroker launcher
//!
//! Runs one transaction against the built-in dummy backend and prints every
//! dispatched event on stdout as a JSON line:
//!
//! ```text
//! pkbroker run search-name top
//! pkbroker run install-packages 'htop;3.3.0;x86_64;main' --cancel-after-ms 200
//! ```

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use pkbroker_job::{
    Backend, Dispatcher, DummyBackend, EngineConfig, EventKind, JobEvent, JobList, JobView,
};
use pkbroker_logging::LogConfig;
use pkbroker_protocol::{Exit, Hint, Role, TransactionFlags};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

const CONFIG_FILE_NAME: &str = "config.toml";

/// How long to wait for the worker thread to exit after finishing
const REAP_TIMEOUT_SECS: u64 = 5;

#[derive(Parser, Debug)]
#[command(name = "pkbroker", about = "Package transaction broker")]
struct Cli {
    /// Engine config file (default: $PKBROKER_HOME/config.toml if present)
    #[arg(long, global = true, env = "PKBROKER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one role against the dummy backend
    Run(RunArgs),

    /// List the roles the dummy backend implements
    Roles,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Role to run (e.g. search-name, install-packages)
    role: Role,

    /// Role arguments: search terms or package ids
    args: Vec<String>,

    /// Run as a background transaction (lower worker priority)
    #[arg(long)]
    background: bool,

    /// Locale passed to the backend
    #[arg(long)]
    locale: Option<String>,

    /// Maximum metadata cache age in seconds
    #[arg(long)]
    cache_age: Option<u32>,

    /// Requesting user id
    #[arg(long)]
    uid: Option<u32>,

    /// Transaction flags, comma separated (e.g. only-trusted,simulate)
    #[arg(long, default_value = "none")]
    flags: TransactionFlags,

    /// Request cancellation after this many milliseconds
    #[arg(long)]
    cancel_after_ms: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = pkbroker_logging::init_logging(LogConfig {
        app_name: "pkbroker",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    match run_command(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run_command(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Roles => {
            let backend = DummyBackend::new();
            println!("{}: {}", backend.name(), backend.description());
            for role in backend.roles() {
                println!("  {}", role);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run(args) => {
            let config = load_config(cli.config.as_deref())?;
            let exit = run_role(config, args).await?;
            Ok(exit_code(exit))
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = explicit {
        return EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }
    let default_path = match pkbroker_logging::pkbroker_home() {
        Ok(home) => home.join(CONFIG_FILE_NAME),
        Err(_) => return Ok(EngineConfig::default()),
    };
    if !default_path.exists() {
        return Ok(EngineConfig::default());
    }
    EngineConfig::load(&default_path)
        .with_context(|| format!("Failed to load config from {}", default_path.display()))
}

async fn run_role(config: EngineConfig, args: RunArgs) -> Result<Exit> {
    let backend = Arc::new(DummyBackend::new());
    if !backend.roles().contains(&args.role) {
        warn!("Backend {} does not implement {}", backend.name(), args.role);
    }

    let (mut dispatcher, bridge) = Dispatcher::new();
    let mut jobs = JobList::new(bridge, Arc::new(config));
    let id = jobs.create();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Exit>();

    {
        let job = jobs.get(id).context("Job vanished right after creation")?;
        for kind in EventKind::ALL {
            job.set_vfunc(kind, print_event);
        }
        job.set_vfunc(EventKind::Finished, move |view, event| {
            print_event(view, event);
            if let JobEvent::Finished(exit) = event {
                let _ = done_tx.send(*exit);
            }
        });

        job.set_role(args.role);
        job.set_parameters(serde_json::json!({ "args": args.args }));
        job.set_transaction_flags(args.flags);
        job.set_cmdline(std::env::args().collect::<Vec<_>>().join(" "));
        if let Some(locale) = args.locale {
            job.set_locale(locale);
        }
        if let Some(cache_age) = args.cache_age {
            job.set_cache_age(cache_age);
        }
        if let Some(uid) = args.uid {
            job.set_uid(uid);
        }
        if args.background {
            job.set_background(Hint::True);
        }

        if let Some(ms) = args.cancel_after_ms {
            let token = job.cancellable();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                info!("[Job {}] cancelling after {} ms", id, ms);
                token.cancel();
            });
        }

        info!("Starting {} as {}", job.view().role(), job.view().tid());
    }

    jobs.run(id, backend)
        .with_context(|| format!("Failed to start job {}", id))?;

    let exit = loop {
        tokio::select! {
            biased;

            exit = done_rx.recv() => break exit.unwrap_or(Exit::Unknown),

            more = dispatcher.dispatch_next() => {
                if !more {
                    warn!("[Job {}] dispatcher closed before the job finished", id);
                    break Exit::Unknown;
                }
            }
        }
    };

    // the worker may still run its stop hook
    let reaped = tokio::time::timeout(Duration::from_secs(REAP_TIMEOUT_SECS), async {
        while jobs.reap_finished() == 0 && !jobs.is_empty() {
            dispatcher.dispatch_pending();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    if reaped.is_err() {
        warn!("[Job {}] worker still running after {}s, leaving it", id, REAP_TIMEOUT_SECS);
    }
    dispatcher.dispatch_pending();

    info!("[Job {}] done with exit {}", id, exit);
    Ok(exit)
}

fn print_event(view: &JobView, event: &JobEvent) {
    match event_line(view, event) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!("[Job {}] failed to serialize {} event: {}", view.id(), event.kind(), e),
    }
}

fn event_line(view: &JobView, event: &JobEvent) -> serde_json::Result<String> {
    let mut line = serde_json::json!({
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "tid": view.tid(),
    });
    if let (Some(fields), serde_json::Value::Object(body)) =
        (line.as_object_mut(), serde_json::to_value(event)?)
    {
        fields.extend(body);
    }
    serde_json::to_string(&line)
}

fn exit_code(exit: Exit) -> ExitCode {
    if exit.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkbroker_job::{Job, JobId};

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "pkbroker",
            "-v",
            "run",
            "install-packages",
            "htop;3.3.0;x86_64;main",
            "--flags",
            "only-trusted,simulate",
            "--cancel-after-ms",
            "150",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.role, Role::InstallPackages);
        assert_eq!(args.args, vec!["htop;3.3.0;x86_64;main".to_string()]);
        assert!(args.flags.contains(TransactionFlags::ONLY_TRUSTED));
        assert!(args.flags.contains(TransactionFlags::SIMULATE));
        assert_eq!(args.cancel_after_ms, Some(150));
        assert!(!args.background);
    }

    #[test]
    fn test_parse_rejects_unknown_role() {
        assert!(Cli::try_parse_from(["pkbroker", "run", "make-coffee"]).is_err());
    }

    #[test]
    fn test_flags_default_to_none() {
        let cli = Cli::try_parse_from(["pkbroker", "run", "get-updates"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert!(args.flags.is_empty());
        assert!(args.args.is_empty());
    }

    #[test]
    fn test_event_line_is_flat_json() {
        let (_dispatcher, bridge) = Dispatcher::new();
        let job = Job::new(JobId::new(7), bridge, Arc::new(EngineConfig::default()));

        let line = event_line(job.view(), &JobEvent::Percentage(40)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["event"], "percentage");
        assert_eq!(value["data"], 40);
        assert_eq!(value["tid"], job.view().tid());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_finished_line_carries_exit() {
        let (_dispatcher, bridge) = Dispatcher::new();
        let job = Job::new(JobId::new(8), bridge, Arc::new(EngineConfig::default()));

        let line = event_line(job.view(), &JobEvent::Finished(Exit::Cancelled)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["event"], "finished");
        assert_eq!(value["data"], "cancelled");
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = std::env::temp_dir().join("pkbroker-missing-config-test");
        assert!(load_config(Some(&dir.join("nope.toml"))).is_err());
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code(Exit::Success), ExitCode::SUCCESS);
        assert_eq!(exit_code(Exit::Cancelled), ExitCode::FAILURE);
        assert_eq!(exit_code(Exit::Failed), ExitCode::FAILURE);
    }
}
