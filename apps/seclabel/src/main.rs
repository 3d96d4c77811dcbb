//! seclabel - query and set SELinux security contexts
//!
//! Thin CLI over the host API: synchronous lookups run inline, path and
//! peer lookups go through the dispatch bridge and are collected on a run
//! loop driven by the main task.

mod cli;
mod display;
mod error;
mod logging;

use crate::cli::{Cli, Commands, GlobalArgs};
use crate::display::{CommandOutput, OutputRenderer, PathMatch};
use crate::error::CliError;
use clap::Parser;
use seclabel_config::{calculate_worker_threads, Config};
use seclabel_dispatch::{Outcome, RunLoop};
use seclabel_errors::LabelError;
use seclabel_events::{EventReceiver, EventSender};
use seclabel_host::SELinux;
use seclabel_platform::{codec, LabelOperations, LinuxLabelOperations};
use std::os::unix::process::CommandExt;
use std::process;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

fn main() {
    // Parse command line arguments first to check for JSON mode
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    let config = match load_config(&cli.global) {
        Ok(config) => config,
        Err(e) => {
            report_error(&e, json_mode);
            process::exit(1);
        }
    };

    init_tracing(json_mode, cli.global.debug, &config);

    if let Err(e) = run(cli, config) {
        error!("Application error: {}", e);
        report_error(&e, json_mode);
        process::exit(1);
    }
}

fn report_error(e: &CliError, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::json!({ "error": e.to_string() }));
    } else {
        eprintln!("Error: {e}");
    }
}

/// Load configuration with proper precedence:
/// file (or defaults), then environment, then CLI flags
fn load_config(global: &GlobalArgs) -> Result<Config, CliError> {
    let loader = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let mut config = loader.block_on(Config::load_or_default(&global.config))?;
    config.merge_env()?;
    apply_cli_config(&mut config, global)?;
    Ok(config)
}

fn apply_cli_config(config: &mut Config, global: &GlobalArgs) -> Result<(), CliError> {
    if let Some(workers) = global.workers {
        if workers == 0 {
            return Err(CliError::InvalidArguments(
                "--workers must be at least 1".to_string(),
            ));
        }
        config.dispatch.worker_threads = workers;
    }
    if let Some(policy_type) = &global.policy_type {
        config.policy.policy_type = Some(policy_type.clone());
    }
    if global.json {
        config.general.json = true;
    }
    config.validate()?;
    Ok(())
}

/// Main application logic
fn run(cli: Cli, config: Config) -> Result<(), CliError> {
    info!("Starting seclabel v{}", env!("CARGO_PKG_VERSION"));

    // The exec attribute is per thread; set it and exec before any runtime
    // threads exist.
    if let Commands::Exec { context, command } = &cli.command {
        return exec_in_context(&config, context, command);
    }

    let workers = calculate_worker_threads(config.dispatch.worker_threads);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("seclabel")
        .max_blocking_threads(workers)
        .build()?;
    info!(workers, "runtime started");

    let renderer = OutputRenderer::new(config.general.json);
    let Execution { output, failure } =
        runtime.block_on(execute_command(cli.command, &config))?;
    renderer.render(&output)?;

    if let Some(err) = failure {
        return Err(err.into());
    }

    info!("Command completed successfully");
    Ok(())
}

/// What a command produced, and the first lookup failure to exit with
struct Execution {
    output: CommandOutput,
    failure: Option<LabelError>,
}

impl From<CommandOutput> for Execution {
    fn from(output: CommandOutput) -> Self {
        Self {
            output,
            failure: None,
        }
    }
}

/// Execute a command, then log every event it emitted, even on failure
async fn execute_command(command: Commands, config: &Config) -> Result<Execution, CliError> {
    let (event_sender, event_receiver) = seclabel_events::channel();
    let result = run_command(command, config, event_sender).await;
    drain_events(event_receiver);
    result
}

/// Run a command with a host handle bound to a fresh run loop
async fn run_command(
    command: Commands,
    config: &Config,
    event_sender: EventSender,
) -> Result<Execution, CliError> {
    let mut run_loop = RunLoop::new();
    let selinux = Arc::new(SELinux::from_config(
        config,
        Arc::new(run_loop.handle()),
        Some(event_sender),
    )?);
    info!(command = command.name(), "executing");

    match command {
        Commands::Con { raw } => {
            let context = if raw {
                selinux.get_context_raw()?
            } else {
                selinux.get_context()?
            };
            Ok(CommandOutput::Context {
                subject: "process".to_string(),
                context,
            }
            .into())
        }

        Commands::File {
            path,
            no_dereference,
        } => {
            let context = if no_dereference {
                selinux.get_link_context(&path)?
            } else {
                selinux.get_file_context(&path)?
            };
            Ok(CommandOutput::Context {
                subject: path,
                context,
            }
            .into())
        }

        Commands::Match { paths } => {
            let collected = Arc::new(Mutex::new(Vec::with_capacity(paths.len())));
            for (index, path) in paths.iter().enumerate() {
                let collected = Arc::clone(&collected);
                selinux.resolve_path_context(path.clone(), move |outcome| {
                    collected
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((index, outcome));
                });
            }
            run_loop.run().await;

            let mut outcomes = std::mem::take(
                &mut *collected.lock().unwrap_or_else(PoisonError::into_inner),
            );
            outcomes.sort_by_key(|(index, _)| *index);

            let failed = outcomes.iter().filter(|(_, outcome)| outcome.is_err()).count();
            let failure = outcomes
                .iter()
                .find_map(|(_, outcome)| outcome.as_ref().err().cloned());
            if failed > 0 {
                warn!(failed, total = paths.len(), "some paths could not be matched");
            }

            let results = paths
                .into_iter()
                .zip(outcomes)
                .map(|(path, (_, outcome))| PathMatch::new(path, outcome))
                .collect();
            Ok(Execution {
                output: CommandOutput::Matches { results },
                failure,
            })
        }

        Commands::Peer { socket } => {
            let stream = tokio::net::UnixStream::connect(&socket).await?;
            let slot: Arc<Mutex<Option<Outcome>>> = Arc::default();
            let sink = Arc::clone(&slot);
            selinux.get_peer_context(&stream, move |outcome| {
                *sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
            });
            // The request works on its own copy of the descriptor.
            drop(stream);
            run_loop.run().await;

            let outcome = slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .ok_or_else(|| CliError::InvalidArguments("peer lookup did not complete".into()))?;
            Ok(CommandOutput::Context {
                subject: socket.display().to_string(),
                context: outcome?,
            }
            .into())
        }

        Commands::Exec { .. } => Err(CliError::InvalidArguments(
            "exec must run before the runtime starts".to_string(),
        )),
    }
}

/// Log every event emitted while the command ran
fn drain_events(mut event_receiver: EventReceiver) {
    while let Ok(message) = event_receiver.try_recv() {
        logging::log_event_with_tracing(&message);
    }
}

/// Set the exec context of this thread and replace the process
fn exec_in_context(config: &Config, context: &str, command: &[String]) -> Result<(), CliError> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| CliError::InvalidArguments("missing command to run".to_string()))?;

    let ops = LinuxLabelOperations::new(config.policy.clone());
    ops.set_exec_context(Some(&codec::encode(context)?))?;
    info!(program = %program, context = %context, "executing in new context");

    // Only returns on failure.
    let err = process::Command::new(program).args(args).exec();
    // Leave the attribute as it was for anything else this thread runs.
    if let Err(reset) = ops.set_exec_context(None) {
        error!("failed to reset exec context: {reset}");
    }
    Err(CliError::Io(err))
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug_enabled_flag: bool, config: &Config) {
    // Check if debug logging is enabled
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_enabled_flag;
    let debug_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,seclabel=debug"))
    };

    if debug_enabled {
        // Debug mode: structured JSON logs to file
        let log_dir = config.logs_dir();
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            if !json_mode {
                eprintln!("Warning: Failed to create log directory: {e}");
            }
        }

        let log_file = log_dir.join(format!(
            "seclabel-{}.log",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        ));

        match std::fs::File::create(&log_file) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(debug_filter())
                    .init();
                if !json_mode {
                    eprintln!("Debug logging enabled: {}", log_file.display());
                }
                return;
            }
            Err(e) => {
                if !json_mode {
                    eprintln!("Warning: Failed to create log file: {e}");
                }
            }
        }
    }

    if json_mode {
        // Keep stdout clean for the JSON result
        tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .with_env_filter("off")
            .init();
    } else if debug_enabled {
        // Fallback to stderr
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(debug_filter())
            .init();
    } else {
        // Normal mode: minimal logging to stderr
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_new(&config.general.log_filter)
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .init();
    }
}
