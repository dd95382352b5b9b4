//! sideload - install local application bundles
//!
//! Thin front end over the install coordinator: parses arguments, loads
//! configuration, wires the spool installer service, relays events to the
//! terminal and answers installer confirmation prompts.

mod cli;
mod display;
mod error;
mod events;
mod logging;

use crate::cli::{Cli, Commands};
use crate::display::{CommandResult, OutputRenderer};
use crate::error::CliError;
use crate::events::EventHandler;
use clap::Parser;
use console::Term;
use sideload_config::{Config, OutputFormat};
use sideload_events::EventReceiver;
use sideload_install::{completion_channel, InstallCoordinator, PackageService, SpoolService};
use sideload_types::FollowUpAction;
use std::io::IsTerminal;
use std::path::Path;
use std::process;
use std::sync::Arc;
use tokio::select;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    let json_mode = cli.global.json || config.general.default_output == OutputFormat::Json;

    init_tracing(json_mode, cli.global.debug, &config.log_dir());

    match run(cli, config, json_mode).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("Application error: {}", e);
            if !json_mode {
                eprintln!("Error: {e}");
            }
            process::exit(1);
        }
    }
}

/// Load configuration: file (or defaults), then environment, then CLI flags
async fn load_config(cli: &Cli) -> Result<Config, CliError> {
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;
    if let Some(root) = &cli.global.service_root {
        config.paths.service_root = Some(root.clone());
    }
    Ok(config)
}

/// Main application logic; `Ok(false)` means the operation itself failed
async fn run(cli: Cli, config: Config, json_mode: bool) -> Result<bool, CliError> {
    info!("Starting sideload v{}", env!("CARGO_PKG_VERSION"));

    let (completions_tx, completions_rx) = completion_channel();
    let spool = SpoolService::new(
        config.service_root(),
        config.install.installer_label.clone(),
        config.platform.level,
        completions_tx,
    );

    let (event_sender, event_receiver) = sideload_events::channel();
    let mut builder = InstallCoordinator::builder()
        .with_config(&config)
        .with_service(Arc::new(spool.clone()))
        .with_installed(Arc::new(spool.clone()))
        .with_completions(completions_rx)
        .with_event_sender(event_sender);
    if matches!(cli.command, Commands::Sessions | Commands::Cleanup) {
        builder = builder.keep_stale_sessions();
    }
    let coordinator = builder.build().await?;

    let colors = !json_mode && Term::stderr().features().colors_supported();
    let mut event_handler = EventHandler::new(colors, cli.global.debug, json_mode);
    let prompts = PromptPolicy {
        assume_yes: matches!(cli.command, Commands::Install { confirm: true, .. }),
        interactive: !json_mode && std::io::stdin().is_terminal(),
    };

    info!(command = cli.command.name(), "executing command");
    let result = execute_command_with_events(
        cli.command,
        &coordinator,
        &spool,
        event_receiver,
        &mut event_handler,
        prompts,
    )
    .await?;

    OutputRenderer::new(json_mode).render_result(&result)?;
    Ok(!result.is_failure())
}

/// How installer confirmation prompts are answered
#[derive(Clone, Copy)]
struct PromptPolicy {
    assume_yes: bool,
    interactive: bool,
}

/// Execute command with concurrent event handling and Ctrl-C cancellation
async fn execute_command_with_events(
    command: Commands,
    coordinator: &InstallCoordinator,
    spool: &SpoolService,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
    prompts: PromptPolicy,
) -> Result<CommandResult, CliError> {
    let mut command_future = Box::pin(execute_command(command, coordinator, spool));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        select! {
            result = &mut command_future => {
                while let Ok(event) = event_receiver.try_recv() {
                    event_handler.handle_event(&event);
                }
                return result;
            }

            Some(event) = event_receiver.recv() => {
                if let Some(action) = event_handler.handle_event(&event) {
                    answer_confirmation(spool, action, prompts).await;
                }
            }

            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                warn!("interrupt received, cancelling");
                if let Err(e) = coordinator.cancel().await {
                    warn!(error = %e, "cancel failed");
                }
            }
        }
    }
}

/// Execute the specified command
async fn execute_command(
    command: Commands,
    coordinator: &InstallCoordinator,
    spool: &SpoolService,
) -> Result<CommandResult, CliError> {
    match command {
        Commands::Inspect { bundle } => {
            let preview = coordinator.inspect(&bundle).await?;
            Ok(CommandResult::Preview(preview))
        }

        Commands::Install { bundle, .. } => {
            let outcome = coordinator.install(&bundle).await?;
            let target = coordinator
                .current_bundle()
                .map_or_else(|| bundle.display().to_string(), |b| b.package_id.clone());
            Ok(CommandResult::Outcome {
                operation: "install",
                target,
                outcome,
            })
        }

        Commands::Uninstall { package } => {
            let outcome = coordinator.uninstall(&package).await?;
            Ok(CommandResult::Outcome {
                operation: "uninstall",
                target: package,
                outcome,
            })
        }

        Commands::List => {
            let packages = spool.installed_packages().await?;
            Ok(CommandResult::Packages { packages })
        }

        Commands::Sessions => {
            let sessions = spool.owned_sessions().await?;
            Ok(CommandResult::Sessions { sessions })
        }

        Commands::Cleanup => {
            let abandoned = coordinator.reset().await?;
            Ok(CommandResult::Cleanup { abandoned })
        }
    }
}

/// Answer a pending installer confirmation through the spool service
async fn answer_confirmation(spool: &SpoolService, action: FollowUpAction, prompts: PromptPolicy) {
    let Some(session_id) = action.session_id else {
        warn!(token = %action.token, "confirmation request without a session");
        return;
    };

    let accepted = if prompts.assume_yes {
        true
    } else if prompts.interactive {
        ask(&action.prompt).await
    } else {
        info!(session = %session_id, "no terminal to confirm on; declining");
        false
    };

    if let Err(e) = spool.confirm(session_id, accepted).await {
        warn!(session = %session_id, error = %e, "failed to answer confirmation");
    }
}

async fn ask(question: &str) -> bool {
    let question = format!("{question} [y/N] ");
    let answer = tokio::task::spawn_blocking(move || {
        let term = Term::stderr();
        term.write_str(&question).ok()?;
        term.read_line().ok()
    })
    .await
    .ok()
    .flatten();

    answer.is_some_and(|answer| matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug_enabled_flag: bool, log_dir: &Path) {
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_enabled_flag;
    let default_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,sideload=debug,sideload_install=debug")
        })
    };

    if debug_enabled {
        // Debug mode: structured JSON logs to file
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            if !json_mode {
                eprintln!("Warning: Failed to create log directory: {e}");
            }
        }

        let log_file = log_dir.join(format!(
            "sideload-{}.log",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        ));

        match std::fs::File::create(&log_file) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(default_filter())
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
        // JSON mode: keep stdout and stderr clean
        tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .with_env_filter("off")
            .init();
    } else {
        // Normal mode: warnings and errors to stderr
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("warn,sideload=warn")
                }),
            )
            .init();
    }
}
