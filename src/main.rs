mod config;
mod extract;
mod metrics;
mod pageload;
mod patterns;
mod report;
mod session;

use clap::{Parser, ValueEnum};
use config::LoadTrigger;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Measure Vite dev-server startup: spawn `vite` with debug logging, parse
/// its output for timing milestones, optionally measure page load, then
/// tear the server down.
#[derive(Parser, Debug)]
#[command(name = "vitemark", version, about)]
pub struct Cli {
    /// Force the dev server to re-bundle dependencies (same as vite --force)
    #[arg(long)]
    force: bool,

    /// Measure page load once the given milestone is reached
    #[arg(long, value_enum, value_name = "WHEN")]
    load: Option<LoadOn>,

    /// Config file path
    #[arg(short, long, default_value = "vitemark.toml")]
    config: PathBuf,

    /// Extra logging (pattern matches, state transitions)
    #[arg(short, long)]
    verbose: bool,
}

/// CLI values for `--load`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LoadOn {
    /// Once the server reports ready
    #[value(name = "startUp")]
    StartUp,
    /// Once dependency prebundling finishes
    #[value(name = "prebundle")]
    Prebundle,
}

fn load_trigger(load: Option<LoadOn>) -> LoadTrigger {
    match load {
        None => LoadTrigger::None,
        Some(LoadOn::StartUp) => LoadTrigger::OnStartUp,
        Some(LoadOn::Prebundle) => LoadTrigger::OnPrebundle,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let file_config = match config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("vitemark: {e}");
            return ExitCode::FAILURE;
        }
    };

    let run_config = config::RunConfig {
        force: cli.force,
        load_trigger: load_trigger(cli.load),
        vite: file_config.vite,
        session: file_config.session,
    };
    tracing::debug!(?run_config, "resolved run configuration");

    // Show which vite the measurement is about before starting it
    print_server_version(&run_config.vite.command).await;

    let timeout = Duration::from_secs(run_config.session.page_load_timeout_secs);
    let loader = match pageload::HttpPageLoader::new(timeout) {
        Ok(loader) => loader,
        Err(e) => {
            eprintln!("vitemark: {e}");
            return ExitCode::FAILURE;
        }
    };

    let reporter = report::StatusReporter::new(run_config.load_trigger);

    match session::run_session(&run_config, &loader, &reporter).await {
        Ok(record) => {
            tracing::info!(?record, "session complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            reporter.finish();
            eprintln!("vitemark: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run `<command> --version` with inherited stdio, mirroring what the
/// server would print at the top of a normal run.
async fn print_server_version(command: &str) {
    let status = tokio::process::Command::new(command)
        .arg("--version")
        .status()
        .await;
    if let Err(e) = status {
        tracing::warn!(error = %e, command, "could not query dev server version");
    }
    println!();
}
