mod cli;
mod cmd;
mod format;
mod passphrase;
mod prompt;
mod signal;

use clap::Parser;

use stackup_core::config;
use stackup_core::error::StackupError;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // `config` generates a starter file and needs no existing configuration.
    if let Commands::Config { dest } = &cli.command {
        if let Err(e) = cmd::config_gen::run(dest.as_deref()) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let Some(path) = config::resolve_config_path(cli.config.as_deref()) else {
        eprintln!("Error: no configuration file found.");
        eprintln!("Searched:");
        for candidate in config::default_config_search_paths() {
            eprintln!("  {}", candidate.display());
        }
        eprintln!();
        eprintln!("Run `stackup config` to generate a starter file.");
        std::process::exit(2);
    };
    tracing::info!(config = %path.display(), "using configuration file");

    let cfg = match config::load(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    signal::install_signal_handlers();

    match cmd::dispatch(&cli.command, &cfg) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if signal::SHUTDOWN.load(std::sync::atomic::Ordering::SeqCst) {
                eprintln!("Interrupted.");
            }
            eprintln!("Error: {e}");
            std::process::exit(exit_code_for(&e));
        }
    }
}

fn exit_code_for(err: &StackupError) -> i32 {
    match err {
        StackupError::OperationInProgress(_) => 3,
        StackupError::Config(_) => 2,
        _ => 1,
    }
}
