//! EggCarton CLI - store secrets and inject them into commands
//!
//! Usage:
//! ```bash
//! egg login                      # authenticate in the browser
//! egg lay DB_PASSWORD hunter2    # store a secret
//! egg get                        # list all secrets
//! egg get DB_PASSWORD            # print one secret
//! egg break DB_PASSWORD          # delete a secret
//! egg hatch -- ./deploy.sh       # run with secrets as env vars
//! egg logout
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use eggcarton_core::Config;

#[derive(Parser)]
#[command(
    name = "egg",
    version,
    about = "EggCarton - secure secret management from the terminal"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Authenticate with EggCarton in the browser
    Login {
        /// Log in again even if the current session is still valid
        #[arg(long)]
        force: bool,
    },

    /// Store a secret
    #[command(alias = "add")]
    Lay {
        /// Secret name
        key: String,
        /// Secret value
        value: String,
    },

    /// Print one secret, or list all of them
    Get {
        /// Secret name (lists all secrets if omitted)
        key: Option<String>,
    },

    /// Delete a secret
    Break {
        /// Secret name
        key: String,
    },

    /// Run a command with all secrets injected as environment variables
    #[command(alias = "run")]
    Hatch {
        /// Command and arguments, after `--`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Remove stored credentials
    Logout,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run the selected command, returning the process exit code
async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Login { force } => commands::login::run(&load_config()?, force).await?,
        Command::Lay { key, value } => {
            commands::secrets::lay(&load_config()?, &key, &value).await?
        }
        Command::Get { key } => commands::secrets::get(&load_config()?, key.as_deref()).await?,
        Command::Break { key } => commands::secrets::break_egg(&load_config()?, &key).await?,
        Command::Hatch { command } => return commands::hatch::run(&load_config()?, &command).await,
        // Works without API settings so a broken config can still be logged out of
        Command::Logout => commands::logout::run().await?,
    }

    Ok(0)
}

fn load_config() -> Result<Config> {
    let config = Config::load()?;
    debug!("Using data directory {:?}", config.data_dir());
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            debug!("{:?}", e);
            eprintln!("Error: {e:#}");
            1
        }
    };

    std::process::exit(code);
}
