//! GuildPilot CLI — the main entry point.
//!
//! Commands:
//! - `replay`  — Run one request through the orchestrator against a scripted model
//! - `config`  — Show, validate or locate the configuration file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod console;

#[derive(Parser)]
#[command(
    name = "guildpilot",
    about = "GuildPilot — tool-calling orchestration for chat-server assistants",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted conversation through the full orchestration loop
    Replay(commands::replay::ReplayArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show {
        /// Read this file instead of the default location
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Check the configuration for errors
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the default configuration file path
    Path,

    /// Print a configuration file populated with defaults
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Replay(args) => commands::replay::run(args).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show { config } => commands::config_cmd::show(config.as_deref()).await?,
            ConfigAction::Validate { config } => {
                commands::config_cmd::validate(config.as_deref()).await?
            }
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn replay_arguments_parse() {
        let cli = Cli::try_parse_from([
            "guildpilot",
            "replay",
            "--script",
            "run.json",
            "--message",
            "make a Mods role",
            "--no-pacing",
        ])
        .unwrap();
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.script, PathBuf::from("run.json"));
                assert_eq!(args.message, "make a Mods role");
                assert!(args.no_pacing);
                assert!(!args.no_plan);
                assert_eq!(args.author, "operator");
            }
            Commands::Config { .. } => panic!("expected replay"),
        }
    }

    #[test]
    fn config_subcommands_parse() {
        let cli = Cli::try_parse_from(["guildpilot", "--json", "config", "validate"]).unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Validate { config: None }
            }
        ));
    }
}
