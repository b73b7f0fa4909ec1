//! scriptrun command-line interface.

pub mod commands;
pub mod logging;
pub mod render;

use anyhow::Context;
use clap::{Parser, Subcommand};
use scriptrun_core::SupervisorConfig;
use std::path::Path;
use std::process::ExitCode;

/// scriptrun - supervised execution of untrusted scripts
#[derive(Parser)]
#[command(name = "scriptrun")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "SCRIPTRUN_CONFIG", global = true)]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Screen and execute a script
    Run(commands::run::RunArgs),

    /// Screen a script without executing it
    Screen(commands::screen::ScreenArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Run diagnostics
    Doctor,

    /// Show version information
    Version,
}

/// Load the effective configuration.
///
/// An explicit path must exist and parse. Without one the default location is
/// tried and defaults are used when it is missing. Environment overrides apply
/// either way.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<SupervisorConfig> {
    match path {
        Some(path) => {
            let mut config = SupervisorConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env_overrides();
            Ok(config)
        }
        None => Ok(SupervisorConfig::load_or_default()),
    }
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run(args) => commands::run::run(args, load_config(config_path)?).await,
        Commands::Screen(args) => commands::screen::run(args, load_config(config_path)?).await,
        Commands::Config(args) => {
            commands::config::run(args, config_path).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Doctor => commands::doctor::run(config_path).await,
        Commands::Version => {
            println!("scriptrun {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_parse_version() {
        let cli = Cli::try_parse_from(["scriptrun", "version"]).unwrap();
        assert!(matches!(cli.command, Commands::Version));
    }

    #[test]
    fn test_parse_run_defaults() {
        let cli = Cli::try_parse_from(["scriptrun", "run", "job.py"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.file, PathBuf::from("job.py"));
                assert!(!args.stream);
                assert!(!args.json);
                assert!(args.timeout.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_parse_run_streaming_with_timeout() {
        let cli = Cli::try_parse_from([
            "scriptrun",
            "run",
            "job.py",
            "--stream",
            "--json",
            "--timeout",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert!(args.stream);
                assert!(args.json);
                assert_eq!(args.timeout, Some(3));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_parse_run_requires_file() {
        assert!(Cli::try_parse_from(["scriptrun", "run"]).is_err());
    }

    #[test]
    fn test_parse_screen() {
        let cli = Cli::try_parse_from(["scriptrun", "screen", "job.py"]).unwrap();
        match cli.command {
            Commands::Screen(args) => assert_eq!(args.file, PathBuf::from("job.py")),
            _ => panic!("Expected Screen command"),
        }
    }

    #[test]
    fn test_parse_config_show() {
        let cli = Cli::try_parse_from(["scriptrun", "config", "show"]).unwrap();
        match cli.command {
            Commands::Config(args) => {
                assert!(matches!(args.command, commands::config::ConfigCommand::Show));
            }
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_parse_config_init_force() {
        let cli = Cli::try_parse_from(["scriptrun", "config", "init", "--force"]).unwrap();
        match cli.command {
            Commands::Config(args) => {
                assert!(matches!(
                    args.command,
                    commands::config::ConfigCommand::Init { force: true }
                ));
            }
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["scriptrun", "run", "job.py", "-vv", "--config", "/tmp/c.json5"])
                .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json5")));
    }

    #[test]
    fn test_load_config_explicit_path_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = load_config(Some(&dir.path().join("missing.json5")));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_explicit_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scriptrun.json5");
        std::fs::write(&path, "{ execution: { poll_interval_ms: 50 } }").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.execution.poll_interval_ms, 50);
    }
}
