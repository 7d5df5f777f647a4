//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: sync approval events (the default)
//! - failed-events: list or replay events DingTalk failed to push
//! - check-config: validate the config and print the rules

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// approval-sync - DingTalk approval events to Notable records
#[derive(Parser, Debug)]
#[command(name = "approval-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Process approval events until the stream ends or Ctrl-C
    Run(RunArgs),

    /// List events DingTalk failed to push
    FailedEvents {
        /// Process them once instead of only listing
        #[arg(long)]
        replay: bool,
    },

    /// Validate the config file and print the configured rules
    CheckConfig,
}

/// Options of `run`
#[derive(clap::Args, Debug, Clone, Default, PartialEq)]
pub struct RunArgs {
    /// JSON-lines event stream; stdin when omitted or `-`
    #[arg(short, long)]
    pub events: Option<PathBuf>,

    /// Where to write acknowledgements; stdout when omitted or `-`
    #[arg(short, long)]
    pub acks: Option<PathBuf>,

    /// Do not reload the config file when it changes
    #[arg(long)]
    pub no_watch: bool,

    /// Do not replay push-failed events at startup and after reloads
    #[arg(long)]
    pub skip_failed_events: bool,
}

impl Commands {
    /// `run` with default options, used when no subcommand is given
    pub fn default_run() -> Self {
        Commands::Run(RunArgs::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_args() {
        // No args runs the sync with defaults
        let cli = Cli::try_parse_from(["approval-sync"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::try_parse_from(["approval-sync", "-v"]).unwrap();
        assert!(cli.is_verbose());
    }

    #[test]
    fn test_cli_config_option() {
        let cli = Cli::try_parse_from(["approval-sync", "-c", "/etc/approval-sync.yml"]).unwrap();
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/etc/approval-sync.yml")));
    }

    #[test]
    fn test_run_options() {
        let cli = Cli::try_parse_from([
            "approval-sync",
            "run",
            "--events",
            "events.jsonl",
            "--no-watch",
            "--skip-failed-events",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.events, Some(PathBuf::from("events.jsonl")));
                assert!(args.acks.is_none());
                assert!(args.no_watch);
                assert!(args.skip_failed_events);
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_failed_events_replay() {
        let cli = Cli::try_parse_from(["approval-sync", "failed-events", "--replay"]).unwrap();
        assert_eq!(cli.command, Some(Commands::FailedEvents { replay: true }));
    }

    #[test]
    fn test_check_config_with_global_config() {
        let cli = Cli::try_parse_from(["approval-sync", "check-config", "--config", "x.yml"]).unwrap();
        assert_eq!(cli.command, Some(Commands::CheckConfig));
        assert_eq!(cli.config, Some(PathBuf::from("x.yml")));
    }

    #[test]
    fn test_default_run() {
        assert_eq!(Commands::default_run(), Commands::Run(RunArgs::default()));
    }

    #[test]
    fn test_cli_debug_assert() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
