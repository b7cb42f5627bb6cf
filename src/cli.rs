//! CLI argument parsing
//!
//! Uses clap for argument parsing with derive macros.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

/// Turn Claude Code sessions into a live real-time strategy map
#[derive(Parser, Debug)]
#[command(name = "cli-rts")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Daemon port (default: from config file, else 4175)
    #[arg(short, long, env = "CLI_RTS_PORT", global = true)]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,

    /// Config file (default: <config dir>/cli-rts/config.toml)
    #[arg(long, env = "CLI_RTS_CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the daemon that receives hook events and maintains the game state
    Start,

    /// Forward one hook event from stdin to the daemon
    ///
    /// Installed as a Claude Code hook by `init`. Always exits 0.
    Emit {
        /// Event slug (session-start, pre-tool, ...)
        event_type: String,
    },

    /// Install Claude Code hooks to a project
    Init {
        /// Project path (default: current directory)
        path: Option<PathBuf>,

        /// Remove previously installed cli-rts hooks before adding
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Generate shell completions and print to stdout
pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "cli-rts", &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_emit() {
        let cli = Cli::try_parse_from(["cli-rts", "emit", "pre-tool", "--port", "5000"]).unwrap();
        assert_eq!(cli.port, Some(5000));
        match cli.command {
            Commands::Emit { event_type } => assert_eq!(event_type, "pre-tool"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_init_force() {
        let cli = Cli::try_parse_from(["cli-rts", "init", "/tmp/project", "--force"]).unwrap();
        match cli.command {
            Commands::Init { path, force } => {
                assert_eq!(path, Some(PathBuf::from("/tmp/project")));
                assert!(force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["cli-rts"]).is_err());
    }
}
