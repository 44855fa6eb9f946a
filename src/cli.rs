//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CortexOS - local multi-agent orchestration runtime
#[derive(Parser)]
#[command(
    name = "cortex",
    about = "Turn one prompt into a coordinated multi-agent execution",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run a prompt through the engine
    Run {
        /// The task to execute
        prompt: String,

        /// Working directory for agents
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Run budget in USD
        #[arg(long)]
        budget: Option<f64>,

        /// Model override
        #[arg(long)]
        model: Option<String>,

        /// Provider override
        #[arg(long)]
        provider: Option<String>,

        /// Disable memory recall and store
        #[arg(long)]
        no_memory: bool,

        /// Skip quality gates
        #[arg(long)]
        no_verify: bool,

        /// Analyze and plan, but execute nothing
        #[arg(long)]
        dry_run: bool,

        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Show the most recent run
    Status {
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Inspect agent roles
    Agents {
        #[command(subcommand)]
        command: AgentsCommand,
    },

    /// Inspect or manage memory
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },
}

#[derive(Subcommand)]
pub enum AgentsCommand {
    /// List the configured roles and their tool sets
    List,
    /// Show role status for the most recent run
    Status,
}

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// Show memory statistics
    Stats,
    /// Search memory entries
    Search {
        query: String,
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Delete all memory entries
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from([
            "cortex", "run", "build it", "--dir", "/tmp", "--budget", "0.5", "--provider", "groq", "--no-memory",
            "--dry-run", "--json",
        ]);
        match cli.command {
            Command::Run {
                prompt,
                dir,
                budget,
                provider,
                no_memory,
                no_verify,
                dry_run,
                json,
                ..
            } => {
                assert_eq!(prompt, "build it");
                assert_eq!(dir, PathBuf::from("/tmp"));
                assert_eq!(budget, Some(0.5));
                assert_eq!(provider.as_deref(), Some("groq"));
                assert!(no_memory);
                assert!(!no_verify);
                assert!(dry_run);
                assert!(json);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_memory_search() {
        let cli = Cli::parse_from(["cortex", "memory", "search", "parser", "--limit", "3"]);
        match cli.command {
            Command::Memory {
                command: MemoryCommand::Search { query, limit },
            } => {
                assert_eq!(query, "parser");
                assert_eq!(limit, 3);
            }
            _ => panic!("expected memory search"),
        }
    }
}
