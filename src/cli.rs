//! CLI argument parsing using clap v4

use clap::{Parser, Subcommand};

/// Narrator - spoken persona commentary for a running game
///
/// Reads game events from stdin, lets configured personas comment on them
/// through an OpenAI-compatible endpoint, and plays the commentary in order.
#[derive(Parser, Debug)]
#[command(name = "narrator")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the commentary pipeline, reading events from stdin
    Run {
        /// Path to configuration file
        #[arg(short, long, env = "NARRATOR_CONFIG")]
        config: Option<String>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Inspect configured personas
    Personas {
        #[command(subcommand)]
        subcommand: PersonasSubcommand,
    },

    /// Text generation provider checks
    Provider {
        #[command(subcommand)]
        subcommand: ProviderSubcommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum PersonasSubcommand {
    /// List the configured personas
    List {
        /// Path to configuration file
        #[arg(short, long, env = "NARRATOR_CONFIG")]
        config: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ProviderSubcommand {
    /// Send a one-shot greeting to check the endpoint and credentials
    Test {
        /// Path to configuration file
        #[arg(short, long, env = "NARRATOR_CONFIG")]
        config: Option<String>,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
