use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Sprint burndown and forecast reports")]
pub struct Cli {
    /// Path to the workbook (YAML, JSON or tab-separated)
    #[clap(long, short = 'w')]
    pub workbook: Option<PathBuf>,

    /// Path to the configuration file
    #[clap(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[clap(long, short = 'v')]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the burndown of a backlog, historical and forecast sprints
    Report {
        /// Backlog (sheet) name
        #[clap(long, short = 'b')]
        backlog: Option<String>,

        /// Only count stories of this release
        #[clap(long, short = 'r')]
        release: Option<String>,

        /// Output format (table, json, yaml, markdown, tsv)
        #[clap(long, short = 'f', default_value = "table")]
        format: String,

        /// Write to this file instead of stdout
        #[clap(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// One line per configured backlog
    Summary,

    /// Points by release
    Releases {
        /// Backlog (sheet) name
        #[clap(long, short = 'b')]
        backlog: Option<String>,
    },

    /// Manage sprint markers
    #[clap(subcommand)]
    Sprint(SprintCommand),

    /// Manage configuration
    #[clap(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub enum SprintCommand {
    /// Append the next sprint marker to a backlog
    Add {
        /// Backlog (sheet) name
        #[clap(long, short = 'b')]
        backlog: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show configuration values
    Show,

    /// Write a configuration file with defaults
    Init {
        /// Overwrite an existing file
        #[clap(long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Key (backlogs, sprintLength, sprintStartDay, dateFormat, forecastLimit)
        key: String,

        /// New value
        value: String,
    },

    /// Remove a configuration value
    Unset {
        key: String,
    },
}
