//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tapdinner - shared household dinner planner
#[derive(Parser, Debug)]
#[command(
    name = "tp",
    version,
    about = "Shared household dinner planner: who eats at home this week"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute; defaults to showing this week
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage household members
    Member {
        #[command(subcommand)]
        command: MemberCommand,
    },

    /// Cycle one member's mark for a day (○ → × → ? → blank)
    Mark {
        /// Member name or id
        #[arg(value_name = "NAME|ID")]
        member: String,

        /// Day to mark (YYYY-MM-DD)
        #[arg(value_name = "DATE")]
        date: String,
    },

    /// Show the week grid
    Week {
        /// Weeks relative to the current one (-1 is last week)
        #[arg(short, long, default_value = "0", allow_hyphen_values = true)]
        offset: i64,
    },

    /// Configure household sync
    Sync {
        #[command(subcommand)]
        command: SyncCommand,
    },

    /// Stay connected and redraw the week whenever it changes
    Watch,
}

#[derive(Debug, Subcommand)]
pub enum MemberCommand {
    /// Add a member
    Add {
        /// Display name
        name: String,
    },

    /// Remove a member and all of their marks
    Rm {
        /// Member name or id
        #[arg(value_name = "NAME|ID")]
        member: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List members
    List,
}

#[derive(Debug, Subcommand)]
pub enum SyncCommand {
    /// Set the household passphrase and connect to its channel
    Set {
        /// Shared passphrase
        passphrase: String,
    },

    /// Show the current sync status
    Show,

    /// Stop syncing and forget the passphrase
    Off,
}
