//! # stsdesk CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize a new database
//! - `status` - Show ledger counts
//! - `list` - List the heads of a kind
//! - `history` - Show every version of a lineage
//! - `create` - Start a lineage from a JSON file
//! - `amend` - Append a version to a lineage head
//! - `review` - Approve or reject a pending head
//! - `verify` - Audit every lineage invariant
//! - `export` - Dump all lineages and equipment as JSON

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use stsdesk_core::LedgerError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// stsdesk - STS operations record server
///
/// Every form is an append-only chain of versions; only the newest
/// version of a chain can be amended.
#[derive(Parser, Debug)]
#[command(name = "stsdesk")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the ledger database
    #[arg(short = 'D', long, global = true, default_value = "stsdesk.db")]
    pub database: PathBuf,

    /// Storage backend
    #[arg(short = 'B', long, global = true, value_enum, default_value_t = Backend::Redb)]
    pub backend: Backend,

    /// TOML configuration file (defaults to ./stsdesk.toml when present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where the ledger lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// ACID database file (persistent)
    Redb,
    /// Process memory (lost on exit)
    Memory,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redb => "redb",
            Self::Memory => "memory",
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides [server] host)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides [server] port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize a new empty database
    Init {
        /// Replace an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Show ledger counts
    Status,

    /// List the heads of a record kind
    List {
        /// Record kind (e.g. sts-operation)
        #[arg(short, long)]
        kind: String,

        #[arg(short, long)]
        year: Option<i32>,

        #[arg(short, long)]
        month: Option<u8>,

        /// pending, approved or rejected
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show every version of the lineage a record belongs to
    History {
        #[arg(short, long)]
        kind: String,

        /// Any record id of the lineage
        #[arg(short, long)]
        id: u64,
    },

    /// Start a lineage from a JSON object of fields
    Create {
        #[arg(short, long)]
        kind: String,

        /// JSON file holding the form fields
        #[arg(short, long)]
        file: PathBuf,

        /// Attachment as FIELD=PATH (repeatable)
        #[arg(short, long = "attach")]
        attach: Vec<String>,
    },

    /// Append a version to the head record `id`
    Amend {
        #[arg(short, long)]
        kind: String,

        /// Id of the current head
        #[arg(short, long)]
        id: u64,

        /// JSON file holding the changed fields
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Attachment as FIELD=PATH (repeatable)
        #[arg(short, long = "attach")]
        attach: Vec<String>,
    },

    /// Approve or reject a pending head
    Review {
        #[arg(short, long)]
        kind: String,

        #[arg(short, long)]
        id: u64,

        #[arg(short, long)]
        reviewer: String,

        /// approve or reject
        #[arg(short, long)]
        decision: String,

        #[arg(long)]
        comment: Option<String>,
    },

    /// Audit every lineage invariant
    Verify,

    /// Export all lineages and equipment as JSON
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), LedgerError> {
    let config = Config::load(cli.config.as_deref())?;
    let ctx = Context {
        database: cli.database,
        backend: cli.backend,
        json_mode: cli.json_mode,
        config,
    };

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&ctx, host, port).await,
        Some(Commands::Init { force }) => cmd_init(&ctx, force),
        Some(Commands::Status) | None => cmd_status(&ctx),
        Some(Commands::List {
            kind,
            year,
            month,
            status,
        }) => cmd_list(&ctx, &kind, year, month, status.as_deref()),
        Some(Commands::History { kind, id }) => cmd_history(&ctx, &kind, id),
        Some(Commands::Create { kind, file, attach }) => cmd_create(&ctx, &kind, &file, &attach),
        Some(Commands::Amend {
            kind,
            id,
            file,
            attach,
        }) => cmd_amend(&ctx, &kind, id, file.as_deref(), &attach),
        Some(Commands::Review {
            kind,
            id,
            reviewer,
            decision,
            comment,
        }) => cmd_review(&ctx, &kind, id, &reviewer, &decision, comment),
        Some(Commands::Verify) => cmd_verify(&ctx),
        Some(Commands::Export { output }) => cmd_export(&ctx, &output),
    }
}
