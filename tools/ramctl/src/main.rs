//! ramctl: operator tool for a RAM outbox database.
//!
//! # Usage
//!
//! ```bash
//! # Create the version, event and event log tables
//! ramctl --database shop init
//!
//! # Enqueue an event
//! ramctl send --key order.created --json '{"id": 42}'
//!
//! # Inspect what is queued and what happened
//! ramctl pending --parent-key shop
//! ramctl logs --key order.created --limit 20
//! ```
//!
//! Connection settings fall back to the `MYSQL_*` environment variables,
//! which may also come from a `.env` file.

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};

use ram::MySqlSettings;

mod commands;

#[derive(Parser, Debug)]
#[command(about = "Inspect and feed a RAM outbox database")]
struct Args {
    #[command(flatten)]
    mysql: MySqlArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug, Default)]
struct MySqlArgs {
    /// Schema name (falls back to MYSQL_DATABASE)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Server host (falls back to MYSQL_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port (falls back to MYSQL_FORWARD_PORT, then 3306)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// User name (falls back to MYSQL_USER)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Password (falls back to MYSQL_PASSWORD)
    #[arg(long, global = true)]
    password: Option<String>,

    /// Event table (falls back to MYSQL_EVENT_TABLE_NAME, then ram_events)
    #[arg(long, global = true)]
    event_table: Option<String>,

    /// Event log table (falls back to MYSQL_EVENT_LOG_TABLE_NAME, then ram_event_logs)
    #[arg(long, global = true)]
    event_log_table: Option<String>,
}

impl From<MySqlArgs> for MySqlSettings {
    fn from(args: MySqlArgs) -> Self {
        Self {
            database: args.database,
            host: args.host,
            password: args.password,
            user: args.user,
            port: args.port,
            event_table_name: args.event_table,
            event_log_table_name: args.event_log_table,
        }
    }
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Create missing tables and record the protocol version
    Init,
    /// Print the protocol version recorded in the database
    Version,
    /// Enqueue one event
    Send {
        /// Event key
        #[arg(long)]
        key: String,

        /// Parent key (defaults to "default")
        #[arg(long)]
        parent_key: Option<String>,

        /// Caller-side reference stored with the event
        #[arg(long = "ref", default_value = "")]
        event_ref: String,

        /// Delay before the event becomes due, in milliseconds
        #[arg(long, default_value_t = 0)]
        delay_ms: i64,

        /// JSON payload
        #[arg(long, conflicts_with = "text", required_unless_present = "text")]
        json: Option<String>,

        /// Plain-text payload
        #[arg(long)]
        text: Option<String>,
    },
    /// List queued events, earliest due first
    Pending {
        #[arg(long)]
        parent_key: Option<String>,

        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
    /// List event log entries, newest first
    Logs {
        #[arg(long = "ref")]
        event_ref: Option<String>,

        #[arg(long)]
        key: Option<String>,

        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    ram_core::tracing::init_tracing_with_default("warn");

    let args = Args::parse();
    let config = ram::MySqlConfig::resolve(args.mysql.into())?;
    commands::run(&config, args.command).await
}
