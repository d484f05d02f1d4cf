mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "wadriver")]
#[command(about = "Drive a WhatsApp Web session from the command line", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show configuration, profile and lock status
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Open the profile and log in, showing a pairing QR code if needed
    Login,

    /// Scan the chat list
    Check {
        /// Only report chats mentioning this keyword (repeatable). Defaults to
        /// the configured filter keywords.
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,

        /// Report every chat, ignoring configured keywords
        #[arg(long, conflicts_with = "keywords")]
        all: bool,

        /// Skip the archived view
        #[arg(long)]
        no_archived: bool,

        /// Rows to read per view
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send a message to a phone number or a contact/group name
    Send {
        /// Phone number (digits, optional +, spaces, dashes) or chat name
        target: String,

        /// Message text; newlines are kept
        message: String,

        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send a message to the configured admin number
    Alert {
        message: String,
    },

    /// Remove a lock file left behind by a crashed run
    Unlock {
        /// Remove it even if its owner process looks alive
        #[arg(long)]
        force: bool,
    },

    /// Check for keyword matches periodically until interrupted
    Watch {
        /// Seconds between checks (overrides engine.checkIntervalSecs)
        #[arg(short, long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let (plain, json) = if cli.log_json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();

    match cli.command {
        Commands::Status { json } => {
            commands::status::run(json)?;
        }
        Commands::Login => {
            commands::login::run().await?;
        }
        Commands::Check {
            keywords,
            all,
            no_archived,
            limit,
            json,
        } => {
            commands::check::run(keywords, all, !no_archived, limit, json).await?;
        }
        Commands::Send {
            target,
            message,
            json,
        } => {
            commands::send::run(&target, &message, json).await?;
        }
        Commands::Alert { message } => {
            commands::send::alert(&message).await?;
        }
        Commands::Unlock { force } => {
            commands::unlock::run(force)?;
        }
        Commands::Watch { interval } => {
            commands::watch::run(interval).await?;
        }
    }

    Ok(())
}
