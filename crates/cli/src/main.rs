//! ironloop CLI — the main entry point.
//!
//! Commands:
//! - `chat`     — Interactive chat with the configured backend
//! - `auto`     — Autonomous command loop towards a goal
//! - `pair`     — Two chats collaborating, the leader decides when to stop
//! - `bulk`     — Run prompt groups from a file and save the replies
//! - `cmd`      — Parse and run the commands in one prompt
//! - `init`     — Write a default config file
//! - `version`  — Print the version

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::Overrides;

#[derive(Parser)]
#[command(
    name = "ironloop",
    about = "ironloop — autonomous chat agent driver",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.ironloop/config.toml)
    #[arg(short, long, global = true, env = "IRONLOOP_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat interactively over stdin/stdout
    Chat,

    /// Run the autonomous command loop
    Auto {
        /// Goal inserted into the built-in prompt
        #[arg(short, long)]
        goal: Option<String>,

        /// Replace the built-in prompt entirely
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Let two chats collaborate on a goal
    Pair {
        #[arg(short, long)]
        goal: Option<String>,

        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Run prompt groups from a file
    Bulk {
        /// `.json` list or blank-line separated text file
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Where to write the JSON results
        #[arg(short = 'O', long = "bulk-output")]
        bulk_output: Option<PathBuf>,
    },

    /// Parse and run the commands in one prompt, print the results
    Cmd {
        /// Text containing a command array
        prompt: String,
    },

    /// Write a default config file
    Init,

    /// Print the version
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("ironloop {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if let Commands::Init = cli.command {
        return commands::init::run(cli.config).await;
    }

    let mut config = commands::load_config(cli.config.as_deref(), &cli.overrides)?;
    let cancel = commands::shutdown_token();

    match cli.command {
        Commands::Chat => commands::chat::run(&config, &cancel).await?,
        Commands::Auto { goal, prompt } => {
            commands::set_goal(&mut config, goal, prompt);
            commands::auto::run(&config, &cancel).await?
        }
        Commands::Pair { goal, prompt } => {
            commands::set_goal(&mut config, goal, prompt);
            commands::pair::run(&config, &cancel).await?
        }
        Commands::Bulk { input, bulk_output } => {
            if input.is_some() {
                config.bulk.input = input;
            }
            if bulk_output.is_some() {
                config.bulk.output = bulk_output;
            }
            commands::bulk::run(&config, &cancel).await?
        }
        Commands::Cmd { prompt } => commands::cmd::run(&config, &cancel, &prompt).await?,
        Commands::Init | Commands::Version => {}
    }

    Ok(())
}
