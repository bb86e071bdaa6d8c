//! Socket Bridge CLI - raw socket exchanges with hex payloads.
//!
//! This is the main binary entry point. See the `socket_bridge` library
//! for the core functionality.

use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use socket_bridge::{commands, Config};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "socket-bridge")]
#[command(version)]
#[command(about = "Raw TCP/UDP socket bridge with hex-encoded payloads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a TCP request and print the hex response
    Get {
        /// Remote host
        #[arg(long)]
        host: String,
        /// Remote port
        #[arg(long)]
        port: u16,
        /// Hex request payload
        #[arg(long)]
        request: String,
        /// Deadline in milliseconds (defaults to config)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Send one UDP datagram and print the hex reply
    Udp {
        /// Remote host
        #[arg(long)]
        host: String,
        /// Remote port
        #[arg(long)]
        port: u16,
        /// Hex request payload
        #[arg(long)]
        request: String,
    },
    /// Publish on a named TCP connection, answering reads with a canned reply
    Publish {
        /// Remote host
        #[arg(long)]
        host: String,
        /// Remote port
        #[arg(long)]
        port: u16,
        /// Hex request payload sent once on connect
        #[arg(long)]
        request: String,
        /// Name to register the connection under
        #[arg(long)]
        name: String,
        /// Hex reply written back for every inbound read
        #[arg(long)]
        reply: String,
    },
    /// Serve bridge commands as JSON lines over stdin/stdout
    Serve,
    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries results and the serve protocol.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Get {
            host,
            port,
            request,
            timeout_ms,
        } => {
            commands::request::get(config, &host, port, &request, timeout_ms)?;
        }
        Commands::Udp {
            host,
            port,
            request,
        } => {
            commands::request::udp(config, &host, port, &request)?;
        }
        Commands::Publish {
            host,
            port,
            request,
            name,
            reply,
        } => {
            commands::request::publish(config, &host, port, &request, &name, &reply)?;
        }
        Commands::Serve => {
            commands::serve::run(config)?;
        }
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                config.save()?;
                log::info!("Saved configuration");
            }
        }
    }

    Ok(())
}
