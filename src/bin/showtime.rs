//! Showtime command line.
//!
//! `serve` runs the cue service and writes every announcement to stdout as a
//! JSON line. `send` fires a cue at a running service over UDP, optionally
//! repeating on an interval.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use showtime::{resolve_cue_target, Service, ServiceConfig};
use std::io::{self, Write};
use std::net::UdpSocket;
use std::thread;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "showtime", version, about = "Live performance cue time service")]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for cues and stream announcements to stdout
    Serve {
        /// UDP address on which to listen for cues
        #[arg(long, default_value = ":9001")]
        cue_addr: String,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Periodic announcement interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Announcements buffered per subscriber
        #[arg(long)]
        capacity: Option<usize>,
    },

    /// Send a cue datagram to a running service
    Send {
        /// Address of the cue listener (":port" means this host)
        #[arg(long, default_value = ":9001")]
        to: String,

        /// Cue identifier to fire
        #[arg(short, long)]
        cue: String,

        /// Repeat every N seconds until interrupted
        #[arg(short, long)]
        repeat_secs: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    // stdout carries announcements, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Serve {
            cue_addr,
            config,
            interval_ms,
            capacity,
        } => serve(&cue_addr, config.as_deref(), interval_ms, capacity),
        Commands::Send {
            to,
            cue,
            repeat_secs,
        } => send(&to, &cue, repeat_secs.map(Duration::from_secs)),
    }
}

fn serve(
    cue_addr: &str,
    config_path: Option<&str>,
    interval_ms: Option<u64>,
    capacity: Option<usize>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => ServiceConfig::default(),
    };
    if let Some(ms) = interval_ms {
        config.tick_interval_ms = ms;
    }
    if let Some(n) = capacity {
        config.inbox_capacity = n;
    }

    let service = Service::with_config(config).context("invalid configuration")?;

    let sub = service.subscribe();
    thread::Builder::new()
        .name("showtime-stdout".to_string())
        .spawn(move || {
            let stdout = io::stdout();
            for announcement in sub.iter() {
                let mut out = stdout.lock();
                let written = serde_json::to_writer(&mut out, &*announcement)
                    .map_err(io::Error::from)
                    .and_then(|_| writeln!(out));
                if let Err(e) = written {
                    error!(error = %e, "failed to send announcement");
                    break;
                }
            }
        })
        .context("failed to start announcement writer")?;

    info!(cue_addr, "showtime service starting");
    service.run(cue_addr).context("showtime service died")?;
    Ok(())
}

fn send(to: &str, cue: &str, repeat: Option<Duration>) -> Result<()> {
    anyhow::ensure!(!cue.is_empty(), "cue name must be set");

    let target = resolve_cue_target(to).context("invalid cue listener address")?;
    let socket = UdpSocket::bind("0.0.0.0:0").context("failed to open UDP socket")?;

    loop {
        match socket.send_to(cue.as_bytes(), target) {
            Ok(_) => info!(cue, %target, "triggered cue"),
            Err(e) => error!(error = %e, cue, "failed to trigger cue"),
        }

        match repeat {
            Some(interval) => thread::sleep(interval),
            None => return Ok(()),
        }
    }
}
