//! Entry point for `rudp`.
//!
//! Parses CLI arguments and dispatches into either **sender** or **receiver**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, argument parsing, payload generation and the
//! "send again?" prompt).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::Rng;
use tokio::io::{AsyncBufReadExt, BufReader};

use rudp::session::ReceiverSession;
use rudp::socket::UdpTransport;
use rudp::timer::{DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT};
use rudp::transfer::{announce_size, receive_all, send_round};
use rudp::{Connection, RetryPolicy, Transport};

/// Minimum size of the generated payload.
const MIN_RANDOM_SIZE: u32 = 2 * 1024 * 1024;
/// Spread above the minimum (payloads are 2–7 MiB).
const RANDOM_SIZE_SPREAD: u32 = 5 * 1024 * 1024;

/// Reliable stop-and-wait file transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Wait for a sender and report transfer statistics.
    Receiver {
        /// Local port to bind.
        #[arg(short, long)]
        port: u16,
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: IpAddr,
    },
    /// Connect to a receiver and send a file or random data.
    Sender {
        /// Receiver IP address.
        #[arg(long)]
        ip: IpAddr,
        /// Receiver port.
        #[arg(short, long)]
        port: u16,
        /// Send this file instead of random data.
        #[arg(short, long, conflicts_with = "size")]
        file: Option<PathBuf>,
        /// Size of the random payload in bytes (default: random, 2–7 MiB).
        #[arg(short, long)]
        size: Option<u32>,
        /// Send this many rounds without asking.
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        rounds: Option<u32>,
        /// Per-attempt acknowledgment timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Transmissions per packet before giving up.
        #[arg(
            long,
            default_value_t = DEFAULT_MAX_ATTEMPTS,
            value_parser = clap::value_parser!(u32).range(1..)
        )]
        max_attempts: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Receiver { port, bind } => run_receiver(SocketAddr::new(bind, port)).await,
        Mode::Sender {
            ip,
            port,
            file,
            size,
            rounds,
            timeout_ms,
            max_attempts,
        } => {
            let timeout = timeout_ms.map_or(DEFAULT_TIMEOUT, Duration::from_millis);
            let policy = RetryPolicy::new(max_attempts, timeout);
            let data = load_payload(file, size).await?;
            run_sender(SocketAddr::new(ip, port), &data, rounds, policy).await
        }
    }
}

async fn run_receiver(bind: SocketAddr) -> Result<()> {
    let transport = UdpTransport::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    log::info!("Waiting for RUDP connection on {}", transport.local_addr());

    let mut session = ReceiverSession::new(transport);
    let stats = receive_all(&mut session).await.context("receiving transfer")?;

    println!("{stats}");
    log::info!("Receiver end.");
    Ok(())
}

async fn run_sender(
    server: SocketAddr,
    data: &[u8],
    rounds: Option<u32>,
    policy: RetryPolicy,
) -> Result<()> {
    let transport = UdpTransport::bind(SocketAddr::new(unspecified_for(server), 0))
        .await
        .context("binding sender socket")?;
    let mut conn = Connection::connect(transport, server, policy)
        .await
        .context("handshake failed")?;
    log::info!("Receiver {} connected, beginning to send file...", conn.peer());

    let size = u32::try_from(data.len()).context("payload larger than 4 GiB")?;
    announce_size(&mut conn, size).await?;

    let mut round = 1u32;
    loop {
        send_round(&mut conn, data).await?;
        println!("A file with {size} bytes has been sent successfully");

        let again = match rounds {
            Some(total) => round < total,
            None => ask_send_again().await?,
        };
        if !again {
            break;
        }
        round += 1;
    }

    conn.close().await.context("disconnect failed")?;
    Ok(())
}

async fn load_payload(file: Option<PathBuf>, size: Option<u32>) -> Result<Vec<u8>> {
    if let Some(path) = file {
        let data = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        if data.is_empty() {
            bail!("{} is empty", path.display());
        }
        return Ok(data);
    }

    let mut rng = rand::rng();
    let size = size.unwrap_or_else(|| MIN_RANDOM_SIZE + rng.random_range(0..RANDOM_SIZE_SPREAD));
    if size == 0 {
        bail!("payload size must be positive");
    }
    let mut data = vec![0u8; size as usize];
    rng.fill(data.as_mut_slice());
    Ok(data)
}

/// Prompt until the user answers `yes` or `no`.
async fn ask_send_again() -> Result<bool> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        println!("Do you want to send the file again? (yes/no): ");
        let Some(line) = lines.next_line().await? else {
            return Ok(false);
        };
        match line.trim() {
            "yes" => return Ok(true),
            "no" => return Ok(false),
            _ => println!("not valid answer, try again"),
        }
    }
}

fn unspecified_for(server: SocketAddr) -> IpAddr {
    match server {
        SocketAddr::V4(_) => IpAddr::from([0, 0, 0, 0]),
        SocketAddr::V6(_) => IpAddr::from([0u16; 8]),
    }
}
