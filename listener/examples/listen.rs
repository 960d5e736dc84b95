//! Connect to a bitcoin node and log every message it sends.

use bitcoin::Network;
use bitcoin_peers_listener::{stop_channel, LogSink, Session, SessionConfiguration, UserAgent};
use clap::Parser;
use log::LevelFilter;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address of the node to connect to.
    #[arg(short, long)]
    seed_node: String,

    /// Port number of the node.
    #[arg(short, long, default_value = "8333")]
    port: u16,

    /// Network of the node: bitcoin, testnet, signet or regtest.
    #[arg(short, long, default_value = "bitcoin")]
    network: String,

    /// Custom user agent (optional).
    #[arg(short, long)]
    user_agent: Option<String>,

    /// Log level.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    // Configure fern logger
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {} - {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stderr())
        .apply()?;

    let network = args
        .network
        .parse::<Network>()
        .map_err(|_| format!("Unknown network: {}", args.network))?;

    let ip_addr = args
        .seed_node
        .parse::<IpAddr>()
        .map_err(|_| format!("Invalid IP address: {}", args.seed_node))?;
    let addr = SocketAddr::new(ip_addr, args.port);

    let user_agent = match args.user_agent {
        Some(user_agent) => {
            log::debug!("Using custom user agent: {user_agent}");
            Some(UserAgent::new(user_agent)?)
        }
        None => None,
    };

    let config = SessionConfiguration::non_listening(network, None, user_agent);
    log::debug!("{config}");

    log::info!("Connecting to {addr} on {network}");
    let session = Session::connect(addr, config).await?;

    let (handle, signal) = stop_channel();
    let mut task = tokio::spawn(session.run(signal, LogSink));

    let termination = tokio::select! {
        result = &mut task => result?,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, stopping after the current message");
            handle.stop();
            // The session only notices between messages, do not wait on a quiet peer forever.
            match tokio::time::timeout(Duration::from_secs(5), &mut task).await {
                Ok(result) => result?,
                Err(_) => {
                    log::warn!("Peer is quiet, aborting session");
                    task.abort();
                    return Ok(());
                }
            }
        }
    };

    println!("disconnected: {termination}");
    if termination.is_clean() {
        Ok(())
    } else {
        Err(termination.to_string().into())
    }
}
