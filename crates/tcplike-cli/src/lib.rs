use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tcplike_abstract::config::{DEFAULT_INITIAL_TIMEOUT_MS, DEFAULT_WINDOW_SIZE};
use tcplike_abstract::{LogTarget, ReceiverConfig, SenderConfig};
use tcplike_core::{
    AppendFile, ReceiveSummary, ReceiverEngine, SenderEngine, TcpAckNotifier, TcpAckWaiter,
    TransferSummary, UdpSegmentRx, UdpSegmentTx, open_log_sink,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Diagnostics go to stderr so a `stdout` transfer log stays clean.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Send a file over the stop-and-wait transport")]
pub struct SenderArgs {
    /// File to send.
    pub input: PathBuf,
    /// Receiver IP address.
    pub remote_ip: IpAddr,
    /// Receiver UDP port.
    pub remote_port: u16,
    /// Local TCP port acknowledgments are delivered to.
    pub ack_port: u16,
    /// `stdout` or a log file path (appended to).
    pub log: LogTarget,
    /// Advertised window size; only one packet is ever in flight.
    #[arg(default_value_t = DEFAULT_WINDOW_SIZE)]
    pub window_size: u16,
    /// Initial retransmission timeout.
    #[arg(long, default_value_t = DEFAULT_INITIAL_TIMEOUT_MS)]
    pub initial_timeout_ms: u64,
}

impl From<SenderArgs> for SenderConfig {
    fn from(args: SenderArgs) -> Self {
        SenderConfig {
            input: args.input,
            dest_ip: args.remote_ip,
            dest_port: args.remote_port,
            ack_port: args.ack_port,
            log: args.log,
            window_size: args.window_size,
            initial_timeout_ms: args.initial_timeout_ms,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Receive a file over the stop-and-wait transport")]
pub struct ReceiverArgs {
    /// File the received blocks are appended to.
    pub output: PathBuf,
    /// Local UDP port to listen on.
    pub listening_port: u16,
    /// Sender IP address.
    pub sender_ip: IpAddr,
    /// Sender TCP port for acknowledgments.
    pub sender_port: u16,
    /// `stdout` or a log file path (appended to).
    pub log: LogTarget,
}

impl From<ReceiverArgs> for ReceiverConfig {
    fn from(args: ReceiverArgs) -> Self {
        ReceiverConfig {
            output: args.output,
            listen_port: args.listening_port,
            sender_ip: args.sender_ip,
            ack_port: args.sender_port,
            log: args.log,
        }
    }
}

pub async fn run_sender(config: &SenderConfig) -> anyhow::Result<TransferSummary> {
    let log = open_log_sink(&config.log)
        .with_context(|| format!("Failed to open log {}", config.log))?;
    let acks = TcpAckWaiter::bind(config.dest_ip, config.ack_port)
        .await
        .with_context(|| format!("Failed to listen on ack port {}", config.ack_port))?;
    let peer = SocketAddr::new(config.dest_ip, config.dest_port);
    let tx = UdpSegmentTx::bind(peer)
        .await
        .context("Failed to open UDP socket")?;
    info!("Sending {} to {}", config.input.display(), peer);

    let mut engine = SenderEngine::new(
        tx,
        acks,
        log,
        config.window_size,
        Duration::from_millis(config.initial_timeout_ms),
    );
    let summary = engine
        .transfer_file(&config.input)
        .await
        .with_context(|| format!("Failed to send {}", config.input.display()))?;
    Ok(summary)
}

pub async fn run_receiver(config: &ReceiverConfig) -> anyhow::Result<ReceiveSummary> {
    let log = open_log_sink(&config.log)
        .with_context(|| format!("Failed to open log {}", config.log))?;
    let rx = UdpSegmentRx::bind(config.sender_ip, config.listen_port)
        .await
        .with_context(|| format!("Failed to listen on UDP port {}", config.listen_port))?;
    let notifier = TcpAckNotifier::new(SocketAddr::new(config.sender_ip, config.ack_port));

    let mut engine = ReceiverEngine::new(
        rx,
        notifier,
        AppendFile::new(&config.output),
        log,
        config.sender_ip,
    );
    let summary = engine
        .run()
        .await
        .with_context(|| format!("Failed to receive into {}", config.output.display()))?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_args_follow_positional_order() {
        let args = SenderArgs::try_parse_from([
            "tcplike-sender",
            "file.txt",
            "127.0.0.1",
            "4119",
            "4118",
            "stdout",
        ])
        .unwrap();
        let config = SenderConfig::from(args);

        assert_eq!(config.input, PathBuf::from("file.txt"));
        assert_eq!(config.dest_port, 4119);
        assert_eq!(config.ack_port, 4118);
        assert_eq!(config.log, LogTarget::Stdout);
        assert_eq!(config.window_size, 1);
        assert_eq!(config.initial_timeout_ms, 1000);
    }

    #[test]
    fn sender_accepts_window_and_timeout() {
        let args = SenderArgs::try_parse_from([
            "tcplike-sender",
            "file.txt",
            "::1",
            "4119",
            "4118",
            "sender.log",
            "8",
            "--initial-timeout-ms",
            "250",
        ])
        .unwrap();
        assert_eq!(args.window_size, 8);
        assert_eq!(args.initial_timeout_ms, 250);
        assert_eq!(args.log, LogTarget::File(PathBuf::from("sender.log")));
    }

    #[test]
    fn receiver_args_map_onto_config() {
        let args = ReceiverArgs::try_parse_from([
            "tcplike-receiver",
            "out.txt",
            "4119",
            "127.0.0.1",
            "4118",
            "receiver.log",
        ])
        .unwrap();
        let config = ReceiverConfig::from(args);

        assert_eq!(config.listen_port, 4119);
        assert_eq!(config.ack_port, 4118);
        assert_eq!(config.sender_ip, "127.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn receiver_rejects_bad_port() {
        let parsed = ReceiverArgs::try_parse_from([
            "tcplike-receiver",
            "out",
            "99999",
            "127.0.0.1",
            "1",
            "stdout",
        ]);
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn missing_input_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = SenderConfig {
            input: dir.path().join("missing.bin"),
            dest_ip: "127.0.0.1".parse().unwrap(),
            dest_port: 9,
            ack_port: 0,
            log: LogTarget::File(dir.path().join("sender.log")),
            window_size: 1,
            initial_timeout_ms: 50,
        };
        let err = run_sender(&config).await.unwrap_err();
        assert!(format!("{err:#}").contains("missing.bin"));
    }
}
