use std::process::ExitCode;

use clap::Parser;
use tcplike_abstract::SenderConfig;
use tcplike_cli::{SenderArgs, init_logging, run_sender};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let args = SenderArgs::parse();
    init_logging();

    let config = SenderConfig::from(args);
    match run_sender(&config).await {
        Ok(summary) => {
            println!("Delivery completed successfully");
            println!("Total bytes sent = {}", summary.bytes_sent);
            println!("Total packets sent = {}", summary.packets_sent);
            println!("Total packets retransmitted = {}", summary.retransmissions);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
