use std::process::ExitCode;

use clap::Parser;
use tcplike_abstract::ReceiverConfig;
use tcplike_cli::{ReceiverArgs, init_logging, run_receiver};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let args = ReceiverArgs::parse();
    init_logging();

    let config = ReceiverConfig::from(args);
    match run_receiver(&config).await {
        Ok(summary) => {
            println!("Delivery completed successfully");
            println!("Total segments received = {}", summary.segments_received);
            println!(
                "Segments dropped = {} corrupt, {} out of order",
                summary.dropped_corrupt, summary.dropped_out_of_order
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
