use serde::Serialize;
use tcplike_abstract::SimConfig;
use tcplike_core::{ReceiveSummary, TransferSummary};

use crate::link::LinkEventSummary;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub duration_ms: u64,
    pub input_len: usize,
    pub output_len: usize,
    pub transfer: TransferSummary,
    pub receive: ReceiveSummary,
    /// Protocol log lines from both ends, in the order they were recorded.
    pub protocol_log: Vec<String>,
    pub link_events: Vec<LinkEventSummary>,
    #[serde(skip)]
    pub output: Vec<u8>,
}
