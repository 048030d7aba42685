use crate::config::{DEFAULT_WINDOW_SIZE, SimConfig};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    pub transfer: TransferSpec,
    #[serde(default)]
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub corrupt_rate: Option<f64>,
    pub min_latency: Option<u64>,
    pub max_latency: Option<u64>,
    pub seed: Option<u64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.corrupt_rate {
            config.corrupt_rate = v;
        }
        if let Some(v) = self.min_latency {
            config.min_latency = v;
        }
        if let Some(v) = self.max_latency {
            config.max_latency = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
    }
}

/// What the simulated sender transmits: literal text, or `size` generated bytes.
#[derive(Deserialize, Debug, Clone)]
pub struct TransferSpec {
    pub data: Option<String>,
    pub size: Option<usize>,
    #[serde(default = "default_window")]
    pub window_size: u16,
}

fn default_window() -> u16 {
    DEFAULT_WINDOW_SIZE
}

impl TransferSpec {
    /// Literal data wins over `size`; generated bytes cycle through `0..=250`.
    pub fn payload(&self) -> Vec<u8> {
        match (&self.data, self.size) {
            (Some(data), _) => data.as_bytes().to_vec(),
            (None, Some(size)) => (0..size).map(|i| (i % 251) as u8).collect(),
            (None, None) => Vec::new(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Deterministically drop the first segment sent with given seq number
    DropNextFromSenderSeq { seq: u32 },
    /// Hold back the first acknowledgment with given ack number past one sender timeout
    HoldNextReceiverAck { ack: u32 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Output equals the input zero-padded to whole payload blocks
    DataDelivered,
    /// Exact number of bytes in the receiver's output
    OutputLength { bytes: usize },
    /// Total segment transmissions by the sender, retransmissions included
    SenderPacketCount { min: u32, max: Option<u32> },
    /// Number of retransmissions within range
    Retransmissions { min: u32, max: Option<u32> },
    /// Assert that simulation finishes within time
    MaxDuration { ms: u64 },
}
