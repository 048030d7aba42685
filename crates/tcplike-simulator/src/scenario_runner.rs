use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tcplike_abstract::{MSS, SimConfig, TestAction, TestAssertion, TestScenario};
use tcplike_core::{EngineError, MemorySink, ReceiverEngine, SenderEngine};
use tokio::time::timeout;
use tracing::info;

use crate::link::{SENDER_DATA_ADDR, SimLink};
use crate::trace::SimulationReport;

/// Virtual-time budget when a scenario has no `max_duration` assertion.
pub const DEFAULT_MAX_DURATION_MS: u64 = 60_000;

pub fn load_scenario(path: &Path) -> anyhow::Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse scenario")
}

/// Run one sender/receiver pair over `link` until the FIN is acknowledged.
pub async fn simulate(
    link: SimLink,
    data: &[u8],
    window_size: u16,
    initial_timeout: Duration,
) -> Result<SimulationReport, EngineError> {
    let SimLink {
        sender_tx,
        receiver_rx,
        sender_acks,
        receiver_acks,
        handle,
    } = link;
    let log = MemorySink::new();

    let mut sender = SenderEngine::new(
        sender_tx,
        sender_acks,
        log.clone(),
        window_size,
        initial_timeout,
    );
    let mut receiver = ReceiverEngine::new(
        receiver_rx,
        receiver_acks,
        Vec::new(),
        log.clone(),
        SENDER_DATA_ADDR.ip(),
    );

    let (transfer, receive) = tokio::try_join!(sender.transfer(data), receiver.run())?;
    let output = receiver.into_output();

    Ok(SimulationReport {
        config: handle.config(),
        duration_ms: handle.elapsed().as_millis() as u64,
        input_len: data.len(),
        output_len: output.len(),
        transfer,
        receive,
        protocol_log: log
            .events()
            .iter()
            .map(|e| format!("{:?}: {}", e.kind, e))
            .collect(),
        link_events: handle.events(),
        output,
    })
}

pub async fn run_scenario(scenario: &TestScenario) -> anyhow::Result<SimulationReport> {
    info!("Running Scenario: {}", scenario.name);
    info!("Description: {}", scenario.description);

    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);
    let data = scenario.transfer.payload();

    let link = SimLink::new(config);
    for action in &scenario.actions {
        match action {
            TestAction::DropNextFromSenderSeq { seq } => link.handle.drop_sender_seq_once(*seq),
            TestAction::HoldNextReceiverAck { ack } => link.handle.hold_receiver_ack_once(*ack),
        }
    }

    let max_duration = scenario
        .assertions
        .iter()
        .find_map(|a| {
            if let TestAssertion::MaxDuration { ms } = a {
                Some(*ms)
            } else {
                None
            }
        })
        .unwrap_or(DEFAULT_MAX_DURATION_MS);

    let run = simulate(
        link,
        &data,
        scenario.transfer.window_size,
        tcplike_core::timer::DEFAULT_INITIAL_TIMEOUT,
    );
    let report = timeout(Duration::from_millis(max_duration), run)
        .await
        .map_err(|_| anyhow!("Test timed out after {} ms", max_duration))?
        .context("Simulated transfer failed")?;

    check_assertions(&scenario.assertions, &data, &report)?;

    info!("Test Scenario Passed!");
    Ok(report)
}

/// Input zero-filled to a whole number of payload blocks; an empty input
/// still occupies one block.
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(MSS).max(1) * MSS
}

fn check_assertions(
    assertions: &[TestAssertion],
    data: &[u8],
    report: &SimulationReport,
) -> anyhow::Result<()> {
    for assertion in assertions {
        match assertion {
            TestAssertion::DataDelivered => {
                let mut expected = data.to_vec();
                expected.resize(padded_len(data.len()), 0);
                if report.output != expected {
                    return Err(anyhow!(
                        "Assertion Failed: receiver output ({} bytes) does not match the input ({} bytes)",
                        report.output.len(),
                        data.len()
                    ));
                }
            }
            TestAssertion::OutputLength { bytes } => {
                if report.output_len != *bytes {
                    return Err(anyhow!(
                        "Assertion Failed: receiver wrote {} bytes, expected {bytes}",
                        report.output_len
                    ));
                }
            }
            TestAssertion::SenderPacketCount { min, max } => {
                check_range("Sender sent", "packets", report.transfer.packets_sent, *min, *max)?;
            }
            TestAssertion::Retransmissions { min, max } => {
                check_range(
                    "Sender retransmitted",
                    "packets",
                    report.transfer.retransmissions,
                    *min,
                    *max,
                )?;
            }
            TestAssertion::MaxDuration { .. } => {} // Already checked
        }
    }
    Ok(())
}

fn check_range(
    what: &str,
    unit: &str,
    value: u32,
    min: u32,
    max: Option<u32>,
) -> anyhow::Result<()> {
    if value < min {
        return Err(anyhow!(
            "Assertion Failed: {what} {value} {unit}, expected min {min}"
        ));
    }
    if let Some(max) = max
        && value > max
    {
        return Err(anyhow!(
            "Assertion Failed: {what} {value} {unit}, expected max {max}"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_rounds_up_to_whole_blocks() {
        assert_eq!(padded_len(0), MSS);
        assert_eq!(padded_len(1), MSS);
        assert_eq!(padded_len(MSS), MSS);
        assert_eq!(padded_len(1200), 1728);
    }

    #[test]
    fn range_check_reports_bounds() {
        assert!(check_range("Sender sent", "packets", 3, 3, Some(3)).is_ok());
        let err = check_range("Sender sent", "packets", 5, 3, Some(4)).unwrap_err();
        assert!(err.to_string().contains("expected max 4"));
        assert!(check_range("Sender sent", "packets", 2, 3, None).is_err());
    }
}
