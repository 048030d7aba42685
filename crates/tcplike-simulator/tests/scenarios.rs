use std::path::PathBuf;
use std::time::Duration;

use rstest::rstest;
use tcplike_abstract::SimConfig;
use tcplike_simulator::{SimLink, SimulationReport, load_scenario, run_scenario, simulate};

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../scenarios")
        .join(name)
}

fn fixed_latency(ms: u64) -> SimConfig {
    SimConfig {
        min_latency: ms,
        max_latency: ms,
        ..SimConfig::default()
    }
}

async fn transfer(link: SimLink, data: &[u8]) -> SimulationReport {
    simulate(link, data, 1, Duration::from_secs(1)).await.unwrap()
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[rstest]
#[case("lossless.toml")]
#[case("late_ack.toml")]
#[case("dropped_segment.toml")]
#[case("lossy.toml")]
#[tokio::test(start_paused = true)]
async fn bundled_scenarios_pass(#[case] file: &str) {
    let scenario = load_scenario(&scenario_path(file)).unwrap();
    run_scenario(&scenario).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn lossless_1200_bytes_is_three_packets() {
    let data = sample(1200);
    let report = transfer(SimLink::new(fixed_latency(10)), &data).await;

    assert_eq!(report.transfer.packets_sent, 3);
    assert_eq!(report.transfer.retransmissions, 0);
    assert_eq!(report.transfer.rtt_samples, 3);
    assert_eq!(report.transfer.bytes_sent, 3 * 596);
    assert_eq!(report.receive.accepted, 3);
    assert_eq!(report.output_len, 1728);
    assert_eq!(&report.output[..1200], &data[..]);
    assert!(report.output[1200..].iter().all(|&b| b == 0));

    let sends: Vec<_> = report
        .protocol_log
        .iter()
        .filter(|l| l.starts_with("SegmentSent"))
        .collect();
    assert_eq!(sends.len(), 3);
    assert!(sends[0].contains("FIN 0"));
    assert!(sends[2].contains("Sequence Number 2, ACK Number 2, ACK 1, FIN 1"));
}

#[tokio::test(start_paused = true)]
async fn late_ack_retransmits_once_without_rtt_sample() {
    let link = SimLink::new(fixed_latency(10));
    link.handle.hold_receiver_ack_once(1);

    let report = transfer(link, &sample(1200)).await;

    assert_eq!(report.transfer.retransmissions, 1);
    assert_eq!(report.transfer.packets_sent, 4);
    // Packets 0 and 2 only.
    assert_eq!(report.transfer.rtt_samples, 2);
    // The second copy of packet 1 reaches the receiver after it has moved on.
    assert_eq!(report.receive.dropped_out_of_order, 1);
    assert_eq!(report.receive.accepted, 3);

    let resent: Vec<_> = report
        .protocol_log
        .iter()
        .filter(|l| l.starts_with("SegmentSent") && l.contains("Sequence Number 1, ACK Number 1,"))
        .collect();
    assert_eq!(resent.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_segment_is_recovered_by_timeout() {
    let link = SimLink::new(fixed_latency(10));
    link.handle.drop_sender_seq_once(1);
    let handle = link.handle.clone();

    let report = transfer(link, &sample(1200)).await;

    assert_eq!(report.transfer.retransmissions, 1);
    assert_eq!(report.transfer.rtt_samples, 2);
    assert_eq!(report.receive.segments_received, 3);
    assert!(
        handle
            .events()
            .iter()
            .any(|e| e.description.contains("DROP (deterministic seq) seq=1"))
    );
    // Timeout after packet 0's 20 ms sample: 877.5 + 4 * 214.375
    assert!(report.duration_ms >= 1735);
}

#[tokio::test(start_paused = true)]
async fn empty_input_sends_a_single_fin() {
    let report = transfer(SimLink::new(fixed_latency(5)), &[]).await;

    assert_eq!(report.transfer.packets_sent, 1);
    assert_eq!(report.output, vec![0u8; 576]);
}

#[tokio::test(start_paused = true)]
async fn corrupted_segments_are_dropped_and_resent() {
    let config = SimConfig {
        loss_rate: 0.0,
        corrupt_rate: 0.3,
        min_latency: 20,
        max_latency: 60,
        seed: 3,
    };
    let data = sample(6000);
    let report = transfer(SimLink::new(config), &data).await;

    let corrupted = report
        .link_events
        .iter()
        .filter(|e| e.description.contains("CORRUPT"))
        .count() as u32;
    assert_eq!(report.receive.dropped_corrupt, corrupted);
    assert_eq!(&report.output[..6000], &data[..]);
    assert_eq!(report.receive.accepted, 11);
}

#[tokio::test(start_paused = true)]
async fn same_seed_same_trace() {
    let config = SimConfig {
        loss_rate: 0.25,
        corrupt_rate: 0.1,
        min_latency: 50,
        max_latency: 300,
        seed: 1234,
    };
    let data = sample(4000);

    let a = transfer(SimLink::new(config.clone()), &data).await;
    let b = transfer(SimLink::new(config), &data).await;

    let describe = |r: &SimulationReport| {
        r.link_events
            .iter()
            .map(|e| (e.time_ms, e.description.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(describe(&a), describe(&b));
    assert_eq!(a.transfer, b.transfer);
    assert_eq!(a.output, b.output);
}
