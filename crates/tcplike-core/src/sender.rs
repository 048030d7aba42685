use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tcplike_abstract::{AckMessage, MSS, Packet, TcpHeader, flags};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::interface::{AckOutcome, AckWaiter, ReceivedAck, SegmentTx};
use crate::log::{EventKind, LogSink, TransferEvent};
use crate::timer::RetransmissionTimer;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransferSummary {
    pub bytes_sent: u64,
    pub packets_sent: u32,
    pub retransmissions: u32,
    pub rtt_samples: u32,
    pub estimated_rtt_ms: f64,
    pub timeout_ms: f64,
}

/// Cut `data` into MSS blocks, one packet per block.
///
/// `seq_num` and `ack_num` are both the block index; the last packet carries
/// FIN. Empty input still yields a single (all-zero) FIN packet.
pub fn segment(data: &[u8], src_port: u16, dst_port: u16, window_size: u16) -> Vec<Packet> {
    let blocks: Vec<&[u8]> = if data.is_empty() {
        vec![&[]]
    } else {
        data.chunks(MSS).collect()
    };
    let last = blocks.len() - 1;

    blocks
        .into_iter()
        .enumerate()
        .map(|(i, block)| {
            let mut bits = flags::ACK;
            if i == last {
                bits |= flags::FIN;
            }
            let index = i as u32;
            let header = TcpHeader::new(src_port, dst_port, index, index, bits, window_size);
            Packet::sealed(header, block)
        })
        .collect()
}

pub struct SenderEngine<T, A, L> {
    tx: T,
    acks: A,
    log: L,
    timer: RetransmissionTimer,
    window_size: u16,
}

impl<T, A, L> SenderEngine<T, A, L>
where
    T: SegmentTx,
    A: AckWaiter,
    L: LogSink,
{
    pub fn new(tx: T, acks: A, log: L, window_size: u16, initial_timeout: Duration) -> Self {
        Self {
            tx,
            acks,
            log,
            timer: RetransmissionTimer::with_initial(initial_timeout),
            window_size,
        }
    }

    pub fn timer(&self) -> &RetransmissionTimer {
        &self.timer
    }

    pub async fn transfer_file(&mut self, path: &Path) -> Result<TransferSummary, EngineError> {
        let data = tokio::fs::read(path).await?;
        info!("Read {} bytes from {}", data.len(), path.display());
        self.transfer(&data).await
    }

    /// Returns once the FIN packet has been acknowledged. There is no retry limit.
    pub async fn transfer(&mut self, data: &[u8]) -> Result<TransferSummary, EngineError> {
        let local = self.tx.local_addr();
        let peer = self.tx.peer_addr();
        let packets = segment(data, local.port(), peer.port(), self.window_size);
        info!("Sending {} bytes to {} in {} packets", data.len(), peer, packets.len());

        let mut summary = TransferSummary::default();
        for packet in &packets {
            self.deliver(packet, &mut summary).await?;
        }

        summary.estimated_rtt_ms = self.timer.estimated_rtt_ms();
        summary.timeout_ms = self.timer.timeout_ms();
        info!(
            "Delivery completed: {} packets sent, {} retransmitted",
            summary.packets_sent, summary.retransmissions
        );
        Ok(summary)
    }

    async fn deliver(
        &mut self,
        packet: &Packet,
        summary: &mut TransferSummary,
    ) -> Result<(), EngineError> {
        let wire = packet.encode();
        let header = &packet.header;
        let text = AckMessage::for_header(header).to_string();
        let mut retransmitted = false;

        loop {
            let started = Instant::now();
            self.tx.send_segment(&wire).await?;
            summary.packets_sent += 1;
            summary.bytes_sent += wire.len() as u64;
            self.log.record(&TransferEvent {
                kind: EventKind::SegmentSent,
                source: self.tx.local_addr(),
                destination: self.tx.peer_addr(),
                summary: text.clone(),
                estimated_rtt_ms: Some(self.timer.estimated_rtt_ms()),
            });

            let timeout = self.timer.timeout();
            match self.acks.wait_ack(timeout).await? {
                AckOutcome::Acknowledged(ack) if acknowledges(&ack, header.ack_num) => {
                    if !retransmitted {
                        self.timer.record_rtt_sample(started.elapsed());
                        summary.rtt_samples += 1;
                    }
                    self.log.record(&TransferEvent {
                        kind: EventKind::AckReceived,
                        source: ack.from,
                        destination: self.acks.local_addr(),
                        summary: ack.line.trim().to_string(),
                        estimated_rtt_ms: Some(self.timer.estimated_rtt_ms()),
                    });
                    debug!("Packet {} has been delivered successfully", header.seq_num);
                    return Ok(());
                }
                AckOutcome::Acknowledged(ack) => {
                    debug!(
                        "Unexpected acknowledgment {:?} while waiting for {}",
                        ack.line.trim(), header.ack_num
                    );
                }
                AckOutcome::TimedOut => {
                    debug!("Packet {} timed out after {:?}", header.seq_num, timeout);
                }
            }

            retransmitted = true;
            summary.retransmissions += 1;
        }
    }
}

fn acknowledges(ack: &ReceivedAck, expected: u32) -> bool {
    ack.line
        .parse::<AckMessage>()
        .is_ok_and(|msg| msg.ack_num == expected)
}
