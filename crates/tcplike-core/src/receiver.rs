use std::net::{IpAddr, SocketAddr};

use serde::Serialize;
use tcplike_abstract::{AckMessage, Packet, SEGMENT_LEN};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::interface::{AckNotifier, Delivery, SegmentRx};
use crate::log::{EventKind, LogSink, TransferEvent};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceiveSummary {
    pub segments_received: u32,
    pub accepted: u32,
    pub dropped_corrupt: u32,
    pub dropped_out_of_order: u32,
    pub bytes_written: u64,
}

/// Corrupt and out-of-order segments are dropped without an acknowledgment.
pub struct ReceiverEngine<R, N, D, L> {
    rx: R,
    acks: N,
    output: D,
    log: L,
    sender_ip: IpAddr,
    expected_seq: u32,
}

impl<R, N, D, L> ReceiverEngine<R, N, D, L>
where
    R: SegmentRx,
    N: AckNotifier,
    D: Delivery,
    L: LogSink,
{
    /// `sender_ip` is only used to label log lines.
    pub fn new(rx: R, acks: N, output: D, log: L, sender_ip: IpAddr) -> Self {
        Self {
            rx,
            acks,
            output,
            log,
            sender_ip,
            expected_seq: 0,
        }
    }

    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    pub fn output(&self) -> &D {
        &self.output
    }

    pub fn into_output(self) -> D {
        self.output
    }

    /// Receive until the FIN segment has been accepted and acknowledged.
    pub async fn run(&mut self) -> Result<ReceiveSummary, EngineError> {
        let mut summary = ReceiveSummary::default();
        let mut buf = [0u8; SEGMENT_LEN];
        info!("Listening on {}", self.rx.local_addr());

        loop {
            let (len, from) = self.rx.recv_segment(&mut buf).await?;
            let packet = Packet::decode(&buf[..len])?;
            let header = &packet.header;
            summary.segments_received += 1;

            let message = AckMessage::for_header(header);
            self.log.record(&TransferEvent {
                kind: EventKind::SegmentReceived,
                source: SocketAddr::new(self.sender_ip, header.src_port),
                destination: SocketAddr::new(self.rx.local_addr().ip(), header.dst_port),
                summary: message.to_string(),
                estimated_rtt_ms: None,
            });

            if !packet.checksum_ok() {
                summary.dropped_corrupt += 1;
                debug!("Dropping corrupt segment {} from {}", header.seq_num, from);
                continue;
            }
            if header.seq_num != self.expected_seq {
                summary.dropped_out_of_order += 1;
                debug!(
                    "Dropping segment {} from {}, expecting {}",
                    header.seq_num, from, self.expected_seq
                );
                continue;
            }

            self.output.append(&packet.payload).await?;
            summary.accepted += 1;
            summary.bytes_written += packet.payload.len() as u64;
            self.expected_seq += 1;

            let line = message.to_string();
            let sent_from = self.acks.notify(&line).await?;
            self.log.record(&TransferEvent {
                kind: EventKind::AckSent,
                source: sent_from,
                destination: self.acks.peer_addr(),
                summary: line,
                estimated_rtt_ms: None,
            });

            if header.is_fin() {
                info!(
                    "Delivery completed: {} segments accepted, {} bytes written",
                    summary.accepted, summary.bytes_written
                );
                return Ok(summary);
            }
        }
    }
}
