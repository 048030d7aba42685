use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tcplike_abstract::{AckMessage, HEADER_LEN, Packet, SEGMENT_LEN, SimConfig};
use tcplike_core::{
    AckNotifier, AckOutcome, AckWaiter, EngineError, ReceivedAck, SegmentRx, SegmentTx,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Fixed endpoint addresses of the simulated hosts.
pub const SENDER_DATA_ADDR: SocketAddr = addr([10, 0, 0, 1], 40000);
pub const SENDER_ACK_ADDR: SocketAddr = addr([10, 0, 0, 1], 4118);
pub const RECEIVER_DATA_ADDR: SocketAddr = addr([10, 0, 0, 2], 4119);
pub const RECEIVER_ACK_ADDR: SocketAddr = addr([10, 0, 0, 2], 50000);

const fn addr(ip: [u8; 4], port: u16) -> SocketAddr {
    SocketAddr::V4(std::net::SocketAddrV4::new(
        std::net::Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]),
        port,
    ))
}

/// A compact textual summary of one link decision.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time_ms: u64,
    pub description: String,
}

struct LinkState {
    config: SimConfig,
    rng: StdRng,
    started: Instant,
    // One-shot faults, consumed on first match
    drop_sender_seq_once: Vec<u32>,
    hold_receiver_ack_once: Vec<u32>,
    events: Vec<LinkEventSummary>,
    next_id: u64,
}

impl LinkState {
    fn record(&mut self, description: String) {
        let time_ms = self.started.elapsed().as_millis() as u64;
        debug!("[{} ms] {}", time_ms, description);
        self.events.push(LinkEventSummary {
            time_ms,
            description,
        });
    }

    fn latency(&mut self) -> Duration {
        let lo = self.config.min_latency.min(self.config.max_latency);
        let hi = self.config.min_latency.max(self.config.max_latency);
        Duration::from_millis(self.rng.random_range(lo..=hi))
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone)]
struct SharedState(Arc<Mutex<LinkState>>);

impl SharedState {
    fn lock(&self) -> MutexGuard<'_, LinkState> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Item in flight, ordered so that the earliest delivery pops first.
#[derive(Debug)]
struct Scheduled<T> {
    deliver_at: Instant,
    id: u64,
    item: T,
}

impl<T> PartialEq for Scheduled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deliver_at == other.deliver_at && self.id == other.id
    }
}

impl<T> Eq for Scheduled<T> {}

impl<T> PartialOrd for Scheduled<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Scheduled<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap
        other
            .deliver_at
            .cmp(&self.deliver_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Receiving end of one simulated direction.
struct Inbox<T> {
    incoming: mpsc::UnboundedReceiver<Scheduled<T>>,
    pending: BinaryHeap<Scheduled<T>>,
    closed: bool,
}

impl<T> Inbox<T> {
    fn new(incoming: mpsc::UnboundedReceiver<Scheduled<T>>) -> Self {
        Self {
            incoming,
            pending: BinaryHeap::new(),
            closed: false,
        }
    }

    fn drain(&mut self) {
        while let Ok(item) = self.incoming.try_recv() {
            self.pending.push(item);
        }
    }

    /// Sleep until `wake`, or return early if a new item arrives.
    /// Returns `true` if the full sleep elapsed.
    async fn sleep_or_arrival(&mut self, wake: Instant) -> bool {
        if self.closed {
            sleep_until(wake).await;
            return true;
        }
        tokio::select! {
            biased;
            msg = self.incoming.recv() => {
                match msg {
                    Some(item) => self.pending.push(item),
                    None => self.closed = true,
                }
                false
            }
            _ = sleep_until(wake) => true,
        }
    }
}

/// In-process lossy link with the same shape as the UDP + TCP pair.
///
/// The segment direction drops, corrupts and delays datagrams. The
/// acknowledgment direction is reliable and only delayed; one-shot holds let a
/// test push a specific acknowledgment past the sender's current wait.
pub struct SimLink {
    pub sender_tx: SimSegmentTx,
    pub receiver_rx: SimSegmentRx,
    pub sender_acks: SimAckWaiter,
    pub receiver_acks: SimAckNotifier,
    pub handle: LinkHandle,
}

impl SimLink {
    pub fn new(config: SimConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        let state = SharedState(Arc::new(Mutex::new(LinkState {
            config,
            rng,
            started: Instant::now(),
            drop_sender_seq_once: Vec::new(),
            hold_receiver_ack_once: Vec::new(),
            events: Vec::new(),
            next_id: 0,
        })));

        let (seg_tx, seg_rx) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();

        Self {
            sender_tx: SimSegmentTx {
                state: state.clone(),
                outgoing: seg_tx,
            },
            receiver_rx: SimSegmentRx {
                inbox: Inbox::new(seg_rx),
            },
            sender_acks: SimAckWaiter {
                inbox: Inbox::new(ack_rx),
            },
            receiver_acks: SimAckNotifier {
                state: state.clone(),
                outgoing: ack_tx,
            },
            handle: LinkHandle { state },
        }
    }
}

/// Inspection and fault injection for a running link.
#[derive(Clone)]
pub struct LinkHandle {
    state: SharedState,
}

impl LinkHandle {
    /// Drop the first segment sent with this sequence number.
    pub fn drop_sender_seq_once(&self, seq: u32) {
        self.state.lock().drop_sender_seq_once.push(seq);
    }

    /// Hold the first acknowledgment with this ack number past one sender wait.
    pub fn hold_receiver_ack_once(&self, ack: u32) {
        self.state.lock().hold_receiver_ack_once.push(ack);
    }

    pub fn events(&self) -> Vec<LinkEventSummary> {
        self.state.lock().events.clone()
    }

    pub fn config(&self) -> SimConfig {
        self.state.lock().config.clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.state.lock().started.elapsed()
    }
}

pub struct SimSegmentTx {
    state: SharedState,
    outgoing: mpsc::UnboundedSender<Scheduled<Vec<u8>>>,
}

impl SegmentTx for SimSegmentTx {
    async fn send_segment(&mut self, segment: &[u8]) -> Result<(), EngineError> {
        let seq = Packet::decode(segment).ok().map(|p| p.header.seq_num);
        let mut state = self.state.lock();

        if let Some(seq) = seq
            && let Some(pos) = state.drop_sender_seq_once.iter().position(|s| *s == seq)
        {
            state.drop_sender_seq_once.remove(pos);
            state.record(format!("[Sender->Receiver] DROP (deterministic seq) seq={seq}"));
            return Ok(());
        }

        let label = seq.map_or_else(|| "?".to_string(), |s| s.to_string());
        if state.rng.random::<f64>() < state.config.loss_rate {
            state.record(format!("[Sender->Receiver] DROP (random loss) seq={label}"));
            return Ok(());
        }

        let mut bytes = segment.to_vec();
        if state.rng.random::<f64>() < state.config.corrupt_rate && bytes.len() > HEADER_LEN {
            let end = bytes.len().min(SEGMENT_LEN);
            let byte = state.rng.random_range(HEADER_LEN..end);
            let bit = state.rng.random_range(0..8u8);
            bytes[byte] ^= 1 << bit;
            state.record(format!(
                "[Sender->Receiver] CORRUPT seq={label} byte={byte} bit={bit}"
            ));
        }

        let latency = state.latency();
        let id = state.next_id();
        state.record(format!(
            "[Sender->Receiver] SEND seq={label} (latency={}ms)",
            latency.as_millis()
        ));
        drop(state);

        self.outgoing
            .send(Scheduled {
                deliver_at: Instant::now() + latency,
                id,
                item: bytes,
            })
            .map_err(|_| EngineError::ChannelClosed("simulated segment"))
    }

    fn local_addr(&self) -> SocketAddr {
        SENDER_DATA_ADDR
    }

    fn peer_addr(&self) -> SocketAddr {
        RECEIVER_DATA_ADDR
    }
}

pub struct SimSegmentRx {
    inbox: Inbox<Vec<u8>>,
}

impl SegmentRx for SimSegmentRx {
    async fn recv_segment(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddr), EngineError> {
        loop {
            self.inbox.drain();
            let Some(wake) = self.inbox.pending.peek().map(|s| s.deliver_at) else {
                if self.inbox.closed {
                    return Err(EngineError::ChannelClosed("simulated segment"));
                }
                match self.inbox.incoming.recv().await {
                    Some(item) => self.inbox.pending.push(item),
                    None => self.inbox.closed = true,
                }
                continue;
            };
            if !self.inbox.sleep_or_arrival(wake).await {
                continue;
            }
            if let Some(next) = self.inbox.pending.pop() {
                let n = next.item.len().min(buf.len());
                buf[..n].copy_from_slice(&next.item[..n]);
                return Ok((n, SENDER_DATA_ADDR));
            }
        }
    }

    fn local_addr(&self) -> SocketAddr {
        RECEIVER_DATA_ADDR
    }
}

#[derive(Debug)]
struct InFlightAck {
    ack: ReceivedAck,
    held: bool,
}

pub struct SimAckNotifier {
    state: SharedState,
    outgoing: mpsc::UnboundedSender<Scheduled<InFlightAck>>,
}

impl AckNotifier for SimAckNotifier {
    async fn notify(&mut self, line: &str) -> Result<SocketAddr, EngineError> {
        let ack_num = line.parse::<AckMessage>().ok().map(|m| m.ack_num);
        let mut state = self.state.lock();

        let mut held = false;
        if let Some(ack) = ack_num
            && let Some(pos) = state.hold_receiver_ack_once.iter().position(|a| *a == ack)
        {
            state.hold_receiver_ack_once.remove(pos);
            held = true;
            state.record(format!("[Receiver->Sender] HOLD (deterministic ack) ack={ack}"));
        }

        let latency = state.latency();
        let id = state.next_id();
        let label = ack_num.map_or_else(|| "?".to_string(), |a| a.to_string());
        state.record(format!(
            "[Receiver->Sender] ACK ack={label} (latency={}ms)",
            latency.as_millis()
        ));
        drop(state);

        let in_flight = InFlightAck {
            ack: ReceivedAck {
                line: format!("{line}\n"),
                from: RECEIVER_ACK_ADDR,
            },
            held,
        };
        self.outgoing
            .send(Scheduled {
                deliver_at: Instant::now() + latency,
                id,
                item: in_flight,
            })
            .map_err(|_| EngineError::ChannelClosed("simulated acknowledgment"))?;
        Ok(RECEIVER_ACK_ADDR)
    }

    fn peer_addr(&self) -> SocketAddr {
        SENDER_ACK_ADDR
    }
}

pub struct SimAckWaiter {
    inbox: Inbox<InFlightAck>,
}

impl AckWaiter for SimAckWaiter {
    async fn wait_ack(&mut self, deadline: Duration) -> Result<AckOutcome, EngineError> {
        let deadline_at = Instant::now() + deadline;
        loop {
            self.inbox.drain();
            let due = self
                .inbox
                .pending
                .peek()
                .map(|s| s.deliver_at)
                .filter(|at| *at <= deadline_at);

            if due.is_none() && self.inbox.closed && self.inbox.pending.is_empty() {
                return Err(EngineError::ChannelClosed("simulated acknowledgment"));
            }
            if !self.inbox.sleep_or_arrival(due.unwrap_or(deadline_at)).await {
                continue;
            }
            if due.is_none() {
                return Ok(AckOutcome::TimedOut);
            }

            let Some(mut next) = self.inbox.pending.pop() else {
                continue;
            };
            if next.item.held {
                // Arrives just after this wait gives up.
                next.item.held = false;
                next.deliver_at = deadline_at;
                self.inbox.pending.push(next);
                sleep_until(deadline_at).await;
                return Ok(AckOutcome::TimedOut);
            }
            return Ok(AckOutcome::Acknowledged(next.item.ack));
        }
    }

    fn local_addr(&self) -> SocketAddr {
        SENDER_ACK_ADDR
    }
}
