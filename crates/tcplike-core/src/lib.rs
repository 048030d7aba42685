//! Stop-and-wait reliable transfer over an unreliable datagram channel.
//!
//! The engines are generic over the channel traits in [`interface`]; [`net`]
//! provides the tokio UDP/TCP implementations used by the binaries.

pub mod error;
pub mod interface;
pub mod log;
pub mod net;
pub mod output;
pub mod receiver;
pub mod sender;
pub mod timer;

pub use error::EngineError;
pub use interface::{
    AckNotifier, AckOutcome, AckWaiter, Delivery, ReceivedAck, SegmentRx, SegmentTx,
};
pub use log::{
    EventKind, LogSink, MemorySink, NullSink, TransferEvent, WriterSink, open_log_sink,
};
pub use net::{TcpAckNotifier, TcpAckWaiter, UdpSegmentRx, UdpSegmentTx};
pub use output::AppendFile;
pub use receiver::{ReceiveSummary, ReceiverEngine};
pub use sender::{SenderEngine, TransferSummary, segment};
pub use timer::RetransmissionTimer;
