pub mod ack;
pub mod config;
pub mod packet;
pub mod scenario;

pub use ack::{AckMessage, ParseAckError};
pub use packet::{HEADER_LEN, MSS, Packet, PacketError, SEGMENT_LEN, TcpHeader, segment_checksum};
// Re-export flags module from packet so users can access the header bit constants
pub use packet::flags;

pub use config::{LogTarget, ReceiverConfig, SenderConfig, SimConfig};
pub use scenario::{SimConfigOverride, TestAction, TestAssertion, TestScenario, TransferSpec};
