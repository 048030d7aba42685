use std::io;

use tcplike_abstract::PacketError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed segment: {0}")]
    Packet(#[from] PacketError),
    #[error("{0} channel closed")]
    ChannelClosed(&'static str),
}
