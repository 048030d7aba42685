use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::interface::{AckNotifier, AckOutcome, AckWaiter, ReceivedAck, SegmentRx, SegmentTx};

fn unspecified_like(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

#[derive(Debug)]
pub struct UdpSegmentTx {
    socket: UdpSocket,
    local: SocketAddr,
    peer: SocketAddr,
}

impl UdpSegmentTx {
    /// Bind an ephemeral local port for sending to `peer`.
    pub async fn bind(peer: SocketAddr) -> Result<Self, EngineError> {
        let socket = UdpSocket::bind((unspecified_like(peer.ip()), 0)).await?;
        let local = socket.local_addr()?;
        Ok(Self {
            socket,
            local,
            peer,
        })
    }
}

impl SegmentTx for UdpSegmentTx {
    async fn send_segment(&mut self, segment: &[u8]) -> Result<(), EngineError> {
        self.socket.send_to(segment, self.peer).await?;
        Ok(())
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

#[derive(Debug)]
pub struct UdpSegmentRx {
    socket: UdpSocket,
    local: SocketAddr,
}

impl UdpSegmentRx {
    /// Listen on `port` using the address family of `peer`, the sender's IP.
    pub async fn bind(peer: IpAddr, port: u16) -> Result<Self, EngineError> {
        let socket = UdpSocket::bind((unspecified_like(peer), port)).await?;
        let local = socket.local_addr()?;
        Ok(Self { socket, local })
    }
}

impl SegmentRx for UdpSegmentRx {
    async fn recv_segment(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddr), EngineError> {
        Ok(self.socket.recv_from(buf).await?)
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

/// Listens for acknowledgment connections on the sender side.
///
/// A background task accepts connections and reads one line from each, so a
/// connection that arrives after a wait has timed out is queued and returned
/// by the next wait instead of being lost.
#[derive(Debug)]
pub struct TcpAckWaiter {
    local: SocketAddr,
    acks: mpsc::UnboundedReceiver<ReceivedAck>,
    acceptor: JoinHandle<()>,
}

impl TcpAckWaiter {
    /// Accept on `port` using the address family of `peer`, the receiver's IP.
    pub async fn bind(peer: IpAddr, port: u16) -> Result<Self, EngineError> {
        let listener = TcpListener::bind((unspecified_like(peer), port)).await?;
        let local = listener.local_addr()?;
        let (tx, acks) = mpsc::unbounded_channel();
        let acceptor = tokio::spawn(accept_loop(listener, tx));
        Ok(Self {
            local,
            acks,
            acceptor,
        })
    }
}

impl Drop for TcpAckWaiter {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::UnboundedSender<ReceivedAck>) {
    loop {
        let (stream, from) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Acknowledgment listener failed: {}", e);
                return;
            }
        };
        let tx = tx.clone();
        tokio::spawn(async move {
            match read_ack_line(stream).await {
                Ok(line) => {
                    let _ = tx.send(ReceivedAck { line, from });
                }
                Err(e) => debug!("Dropping acknowledgment connection from {}: {}", from, e),
            }
        });
    }
}

async fn read_ack_line(stream: TcpStream) -> io::Result<String> {
    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line).await?;
    Ok(line)
}

impl AckWaiter for TcpAckWaiter {
    async fn wait_ack(&mut self, deadline: Duration) -> Result<AckOutcome, EngineError> {
        match timeout(deadline, self.acks.recv()).await {
            Err(_) => Ok(AckOutcome::TimedOut),
            Ok(Some(ack)) => Ok(AckOutcome::Acknowledged(ack)),
            Ok(None) => Err(EngineError::ChannelClosed("acknowledgment listener")),
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

/// Opens a fresh connection to the sender for every acknowledgment.
#[derive(Debug, Clone)]
pub struct TcpAckNotifier {
    peer: SocketAddr,
}

impl TcpAckNotifier {
    pub fn new(peer: SocketAddr) -> Self {
        Self { peer }
    }
}

impl AckNotifier for TcpAckNotifier {
    async fn notify(&mut self, line: &str) -> Result<SocketAddr, EngineError> {
        let mut stream = TcpStream::connect(self.peer).await?;
        let local = stream.local_addr()?;
        stream.write_all(format!("{line}\n").as_bytes()).await?;
        stream.shutdown().await?;
        Ok(local)
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
