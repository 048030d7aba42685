use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, LineWriter, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tcplike_abstract::LogTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SegmentSent,
    SegmentReceived,
    AckSent,
    AckReceived,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferEvent {
    pub kind: EventKind,
    pub source: SocketAddr,
    pub destination: SocketAddr,
    /// Header summary, in acknowledgment-message form.
    pub summary: String,
    /// Present on sender-side events only.
    pub estimated_rtt_ms: Option<f64>,
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Source {}, Destination {}, {}",
            self.source, self.destination, self.summary
        )?;
        if let Some(rtt) = self.estimated_rtt_ms {
            write!(f, ", Estimated RTT {rtt} ms")?;
        }
        Ok(())
    }
}

pub trait LogSink {
    fn record(&mut self, event: &TransferEvent);
}

/// Write failures are reported through `tracing` and otherwise ignored.
pub struct WriterSink {
    out: Box<dyn Write + Send>,
}

impl WriterSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }
}

impl fmt::Debug for WriterSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterSink").finish_non_exhaustive()
    }
}

impl LogSink for WriterSink {
    fn record(&mut self, event: &TransferEvent) {
        if let Err(e) = writeln!(self.out, "{}: {event}", unix_timestamp()) {
            tracing::warn!("failed to write transfer log: {e}");
        }
    }
}

/// `stdout` goes to the console; anything else is a file opened for append.
pub fn open_log_sink(target: &LogTarget) -> io::Result<WriterSink> {
    match target {
        LogTarget::Stdout => Ok(WriterSink::stdout()),
        LogTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(WriterSink::new(Box::new(LineWriter::new(file))))
        }
    }
}

fn unix_timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", now.as_secs(), now.subsec_millis())
}

/// Keeps events in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<TransferEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TransferEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

impl LogSink for MemorySink {
    fn record(&mut self, event: &TransferEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn record(&mut self, _event: &TransferEvent) {}
}
