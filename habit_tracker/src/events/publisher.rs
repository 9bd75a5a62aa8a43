//! Event publication boundary.
//!
//! The session core only sees [`EventPublisher`]; what sits behind it is a
//! deployment concern. [`BusPublisher`] batches records through a channel
//! and writes them to a broker over TCP; [`MemoryEventBus`] records events
//! for tests to assert emitted sequences.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::models::{BusRecord, UserEvent};
use super::wire;

/// Publish errors. Callers treat publication as best-effort: a failure is
/// logged and never rolls back the originating action.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event bus unavailable: {0}")]
    Unavailable(String),
}

/// Boundary for emitting identity events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Enqueue one event for delivery
    async fn publish(&self, event: UserEvent) -> Result<(), PublishError>;
}

/// Bus producer configuration
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Broker addresses, tried in order
    pub brokers: Vec<String>,
    /// Topic every identity event is appended to
    pub topic: String,
    /// Producer channel capacity before sends start failing fast
    pub buffer: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["127.0.0.1:9092".to_string()],
            topic: "user-events".to_string(),
            buffer: 256,
        }
    }
}

/// Async-batching bus producer.
///
/// `publish` hands the record to a bounded channel and returns; a
/// background task drains the channel and writes length-prefixed records
/// to the first reachable broker, reconnecting on failure. Records in
/// flight when the process dies are lost, which the retry paths upstream
/// tolerate.
pub struct BusPublisher {
    topic: String,
    tx: mpsc::Sender<BusRecord>,
}

impl BusPublisher {
    /// Spawn the writer task and return the producer handle
    pub fn start(config: BusConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer);
        let topic = config.topic.clone();
        tokio::spawn(writer_loop(config, rx));
        Self { topic, tx }
    }
}

#[async_trait]
impl EventPublisher for BusPublisher {
    async fn publish(&self, event: UserEvent) -> Result<(), PublishError> {
        let record = BusRecord {
            topic: self.topic.clone(),
            key: event.user_id(),
            event,
        };
        self.tx
            .try_send(record)
            .map_err(|e| PublishError::Unavailable(e.to_string()))
    }
}

/// Drain the channel, keeping one broker connection alive at a time.
async fn writer_loop(config: BusConfig, mut rx: mpsc::Receiver<BusRecord>) {
    let mut stream: Option<TcpStream> = None;

    while let Some(record) = rx.recv().await {
        if stream.is_none() {
            stream = connect_any(&config.brokers).await;
        }

        let Some(conn) = stream.as_mut() else {
            tracing::warn!(
                event_type = record.event.event_type(),
                "no reachable event-bus broker, dropping record"
            );
            continue;
        };

        if let Err(e) = wire::write_record(conn, &record).await {
            tracing::warn!(error = %e, "event-bus write failed, reconnecting");
            stream = None;
        }
    }
}

async fn connect_any(brokers: &[String]) -> Option<TcpStream> {
    for addr in brokers {
        match tokio::time::timeout(Duration::from_secs(2), TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                tracing::debug!(broker = %addr, "connected to event-bus broker");
                return Some(stream);
            }
            Ok(Err(e)) => tracing::debug!(broker = %addr, error = %e, "broker connect failed"),
            Err(_) => tracing::debug!(broker = %addr, "broker connect timed out"),
        }
    }
    None
}

/// In-memory publisher recording events for test assertions
#[derive(Default, Clone)]
pub struct MemoryEventBus {
    events: Arc<Mutex<Vec<UserEvent>>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event published so far, in order
    pub fn events(&self) -> Vec<UserEvent> {
        self.events.lock().expect("event log poisoned").clone()
    }

    /// Event-type names in publication order
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .expect("event log poisoned")
            .iter()
            .map(|e| e.event_type())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for MemoryEventBus {
    async fn publish(&self, event: UserEvent) -> Result<(), PublishError> {
        self.events.lock().expect("event log poisoned").push(event);
        Ok(())
    }
}
