use anyhow::Result;
use async_trait::async_trait;
use ax_api_types::{CheckoutInfo, InvoiceSnapshot};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc;

/// Request/response half of the invoice gateway.
#[async_trait]
pub trait InvoiceApi: Send + Sync {
    /// Latest snapshot for this visitor, or `None` when the server reports
    /// that no invoice session exists.
    async fn fetch_update(&self) -> Result<Option<InvoiceSnapshot>>;

    /// Create a new invoice. `None` sends the request without a body.
    async fn checkout(&self, info: Option<&CheckoutInfo>) -> Result<()>;
}

/// Tag distinguishing successive stream connections within one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Ready state shared between a connection handle and the task driving it.
#[derive(Debug, Clone)]
pub struct SharedReadyState(Arc<AtomicU8>);

impl Default for SharedReadyState {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(ReadyState::Connecting as u8)))
    }
}

impl SharedReadyState {
    pub fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventKind {
    Opened,
    Message(String),
    Closed { code: u16, reason: String },
    Error(String),
}

/// Something that happened on the connection opened for `generation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub generation: Generation,
    pub kind: StreamEventKind,
}

impl StreamEvent {
    pub fn new(generation: Generation, kind: StreamEventKind) -> Self {
        Self { generation, kind }
    }
}

pub type EventSender = mpsc::UnboundedSender<StreamEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<StreamEvent>;

/// A live (or dying) invoice stream.
///
/// Every connection ends with exactly one `Closed` event on its sender,
/// whether it closed cleanly, failed to connect, or dropped.
pub trait StreamConnection: Send + Sync {
    fn generation(&self) -> Generation;
    fn ready_state(&self) -> ReadyState;
    /// Ask the peer to close. Never blocks; completion arrives as a `Closed` event.
    fn close(&self, code: u16, reason: &str);
}

pub trait StreamConnector: Send + Sync {
    /// Start connecting. Returns immediately in the `Connecting` state.
    fn open(&self, generation: Generation, events: EventSender) -> Result<Box<dyn StreamConnection>>;
}
