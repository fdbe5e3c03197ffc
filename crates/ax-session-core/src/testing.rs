//! In-memory gateway and renderer doubles.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use ax_api_types::{ABNORMAL_CLOSURE, CheckoutInfo, InvoiceSnapshot};
use ax_gateway_client::{
    EventSender, Generation, InvoiceApi, ReadyState, SharedReadyState, StreamConnection,
    StreamConnector, StreamEvent, StreamEventKind,
};
use ax_update_model::{DisplayState, InvoiceStatus};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::RenderingBridge;

pub(crate) fn snapshot(amount_paid: u64, confirmations: Option<i64>, expiration: i64) -> InvoiceSnapshot {
    InvoiceSnapshot {
        amount_paid,
        amount_requested: 1000,
        confirmations,
        confirmations_required: 10,
        expiration_in_seconds: expiration,
        address: "4Aexample".to_owned(),
        payment_uri: "monero:4Aexample".to_owned(),
    }
}

pub(crate) fn snapshot_json(amount_paid: u64, confirmations: Option<i64>, expiration: i64) -> String {
    serde_json::to_string(&snapshot(amount_paid, confirmations, expiration)).unwrap()
}

/// How the next connection attempt behaves.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Script {
    Open,
    OpenAfter(Duration),
    /// Stays in `Connecting` forever.
    Hang,
    /// Fails the handshake: error, then abnormal close.
    Refuse,
    /// The connector itself errors.
    Fail,
}

struct Opened {
    generation: Generation,
    events: EventSender,
}

#[derive(Default)]
struct NetState {
    script: VecDeque<Script>,
    opened: Vec<Opened>,
    closes: Vec<(Generation, u16, String)>,
    ack_closes: bool,
}

#[derive(Clone, Default)]
pub(crate) struct FakeNet {
    inner: Arc<Mutex<NetState>>,
}

impl FakeNet {
    pub(crate) fn script(&self, script: Script) {
        self.inner.lock().unwrap().script.push_back(script);
    }

    /// Answer every close request with an immediate close event.
    pub(crate) fn ack_closes(&self) {
        self.inner.lock().unwrap().ack_closes = true;
    }

    pub(crate) fn open_count(&self) -> usize {
        self.inner.lock().unwrap().opened.len()
    }

    pub(crate) fn generations(&self) -> Vec<Generation> {
        self.inner
            .lock()
            .unwrap()
            .opened
            .iter()
            .map(|opened| opened.generation)
            .collect()
    }

    pub(crate) fn closes(&self) -> Vec<(Generation, u16, String)> {
        self.inner.lock().unwrap().closes.clone()
    }

    /// Open a connection whose events nobody listens to.
    pub(crate) fn connect(&self, generation: Generation) -> Result<Box<dyn StreamConnection>> {
        let (events, _) = mpsc::unbounded_channel();
        self.open(generation, events)
    }

    pub(crate) fn emit(&self, generation: Generation, kind: StreamEventKind) {
        let inner = self.inner.lock().unwrap();
        let opened = inner
            .opened
            .iter()
            .find(|opened| opened.generation == generation)
            .expect("no connection opened for generation");
        let _ = opened.events.send(StreamEvent::new(generation, kind));
    }

    pub(crate) fn message(&self, generation: Generation, payload: String) {
        self.emit(generation, StreamEventKind::Message(payload));
    }

    pub(crate) fn close_from_server(&self, generation: Generation, code: u16, reason: &str) {
        self.emit(
            generation,
            StreamEventKind::Closed {
                code,
                reason: reason.to_owned(),
            },
        );
    }
}

impl StreamConnector for FakeNet {
    fn open(&self, generation: Generation, events: EventSender) -> Result<Box<dyn StreamConnection>> {
        let script = self
            .inner
            .lock()
            .unwrap()
            .script
            .pop_front()
            .unwrap_or(Script::Open);
        if let Script::Fail = script {
            return Err(anyhow!("connector refused"));
        }

        let state = SharedReadyState::default();
        let send = |kind| {
            let _ = events.send(StreamEvent::new(generation, kind));
        };
        match script {
            Script::Open => {
                state.set(ReadyState::Open);
                send(StreamEventKind::Opened);
            }
            Script::OpenAfter(delay) => {
                let state = state.clone();
                let events = events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    state.set(ReadyState::Open);
                    let _ = events.send(StreamEvent::new(generation, StreamEventKind::Opened));
                });
            }
            Script::Hang | Script::Fail => {}
            Script::Refuse => {
                state.set(ReadyState::Closed);
                send(StreamEventKind::Error("connection refused".to_owned()));
                send(StreamEventKind::Closed {
                    code: ABNORMAL_CLOSURE,
                    reason: String::new(),
                });
            }
        }

        self.inner.lock().unwrap().opened.push(Opened {
            generation,
            events: events.clone(),
        });
        Ok(Box::new(FakeConnection {
            generation,
            state,
            events,
            net: self.clone(),
        }))
    }
}

struct FakeConnection {
    generation: Generation,
    state: SharedReadyState,
    events: EventSender,
    net: FakeNet,
}

impl StreamConnection for FakeConnection {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn close(&self, code: u16, reason: &str) {
        let ack = {
            let mut inner = self.net.inner.lock().unwrap();
            inner.closes.push((self.generation, code, reason.to_owned()));
            inner.ack_closes
        };
        if ack {
            self.state.set(ReadyState::Closed);
            let _ = self.events.send(StreamEvent::new(
                self.generation,
                StreamEventKind::Closed {
                    code,
                    reason: reason.to_owned(),
                },
            ));
        } else {
            self.state.set(ReadyState::Closing);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    PaymentMode,
    Render(InvoiceStatus),
    Pending(bool),
    Cleared,
    ConnectionLost,
    Request(&'static str),
}

#[derive(Default)]
pub(crate) struct Recorder {
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn rendered(&self) -> Vec<InvoiceStatus> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Render(status) => Some(status),
                _ => None,
            })
            .collect()
    }
}

impl RenderingBridge for Recorder {
    fn enter_payment_mode(&self) {
        self.push(Call::PaymentMode);
    }

    fn render(&self, state: &DisplayState) {
        self.push(Call::Render(state.status));
    }

    fn set_pending_indicator(&self, visible: bool) {
        self.push(Call::Pending(visible));
    }

    fn clear_payment_details(&self) {
        self.push(Call::Cleared);
    }

    fn notify_connection_lost(&self) {
        self.push(Call::ConnectionLost);
    }
}

/// Serves queued `/update` answers and records checkouts on the shared recorder.
#[derive(Clone)]
pub(crate) struct FakeApi {
    inner: Arc<ApiState>,
}

struct ApiState {
    updates: Mutex<VecDeque<Option<InvoiceSnapshot>>>,
    checkouts: Mutex<Vec<Option<CheckoutInfo>>>,
    failing_checkouts: Mutex<usize>,
    recorder: Arc<Recorder>,
}

impl FakeApi {
    pub(crate) fn new(recorder: Arc<Recorder>) -> Self {
        Self {
            inner: Arc::new(ApiState {
                updates: Mutex::new(VecDeque::new()),
                checkouts: Mutex::new(Vec::new()),
                failing_checkouts: Mutex::new(0),
                recorder,
            }),
        }
    }

    pub(crate) fn queue_update(&self, update: Option<InvoiceSnapshot>) {
        self.inner.updates.lock().unwrap().push_back(update);
    }

    /// Reject the next checkout as the server would with a 5xx.
    pub(crate) fn fail_next_checkout(&self) {
        *self.inner.failing_checkouts.lock().unwrap() += 1;
    }

    pub(crate) fn checkouts(&self) -> Vec<Option<CheckoutInfo>> {
        self.inner.checkouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InvoiceApi for FakeApi {
    async fn fetch_update(&self) -> Result<Option<InvoiceSnapshot>> {
        self.inner.recorder.push(Call::Request("update"));
        Ok(self.inner.updates.lock().unwrap().pop_front().flatten())
    }

    async fn checkout(&self, info: Option<&CheckoutInfo>) -> Result<()> {
        self.inner.recorder.push(Call::Request("checkout"));
        {
            let mut failing = self.inner.failing_checkouts.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(anyhow!("/checkout returned HTTP 503"));
            }
        }
        self.inner.checkouts.lock().unwrap().push(info.cloned());
        Ok(())
    }
}
