use ax_api_types::{InvoiceSnapshot, NEW_ADDRESS_REASON, NORMAL_CLOSURE};
use ax_gateway_client::{
    EventReceiver, EventSender, Generation, ReadyState, StreamConnection, StreamConnector,
    StreamEvent, StreamEventKind,
};
use ax_update_model::classify;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::store::{SessionHandle, SessionPhase};
use crate::wait::{Settled, first_settled};
use crate::{RenderingBridge, SessionError, SessionOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// How long a replaced stream gets to acknowledge its close.
    pub close_wait: Duration,
    /// Readiness poll interval while a reconnect is in flight.
    pub ready_poll_interval: Duration,
    /// Give up on a reconnect still connecting after this long.
    pub ready_timeout: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            close_wait: Duration::from_secs(1),
            ready_poll_interval: Duration::from_millis(100),
            ready_timeout: Duration::from_secs(10),
        }
    }
}

/// What the session loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Finished(SessionOutcome),
}

/// Keeps exactly one current stream per session and recovers once from an
/// abnormal close.
///
/// Every connection reports into the same channel; events carry the
/// generation they were opened for and are dropped once the session has
/// moved past it.
pub struct ConnectionManager<C, R> {
    connector: C,
    renderer: Arc<R>,
    timings: SessionTimings,
    events_tx: EventSender,
    events_rx: EventReceiver,
}

impl<C, R> ConnectionManager<C, R>
where
    C: StreamConnector,
    R: RenderingBridge,
{
    pub fn new(connector: C, renderer: Arc<R>, timings: SessionTimings) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            renderer,
            timings,
            events_tx,
            events_rx,
        }
    }

    /// Next event from any connection, stale or not.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events_rx.recv().await
    }

    /// Open a fresh stream for `handle`, gracefully replacing any open one.
    pub async fn open(&mut self, handle: &mut SessionHandle) -> Result<(), SessionError> {
        let previous = handle.take_connection();
        let generation = handle.advance();

        if let Some(previous) = previous {
            if matches!(previous.ready_state(), ReadyState::Connecting | ReadyState::Open) {
                previous.close(NORMAL_CLOSURE, NEW_ADDRESS_REASON);
                match self.wait_for_close(previous.generation()).await {
                    Settled::Completed(()) => debug!(generation = %previous.generation(), "replaced stream closed"),
                    Settled::TimedOut => warn!(
                        generation = %previous.generation(),
                        "replaced stream did not close within {:?}; opening anyway",
                        self.timings.close_wait
                    ),
                }
            }
        }

        handle.restart();
        let connection = self
            .connector
            .open(generation, self.events_tx.clone())
            .map_err(SessionError::Stream)?;
        handle.install(connection);
        self.renderer.set_pending_indicator(true);
        debug!(session = %handle.id(), %generation, "invoice stream opening");
        Ok(())
    }

    /// Wait for the close of `generation`, bounded by `close_wait`. Anything
    /// else arriving meanwhile is stale and dropped.
    async fn wait_for_close(&mut self, generation: Generation) -> Settled<()> {
        let events = &mut self.events_rx;
        first_settled(self.timings.close_wait, async move {
            while let Some(event) = events.recv().await {
                if event.generation == generation && matches!(event.kind, StreamEventKind::Closed { .. }) {
                    return;
                }
                debug!(generation = %event.generation, "dropping event from replaced stream");
            }
        })
        .await
    }

    pub async fn handle_event(&mut self, handle: &mut SessionHandle, event: StreamEvent) -> Flow {
        if !handle.accepts(event.generation) {
            debug!(
                generation = %event.generation,
                current = %handle.generation(),
                "dropping stale stream event"
            );
            return Flow::Continue;
        }

        match event.kind {
            StreamEventKind::Opened => {
                debug!(generation = %event.generation, "invoice stream open");
                Flow::Continue
            }
            StreamEventKind::Message(payload) => {
                self.on_message(handle, &payload);
                Flow::Continue
            }
            StreamEventKind::Error(err) => {
                // A close event always follows.
                warn!(generation = %event.generation, "invoice stream error: {}", err);
                Flow::Continue
            }
            StreamEventKind::Closed { code, reason } => self.on_close(handle, code, &reason).await,
        }
    }

    fn on_message(&self, handle: &mut SessionHandle, payload: &str) {
        if handle.phase() != SessionPhase::Live {
            debug!("ignoring snapshot received while closing");
            return;
        }

        let snapshot = match InvoiceSnapshot::parse(payload) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(generation = %handle.generation(), "{}", err);
                return;
            }
        };

        let (state, closure) = classify(&snapshot);
        self.renderer.render(&state);
        handle.record_snapshot(snapshot);

        if let Some(reason) = closure {
            info!(session = %handle.id(), %reason, "invoice stream closing");
            handle.begin_closing(reason);
            if let Some(connection) = handle.connection() {
                connection.close(NORMAL_CLOSURE, reason.as_str());
            }
        }
    }

    async fn on_close(&mut self, handle: &mut SessionHandle, code: u16, reason: &str) -> Flow {
        drop(handle.take_connection());

        if let SessionPhase::Closing(closure) = handle.phase() {
            info!(code, reason, "invoice stream closed after {}", closure);
            self.renderer.set_pending_indicator(false);
            handle.end();
            return Flow::Finished(closure.into());
        }

        if code == NORMAL_CLOSURE {
            info!(code, reason, "connection closed cleanly");
            self.renderer.set_pending_indicator(false);
            handle.end();
            return Flow::Finished(SessionOutcome::ClosedCleanly);
        }

        if handle.reconnect_used() {
            warn!(code, reason, "abnormal close after reconnect; not retrying again");
            return self.degrade(handle);
        }

        match self.reconnect(handle).await {
            Ok(true) => {
                info!(generation = %handle.generation(), "received abnormal close, but successfully restored connection");
                Flow::Continue
            }
            Ok(false) => {
                warn!(code, reason, "reconnect attempt did not open");
                self.degrade(handle)
            }
            Err(err) => {
                error!("reconnect attempt failed: {}", err);
                self.degrade(handle)
            }
        }
    }

    /// The single reconnect attempt. `Ok(true)` once the new stream is open.
    async fn reconnect(&mut self, handle: &mut SessionHandle) -> Result<bool, SessionError> {
        handle.spend_reconnect();
        let generation = handle.advance();
        let connection = self
            .connector
            .open(generation, self.events_tx.clone())
            .map_err(SessionError::Stream)?;

        let poll_interval = self.timings.ready_poll_interval;
        let settled = first_settled(
            self.timings.ready_timeout,
            wait_until_settled(connection.as_ref(), poll_interval),
        )
        .await;

        match settled {
            Settled::Completed(ReadyState::Open) => {
                handle.install(connection);
                Ok(true)
            }
            Settled::Completed(state) => {
                debug!(%generation, ?state, "reconnect left connecting without opening");
                Ok(false)
            }
            Settled::TimedOut => {
                warn!(%generation, "reconnect still connecting after {:?}", self.timings.ready_timeout);
                connection.close(NORMAL_CLOSURE, "");
                Ok(false)
            }
        }
    }

    fn degrade(&self, handle: &mut SessionHandle) -> Flow {
        error!(session = %handle.id(), "invoice stream lost");
        self.renderer.notify_connection_lost();
        self.renderer.clear_payment_details();
        self.renderer.set_pending_indicator(false);
        handle.end();
        Flow::Finished(SessionOutcome::ConnectionLost)
    }
}

async fn wait_until_settled(connection: &dyn StreamConnection, interval: Duration) -> ReadyState {
    loop {
        let state = connection.ready_state();
        if state != ReadyState::Connecting {
            return state;
        }
        tokio::time::sleep(interval).await;
    }
}
