use ax_api_types::{CheckoutInfo, GOING_AWAY};
use ax_gateway_client::{InvoiceApi, StreamConnector};
use ax_update_model::{DisplayState, classify};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionManager, Flow, SessionTimings};
use crate::store::{SessionHandle, SessionStore};
use crate::{RenderingBridge, SessionError, SessionOutcome};

/// User intents delivered to a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request a fresh invoice, replacing the live one if any.
    NewInvoice(CheckoutInfo),
    Unload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed,
    /// The server has no invoice for this visitor; stay in preparation.
    NoSession,
}

pub struct Orchestrator<A, C, R> {
    api: A,
    manager: ConnectionManager<C, R>,
    store: SessionStore,
    renderer: Arc<R>,
}

impl<A, C, R> Orchestrator<A, C, R>
where
    A: InvoiceApi,
    C: StreamConnector,
    R: RenderingBridge,
{
    pub fn new(api: A, connector: C, renderer: Arc<R>, timings: SessionTimings) -> Self {
        Self {
            api,
            manager: ConnectionManager::new(connector, renderer.clone(), timings),
            store: SessionStore::default(),
            renderer,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Pick up an invoice the server already holds for this visitor.
    pub async fn resume_if_present(&mut self) -> Result<ResumeOutcome, SessionError> {
        let Some(snapshot) = self.api.fetch_update().await.map_err(SessionError::Api)? else {
            info!("no invoice session to resume");
            return Ok(ResumeOutcome::NoSession);
        };

        // A closure in the resumed snapshot is left to the stream to report.
        let (state, _) = classify(&snapshot);
        self.renderer.enter_payment_mode();
        self.renderer.render(&state);

        let handle = self.store.start_new();
        handle.record_snapshot(snapshot);
        info!(session = %handle.id(), "resuming invoice session");
        self.manager.open(handle).await?;
        Ok(ResumeOutcome::Resumed)
    }

    /// Create an invoice and stream it. On a live session this is the
    /// "new address" path and replaces the current stream.
    pub async fn create_invoice(&mut self, info: CheckoutInfo) -> Result<(), SessionError> {
        self.renderer.enter_payment_mode();
        self.renderer.render(&DisplayState::loading());

        self.api
            .checkout(info.into_body().as_ref())
            .await
            .map_err(SessionError::Api)?;

        if !self.store.current().is_some_and(SessionHandle::is_live) {
            self.store.start_new();
        }
        let handle = self.store.current_mut().ok_or(SessionError::NoSession)?;
        self.manager.open(handle).await?;

        match self.api.fetch_update().await.map_err(SessionError::Api)? {
            Some(snapshot) => {
                let (state, _) = classify(&snapshot);
                self.renderer.render(&state);
                if let Some(handle) = self.store.current_mut() {
                    handle.record_snapshot(snapshot);
                }
            }
            None => warn!("invoice created but the server returned no snapshot"),
        }
        Ok(())
    }

    /// Handle stream events and commands until the session settles.
    pub async fn run(
        &mut self,
        commands: &mut mpsc::Receiver<Command>,
    ) -> Result<SessionOutcome, SessionError> {
        let mut accepting = true;
        loop {
            if !accepting && !self.store.current().is_some_and(SessionHandle::is_live) {
                return Err(SessionError::NoSession);
            }

            tokio::select! {
                biased;

                Some(event) = self.manager.next_event() => {
                    let Some(handle) = self.store.current_mut() else {
                        debug!(generation = %event.generation, "stream event without a session");
                        continue;
                    };
                    if let Flow::Finished(outcome) = self.manager.handle_event(handle, event).await {
                        info!(?outcome, "invoice session finished");
                        return Ok(outcome);
                    }
                }
                command = commands.recv(), if accepting => match command {
                    Some(Command::NewInvoice(info)) => self.replace_invoice(info).await?,
                    Some(Command::Unload) => return Ok(self.unload()),
                    None => accepting = false,
                },
            }
        }
    }

    /// A failed "new address" request leaves a live session streaming; only
    /// without one is the failure fatal.
    async fn replace_invoice(&mut self, info: CheckoutInfo) -> Result<(), SessionError> {
        let Err(err) = self.create_invoice(info).await else {
            return Ok(());
        };
        let Some(handle) = self.store.current().filter(|handle| handle.is_live()) else {
            return Err(err);
        };

        warn!(session = %handle.id(), "new invoice request failed, keeping current invoice: {}", err);
        if let Some(snapshot) = handle.last_snapshot() {
            self.renderer.render(&classify(snapshot).0);
        }
        Ok(())
    }

    /// Close the live stream as the page goes away.
    pub fn unload(&mut self) -> SessionOutcome {
        if let Some(handle) = self.store.current_mut().filter(|handle| handle.is_live()) {
            handle.shutdown(GOING_AWAY, "");
        }
        self.renderer.set_pending_indicator(false);
        info!("invoice session unloaded");
        SessionOutcome::Unloaded
    }
}
