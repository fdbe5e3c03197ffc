use ax_api_types::{ClosureReason, InvoiceSnapshot, NEW_ADDRESS_REASON, NORMAL_CLOSURE};
use ax_gateway_client::{Generation, StreamConnection};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Streaming, or about to.
    Live,
    /// We asked the server to stop streaming; waiting for the close.
    Closing(ClosureReason),
    Ended,
}

/// The one invoice session on the page.
///
/// Owns at most one stream connection. Every connection it installs gets a
/// fresh [`Generation`]; events tagged with an older generation are stale.
pub struct SessionHandle {
    id: Uuid,
    generation: Generation,
    connection: Option<Box<dyn StreamConnection>>,
    last_snapshot: Option<InvoiceSnapshot>,
    phase: SessionPhase,
    reconnect_used: bool,
}

impl SessionHandle {
    fn new(generation: Generation) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
            connection: None,
            last_snapshot: None,
            phase: SessionPhase::Live,
            reconnect_used: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_live(&self) -> bool {
        self.phase != SessionPhase::Ended
    }

    pub fn last_snapshot(&self) -> Option<&InvoiceSnapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn connection(&self) -> Option<&dyn StreamConnection> {
        self.connection.as_deref()
    }

    pub fn reconnect_used(&self) -> bool {
        self.reconnect_used
    }

    /// Whether an event from `generation` may still touch this session.
    pub fn accepts(&self, generation: Generation) -> bool {
        self.is_live() && generation == self.generation
    }

    pub fn record_snapshot(&mut self, snapshot: InvoiceSnapshot) {
        self.last_snapshot = Some(snapshot);
    }

    /// Retire the current generation. Listeners for it go inert.
    pub(crate) fn advance(&mut self) -> Generation {
        self.generation = self.generation.next();
        self.generation
    }

    pub(crate) fn install(&mut self, connection: Box<dyn StreamConnection>) {
        debug_assert_eq!(connection.generation(), self.generation);
        self.connection = Some(connection);
    }

    pub(crate) fn take_connection(&mut self) -> Option<Box<dyn StreamConnection>> {
        self.connection.take()
    }

    /// A fresh invoice gets a fresh reconnect budget.
    pub(crate) fn restart(&mut self) {
        self.phase = SessionPhase::Live;
        self.reconnect_used = false;
    }

    pub(crate) fn spend_reconnect(&mut self) {
        self.reconnect_used = true;
    }

    pub(crate) fn begin_closing(&mut self, reason: ClosureReason) {
        self.phase = SessionPhase::Closing(reason);
    }

    pub(crate) fn end(&mut self) {
        self.phase = SessionPhase::Ended;
        self.connection = None;
    }

    /// Close whatever is open and end the session.
    pub(crate) fn shutdown(&mut self, code: u16, reason: &str) {
        if let Some(connection) = self.connection.take() {
            debug!(session = %self.id, generation = %connection.generation(), code, reason, "closing invoice stream");
            connection.close(code, reason);
        }
        self.advance();
        self.end();
    }
}

/// Holds the single current [`SessionHandle`].
///
/// Generations keep counting across sessions: every session reports into the
/// same event channel, so a new session starts past the last generation of the
/// one it replaces.
#[derive(Default)]
pub struct SessionStore {
    current: Option<SessionHandle>,
}

impl SessionStore {
    /// Replace the current session, closing its stream first.
    pub fn start_new(&mut self) -> &mut SessionHandle {
        let floor = match self.current.take() {
            Some(mut previous) => {
                previous.shutdown(NORMAL_CLOSURE, NEW_ADDRESS_REASON);
                previous.generation()
            }
            None => Generation::default(),
        };
        let handle = self.current.insert(SessionHandle::new(floor));
        debug!(session = %handle.id, "invoice session started");
        handle
    }

    pub fn current(&self) -> Option<&SessionHandle> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut SessionHandle> {
        self.current.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeNet;

    #[test]
    fn start_new_replaces_and_closes_previous_session() -> anyhow::Result<()> {
        let net = FakeNet::default();
        let mut store = SessionStore::default();
        assert!(store.current().is_none());

        let first = store.start_new();
        let first_id = first.id();
        let generation = first.advance();
        first.install(net.connect(generation)?);

        let second_id = store.start_new().id();
        assert_ne!(first_id, second_id);
        assert_eq!(store.current().map(SessionHandle::id), Some(second_id));
        assert_eq!(
            net.closes(),
            vec![(generation, NORMAL_CLOSURE, NEW_ADDRESS_REASON.to_owned())]
        );
        Ok(())
    }

    #[test]
    fn stale_generations_are_not_accepted() {
        let mut store = SessionStore::default();
        let handle = store.start_new();
        let old = handle.advance();
        assert!(handle.accepts(old));

        let new = handle.advance();
        assert!(!handle.accepts(old));
        assert!(handle.accepts(new));

        handle.end();
        assert!(!handle.accepts(new));
        assert!(!handle.is_live());
    }

    #[test]
    fn generations_keep_counting_across_sessions() {
        let mut store = SessionStore::default();
        let first = store.start_new();
        first.advance();
        let abandoned = first.advance();
        first.end();

        let second = store.start_new();
        assert!(second.generation() > abandoned);
        let opened = second.advance();
        assert!(opened > abandoned);
        assert!(!second.accepts(abandoned));
    }
}
