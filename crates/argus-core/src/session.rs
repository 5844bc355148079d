//! Per-conversation sessions
//!
//! A [`ChatSession`] owns everything that is mutable about one conversation's
//! live side: the run slot, the cancellation token of the in-flight engine
//! call, and the broadcast channel observers subscribe to. Lookups go through
//! the [`SessionRegistry`]; there is no other shared state.
//!
//! The bus is a pure multicast, not a log: an observer that subscribes after
//! an event was published never receives it, and per conversation every
//! observer sees events in exactly publish order. Slow observers lag and drop
//! rather than block the publisher.

use crate::error::{Error, Result};
use crate::event::{Envelope, RunEvent};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Buffered events per subscription before a slow observer starts lagging.
const BUS_CAPACITY: usize = 256;

/// State of an in-flight run.
#[derive(Debug)]
struct RunState {
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Live state of one conversation: run slot plus subscriber set.
#[derive(Debug)]
pub struct ChatSession {
    conversation_id: Uuid,
    bus: broadcast::Sender<Envelope>,
    run: Mutex<Option<RunState>>,
}

impl ChatSession {
    fn new(conversation_id: Uuid) -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            conversation_id,
            bus,
            run: Mutex::new(None),
        }
    }

    /// The conversation this session belongs to.
    #[must_use]
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Publish an event to every currently-subscribed observer.
    ///
    /// Returns the number of observers that received it; with no observers
    /// the event is dropped; the bus holds no backlog.
    pub fn publish(&self, event: RunEvent) -> usize {
        debug!(
            conversation_id = %self.conversation_id,
            event = event.name(),
            "publish"
        );
        self.bus
            .send(Envelope::new(self.conversation_id, event))
            .unwrap_or(0)
    }

    /// Subscribe to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.bus.subscribe()
    }

    /// Number of currently-connected observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.bus.receiver_count()
    }

    /// Whether a run is currently active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run.lock().expect("run lock poisoned").is_some()
    }

    /// When the active run started, if any.
    #[must_use]
    pub fn run_started_at(&self) -> Option<DateTime<Utc>> {
        self.run
            .lock()
            .expect("run lock poisoned")
            .as_ref()
            .map(|r| r.started_at)
    }

    /// Claim the run slot. Of any number of concurrent claims exactly one
    /// succeeds; the rest get `AlreadyRunning`.
    pub fn claim_run(&self) -> Result<CancellationToken> {
        let mut run = self.run.lock().expect("run lock poisoned");
        if run.is_some() {
            return Err(Error::AlreadyRunning {
                conversation_id: self.conversation_id,
            });
        }
        let cancel = CancellationToken::new();
        *run = Some(RunState {
            started_at: Utc::now(),
            cancel: cancel.clone(),
        });
        Ok(cancel)
    }

    /// Release the run slot. Called from the engine's terminal callback,
    /// before the terminal event is published, so a follow-up start is never
    /// rejected spuriously.
    pub fn release_run(&self) {
        *self.run.lock().expect("run lock poisoned") = None;
    }

    /// Signal the in-flight engine call to stop. Advisory: the slot stays
    /// claimed until the terminal callback lands. Returns whether a run was
    /// active. Never creates a run slot.
    pub fn cancel_run(&self) -> bool {
        match self.run.lock().expect("run lock poisoned").as_ref() {
            Some(state) => {
                state.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

/// Registry of live sessions, keyed by conversation id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<ChatSession>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Get the session for a conversation, creating it on first use.
    #[must_use]
    pub fn session(&self, conversation_id: Uuid) -> Arc<ChatSession> {
        let session = self
            .sessions
            .entry(conversation_id)
            .or_insert_with(|| Arc::new(ChatSession::new(conversation_id)));
        Arc::clone(session.value())
    }

    /// Look up a session without creating it.
    #[must_use]
    pub fn get(&self, conversation_id: Uuid) -> Option<Arc<ChatSession>> {
        self.sessions
            .get(&conversation_id)
            .map(|s| Arc::clone(s.value()))
    }

    /// Drop a conversation's session. Existing subscriptions keep their
    /// receiver until they disconnect, but no further events are published.
    pub fn remove(&self, conversation_id: Uuid) {
        self.sessions.remove(&conversation_id);
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_order_per_observer() {
        let registry = SessionRegistry::new();
        let session = registry.session(Uuid::new_v4());
        let mut rx = session.subscribe();

        session.publish(RunEvent::RunStart);
        session.publish(RunEvent::ChatUser {
            content: "hi".into(),
        });
        session.publish(RunEvent::RunDone);

        assert_eq!(rx.recv().await.unwrap().event.name(), "run.start");
        assert_eq!(rx.recv().await.unwrap().event.name(), "chat.user");
        assert_eq!(rx.recv().await.unwrap().event.name(), "run.done");
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let registry = SessionRegistry::new();
        let session = registry.session(Uuid::new_v4());
        let mut early = session.subscribe();

        session.publish(RunEvent::RunStart);

        let mut late = session.subscribe();
        session.publish(RunEvent::RunDone);

        assert_eq!(early.recv().await.unwrap().event.name(), "run.start");
        assert_eq!(early.recv().await.unwrap().event.name(), "run.done");
        // the late observer only ever sees run.done
        assert_eq!(late.recv().await.unwrap().event.name(), "run.done");
        assert!(matches!(
            late.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_fan_out_to_all_observers() {
        let registry = SessionRegistry::new();
        let session = registry.session(Uuid::new_v4());
        let mut rx1 = session.subscribe();
        let mut rx2 = session.subscribe();

        assert_eq!(session.observer_count(), 2);
        let delivered = session.publish(RunEvent::RunStart);
        assert_eq!(delivered, 2);

        assert_eq!(rx1.recv().await.unwrap().event.name(), "run.start");
        assert_eq!(rx2.recv().await.unwrap().event.name(), "run.start");
    }

    #[test]
    fn test_publish_without_observers_is_dropped() {
        let registry = SessionRegistry::new();
        let session = registry.session(Uuid::new_v4());
        assert_eq!(session.publish(RunEvent::RunStart), 0);
    }

    #[test]
    fn test_claim_release() {
        let session = ChatSession::new(Uuid::new_v4());
        assert!(!session.is_running());

        let _token = session.claim_run().unwrap();
        assert!(session.is_running());
        assert!(session.run_started_at().is_some());
        assert!(session.claim_run().is_err());

        session.release_run();
        assert!(!session.is_running());
        assert!(session.claim_run().is_ok());
    }

    #[test]
    fn test_cancel_without_run_is_noop() {
        let session = ChatSession::new(Uuid::new_v4());
        assert!(!session.cancel_run());
        // cancel never creates a run slot
        assert!(!session.is_running());
    }

    #[test]
    fn test_cancel_fires_token_but_keeps_slot() {
        let session = ChatSession::new(Uuid::new_v4());
        let token = session.claim_run().unwrap();

        assert!(session.cancel_run());
        assert!(token.is_cancelled());
        // advisory: still running until the terminal callback releases
        assert!(session.is_running());
    }

    #[test]
    fn test_registry_reuses_sessions() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let a = registry.session(id);
        let b = registry.session(id);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        registry.remove(id);
        assert!(registry.is_empty());
        assert!(registry.get(id).is_none());
    }
}
