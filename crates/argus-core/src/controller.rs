//! Run controller
//!
//! Per-conversation single-writer coordination: claims the session's run
//! slot, publishes the opening events, hands the run to the engine on a
//! spawned task, and runs the terminal callback that clears the slot and
//! publishes `run.done` / `run.error`.
//!
//! Cancellation is advisory. `cancel` only signals the engine's token; the
//! slot stays claimed until the engine's own terminal callback lands, so a
//! cancel followed immediately by a start can still see `AlreadyRunning`.

use crate::conversation::{ConversationStore, StoredMessage};
use crate::engine::{BusSink, Engine, EngineRun, RunSink, TeeSink, TraceSink};
use crate::error::{Error, Result};
use crate::session::SessionRegistry;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Parameters of one start request.
#[derive(Debug, Clone)]
pub struct StartRun {
    /// The user message that triggers the run
    pub message: String,
    /// Model override; persisted as the conversation's selected model
    pub model_override: Option<String>,
    /// Reasoning-effort hint passed through to the engine
    pub reasoning_effort: Option<String>,
}

impl StartRun {
    /// A plain message with no overrides.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            model_override: None,
            reasoning_effort: None,
        }
    }
}

/// Coordinates run execution for all conversations.
pub struct RunController {
    store: Arc<dyn ConversationStore>,
    registry: Arc<SessionRegistry>,
    engine: Arc<dyn Engine>,
    log_events: bool,
}

impl RunController {
    /// Controller over the given store, session registry, and engine.
    #[must_use]
    pub fn new(
        store: Arc<dyn ConversationStore>,
        registry: Arc<SessionRegistry>,
        engine: Arc<dyn Engine>,
    ) -> Self {
        Self {
            store,
            registry,
            engine,
            log_events: false,
        }
    }

    /// Also mirror every published event into `tracing` records.
    #[must_use]
    pub fn with_event_logging(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    /// Start a run for a conversation.
    ///
    /// Fails with [`Error::AlreadyRunning`] while a run is active. On
    /// success the user message is recorded, `run.start`,
    /// `cycle.start{seq:1}` and `chat.user` are published in that order, and
    /// the engine executes on a spawned task; the caller is not blocked on
    /// completion.
    pub async fn start_run(&self, conversation_id: Uuid, request: StartRun) -> Result<()> {
        if request.message.trim().is_empty() {
            return Err(Error::InvalidInput("message must not be empty".into()));
        }
        // existence check before touching the run slot
        let conversation = self.store.get(conversation_id).await?;

        let session = self.registry.session(conversation_id);
        let cancel = session.claim_run()?;

        let model_name = match &request.model_override {
            Some(model) => {
                if let Err(e) = self
                    .store
                    .set_model(conversation_id, model.clone())
                    .await
                {
                    session.release_run();
                    return Err(e);
                }
                model.clone()
            }
            None => conversation.model_name.clone(),
        };

        if let Err(e) = self
            .store
            .append(conversation_id, StoredMessage::user(&request.message))
            .await
        {
            session.release_run();
            return Err(e);
        }
        let snapshot = match self.store.get(conversation_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                session.release_run();
                return Err(e);
            }
        };

        let bus: Arc<dyn RunSink> = Arc::new(BusSink::new(session.clone()));
        let sink: Arc<dyn RunSink> = if self.log_events {
            Arc::new(TeeSink::new(vec![bus, Arc::new(TraceSink)]))
        } else {
            bus
        };

        let first_cycle_id = Uuid::new_v4();
        sink.run_start();
        sink.cycle_start(first_cycle_id, 1);
        sink.chat_user(&request.message);

        info!(
            conversation_id = %conversation_id,
            model = %model_name,
            "run started"
        );

        let run = EngineRun::new(
            snapshot,
            model_name,
            request.reasoning_effort.clone(),
            first_cycle_id,
        );
        let engine = self.engine.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            let outcome = engine.run(run, sink.clone(), cancel).await;
            match outcome {
                Ok(messages) => {
                    for message in messages {
                        if let Err(e) = store.append(conversation_id, message).await {
                            warn!(
                                conversation_id = %conversation_id,
                                error = %e,
                                "failed to persist engine output"
                            );
                        }
                    }
                    // slot clears before the terminal event goes out, so a
                    // follow-up start racing run.done is never rejected
                    session.release_run();
                    sink.run_done();
                    info!(conversation_id = %conversation_id, "run completed");
                }
                Err(e) => {
                    session.release_run();
                    sink.run_error(&e.to_string());
                    warn!(conversation_id = %conversation_id, error = %e, "run failed");
                }
            }
        });

        Ok(())
    }

    /// Request cancellation of the in-flight run, if any.
    ///
    /// Publishes `run.cancel` unconditionally (an idempotent signal, emitted
    /// even when no run is active) and never creates a run slot.
    pub async fn cancel(&self, conversation_id: Uuid) -> Result<()> {
        let session = self.registry.session(conversation_id);
        let was_running = session.cancel_run();
        session.publish(crate::event::RunEvent::RunCancel);
        info!(
            conversation_id = %conversation_id,
            was_running,
            "cancel requested"
        );
        Ok(())
    }

    /// Whether a run is currently active for a conversation.
    #[must_use]
    pub fn is_running(&self, conversation_id: Uuid) -> bool {
        self.registry
            .get(conversation_id)
            .is_some_and(|s| s.is_running())
    }
}
