//! Engine contract
//!
//! The agent engine is an external collaborator; this module fixes the two
//! interfaces it touches: [`RunSink`], the structured event-sink the engine
//! reports progress through (one method per event type), and [`Engine`], the
//! async entry point the run controller hands a claimed run to.
//!
//! `RunSink` has exactly two production implementations: [`BusSink`] for live
//! publication and [`TraceSink`] for passive logging. Everything downstream
//! (the cycle reconciler in particular) can be exercised by feeding it a
//! literal event sequence, with no network or rendering dependency.

use crate::conversation::{Conversation, StoredMessage, ToolCallDecl};
use crate::error::{Error, Result};
use crate::event::{RunEvent, ToolData};
use crate::session::ChatSession;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Event sink the engine (and the controller) report through.
///
/// Implementors provide [`RunSink::emit`]; the per-event methods construct
/// the event and forward to it.
pub trait RunSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: RunEvent);

    /// `run.start`
    fn run_start(&self) {
        self.emit(RunEvent::RunStart);
    }

    /// `cycle.start`
    fn cycle_start(&self, cycle_id: Uuid, seq: u32) {
        self.emit(RunEvent::CycleStart { cycle_id, seq });
    }

    /// `chat.user`
    fn chat_user(&self, content: &str) {
        self.emit(RunEvent::ChatUser {
            content: content.to_string(),
        });
    }

    /// `assistant.reasoning.start`
    fn reasoning_start(&self, cycle_id: Uuid) {
        self.emit(RunEvent::ReasoningStart { cycle_id });
    }

    /// `assistant.reasoning.delta`
    fn reasoning_delta(&self, cycle_id: Uuid, delta: &str) {
        self.emit(RunEvent::ReasoningDelta {
            cycle_id,
            delta: delta.to_string(),
        });
    }

    /// `assistant.reasoning.done`
    fn reasoning_done(&self, cycle_id: Uuid) {
        self.emit(RunEvent::ReasoningDone { cycle_id });
    }

    /// `assistant.response.start`
    fn response_start(&self, cycle_id: Uuid) {
        self.emit(RunEvent::ResponseStart { cycle_id });
    }

    /// `assistant.response.delta`
    fn response_delta(&self, cycle_id: Uuid, delta: &str) {
        self.emit(RunEvent::ResponseDelta {
            cycle_id,
            delta: delta.to_string(),
        });
    }

    /// `assistant.response.done`
    fn response_done(&self, cycle_id: Uuid) {
        self.emit(RunEvent::ResponseDone { cycle_id });
    }

    /// `tool.start`
    fn tool_start(&self, id: &str, name: &str, args: Value, cycle_id: Uuid) {
        self.emit(RunEvent::ToolStart {
            id: id.to_string(),
            name: name.to_string(),
            args,
            cycle_id,
        });
    }

    /// `tool.data`
    fn tool_data(&self, id: &str, name: &str, data: ToolData, cycle_id: Uuid) {
        self.emit(RunEvent::ToolData {
            id: id.to_string(),
            name: name.to_string(),
            data,
            cycle_id,
        });
    }

    /// `tool.end`
    fn tool_end(
        &self,
        id: &str,
        name: &str,
        elapsed_ms: u64,
        result: Option<Value>,
        cycle_id: Uuid,
    ) {
        self.emit(RunEvent::ToolEnd {
            id: id.to_string(),
            name: name.to_string(),
            elapsed_ms,
            result,
            cycle_id,
        });
    }

    /// `run.cancel`
    fn run_cancel(&self) {
        self.emit(RunEvent::RunCancel);
    }

    /// `run.done`
    fn run_done(&self) {
        self.emit(RunEvent::RunDone);
    }

    /// `run.error`
    fn run_error(&self, error: &str) {
        self.emit(RunEvent::RunError {
            error: error.to_string(),
        });
    }
}

/// Live publication sink: every event goes to the session bus.
pub struct BusSink {
    session: Arc<ChatSession>,
}

impl BusSink {
    /// Sink publishing onto the given session's bus.
    #[must_use]
    pub fn new(session: Arc<ChatSession>) -> Self {
        Self { session }
    }
}

impl RunSink for BusSink {
    fn emit(&self, event: RunEvent) {
        self.session.publish(event);
    }
}

/// Passive logging sink: events become `tracing` records and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceSink;

impl RunSink for TraceSink {
    fn emit(&self, event: RunEvent) {
        debug!(event = event.name(), payload = %event.payload(), "run event");
    }
}

/// Fan-out sink; used to pair live publication with passive logging.
pub struct TeeSink {
    sinks: Vec<Arc<dyn RunSink>>,
}

impl TeeSink {
    /// Sink forwarding every event to each of the given sinks, in order.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn RunSink>>) -> Self {
        Self { sinks }
    }
}

impl RunSink for TeeSink {
    fn emit(&self, event: RunEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

/// Everything the engine needs for one run.
pub struct EngineRun {
    /// Transcript snapshot at run start (already includes the new user message)
    pub conversation: Conversation,
    /// Resolved model for this run
    pub model_name: String,
    /// Working directory for tool execution
    pub base_dir: Option<String>,
    /// Optional reasoning-effort hint passed through from the request
    pub reasoning_effort: Option<String>,
    /// The cycle opened by the controller together with `run.start`
    pub first_cycle_id: Uuid,
    next_seq: AtomicU32,
}

impl EngineRun {
    /// Build the context for a freshly claimed run.
    #[must_use]
    pub fn new(
        conversation: Conversation,
        model_name: String,
        reasoning_effort: Option<String>,
        first_cycle_id: Uuid,
    ) -> Self {
        let base_dir = conversation.base_dir.clone();
        Self {
            conversation,
            model_name,
            base_dir,
            reasoning_effort,
            first_cycle_id,
            next_seq: AtomicU32::new(2),
        }
    }

    /// Open a follow-up cycle: allocates the id and the next sequence number
    /// and publishes `cycle.start` through the sink.
    pub fn open_cycle(&self, sink: &dyn RunSink) -> Uuid {
        let cycle_id = Uuid::new_v4();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        sink.cycle_start(cycle_id, seq);
        cycle_id
    }
}

/// The agent engine boundary.
///
/// `run` executes one claimed run to completion, reporting progress through
/// the sink, and returns the messages to append to the transcript. The cancel
/// token is advisory: the engine checks it at its own convenient points.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Execute one run.
    async fn run(
        &self,
        run: EngineRun,
        sink: Arc<dyn RunSink>,
        cancel: CancellationToken,
    ) -> Result<Vec<StoredMessage>>;
}

// ---------------------------------------------------------------------------
// Scripted engine
// ---------------------------------------------------------------------------

/// One step of a scripted run.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Stream reasoning text, one delta per fragment.
    Reasoning(Vec<String>),
    /// Stream response text, one delta per fragment.
    Response(Vec<String>),
    /// Run one tool invocation.
    Tool {
        /// Invocation id
        id: String,
        /// Tool name
        name: String,
        /// Invocation arguments
        args: Value,
        /// Streamed output chunks (`tool.data` phase `stream`)
        stream: Vec<String>,
        /// Early result via `tool.data` phase `result`
        data_result: Option<Value>,
        /// Result on `tool.end`; `None` sends a null result field
        end_result: Option<Value>,
        /// Reported duration
        elapsed_ms: u64,
    },
    /// Close the current cycle and open the next one.
    NextCycle,
    /// Block until the run is cancelled, then stop gracefully.
    AwaitCancel,
    /// Fail the run.
    Fail(String),
}

/// Engine that replays a fixed script of sink calls.
///
/// Besides driving the live event stream it accumulates the transcript
/// messages a real engine would persist, so live-versus-replay equivalence
/// can be exercised end to end.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    steps: Vec<ScriptStep>,
}

#[derive(Default)]
struct CycleDraft {
    reasoning: String,
    response: String,
    tool_calls: Vec<ToolCallDecl>,
    tool_results: Vec<StoredMessage>,
}

impl CycleDraft {
    fn flush(&mut self, out: &mut Vec<StoredMessage>) {
        if self.reasoning.is_empty() && self.response.is_empty() && self.tool_calls.is_empty() {
            return;
        }
        let mut message = StoredMessage::assistant(std::mem::take(&mut self.response))
            .with_tool_calls(std::mem::take(&mut self.tool_calls));
        if !self.reasoning.is_empty() {
            message = message.with_reasoning(std::mem::take(&mut self.reasoning));
        }
        out.push(message);
        out.append(&mut self.tool_results);
    }
}

impl ScriptedEngine {
    /// Engine that runs the given steps in order.
    #[must_use]
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn run(
        &self,
        run: EngineRun,
        sink: Arc<dyn RunSink>,
        cancel: CancellationToken,
    ) -> Result<Vec<StoredMessage>> {
        let mut messages = Vec::new();
        let mut draft = CycleDraft::default();
        let mut cycle_id = run.first_cycle_id;

        for step in &self.steps {
            if cancel.is_cancelled() {
                break;
            }
            match step {
                ScriptStep::Reasoning(fragments) => {
                    sink.reasoning_start(cycle_id);
                    for fragment in fragments {
                        sink.reasoning_delta(cycle_id, fragment);
                        draft.reasoning.push_str(fragment);
                    }
                    sink.reasoning_done(cycle_id);
                }
                ScriptStep::Response(fragments) => {
                    sink.response_start(cycle_id);
                    for fragment in fragments {
                        sink.response_delta(cycle_id, fragment);
                        draft.response.push_str(fragment);
                    }
                    sink.response_done(cycle_id);
                }
                ScriptStep::Tool {
                    id,
                    name,
                    args,
                    stream,
                    data_result,
                    end_result,
                    elapsed_ms,
                } => {
                    sink.tool_start(id, name, args.clone(), cycle_id);
                    for chunk in stream {
                        sink.tool_data(id, name, ToolData::stream(chunk.clone()), cycle_id);
                    }
                    if let Some(result) = data_result {
                        sink.tool_data(id, name, ToolData::result(result.clone()), cycle_id);
                    }
                    sink.tool_end(id, name, *elapsed_ms, end_result.clone(), cycle_id);

                    draft.tool_calls.push(ToolCallDecl {
                        id: id.clone(),
                        name: name.clone(),
                        args: args.clone(),
                    });
                    let mut stored = StoredMessage::tool_result(id.clone(), stream.concat());
                    if let Some(result) = end_result.as_ref().or(data_result.as_ref()) {
                        stored = stored.with_result(result.clone());
                    }
                    draft.tool_results.push(stored);
                }
                ScriptStep::NextCycle => {
                    draft.flush(&mut messages);
                    cycle_id = run.open_cycle(sink.as_ref());
                }
                ScriptStep::AwaitCancel => {
                    cancel.cancelled().await;
                    break;
                }
                ScriptStep::Fail(error) => {
                    return Err(Error::Engine(error.clone()));
                }
            }
        }

        draft.flush(&mut messages);
        Ok(messages)
    }
}

/// Trivial default engine: echoes the last user message back as the
/// response, one word per delta. Lets the server run standalone.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoEngine;

#[async_trait]
impl Engine for EchoEngine {
    async fn run(
        &self,
        run: EngineRun,
        sink: Arc<dyn RunSink>,
        _cancel: CancellationToken,
    ) -> Result<Vec<StoredMessage>> {
        let text = run
            .conversation
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::conversation::MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let cycle_id = run.first_cycle_id;
        sink.response_start(cycle_id);
        let mut response = String::new();
        for (i, word) in text.split_whitespace().enumerate() {
            let delta = if i == 0 {
                word.to_string()
            } else {
                format!(" {word}")
            };
            response.push_str(&delta);
            sink.response_delta(cycle_id, &delta);
        }
        sink.response_done(cycle_id);

        Ok(vec![StoredMessage::assistant(response)])
    }
}
