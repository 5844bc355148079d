//! Run lifecycle events
//!
//! Typed, timestamped facts about a run, published on the per-conversation
//! bus and mirrored verbatim onto observer streams. The event name travels in
//! the SSE `event:` line; the payload carries only the fields listed for that
//! name, so serialization here is payload-only rather than internally tagged.
//!
//! Events are immutable once published and are never persisted; a later
//! observer reconstructs the same view from the transcript instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Phase of a `tool.data` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolDataPhase {
    /// Incremental text output from a streaming tool
    Stream,
    /// A final result produced before `tool.end`
    Result,
}

/// Payload of a `tool.data` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolData {
    /// Whether this chunk is streamed output or a final result
    pub phase: ToolDataPhase,
    /// Streamed output chunk (phase = stream)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Final result value (phase = result)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ToolData {
    /// A streamed output chunk.
    #[must_use]
    pub fn stream(chunk: impl Into<String>) -> Self {
        Self {
            phase: ToolDataPhase::Stream,
            data: Some(chunk.into()),
            result: None,
        }
    }

    /// A final result delivered ahead of `tool.end`.
    #[must_use]
    pub fn result(value: Value) -> Self {
        Self {
            phase: ToolDataPhase::Result,
            data: None,
            result: Some(value),
        }
    }
}

/// Events emitted while a run executes.
///
/// Ordering invariants: `cycle.start` for a cycle precedes every event
/// carrying that `cycle_id`, and `tool.start` for an invocation id precedes
/// its `tool.data` and `tool.end`.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A run began (emitted once, with the first cycle)
    RunStart,
    /// A request/response cycle opened
    CycleStart {
        /// Cycle identifier carried by all events of this cycle
        cycle_id: Uuid,
        /// 1-based position of the cycle within the run
        seq: u32,
    },
    /// The user message that triggered the run
    ChatUser {
        /// Message text
        content: String,
    },
    /// Reasoning stream opened
    ReasoningStart {
        /// Owning cycle
        cycle_id: Uuid,
    },
    /// Reasoning text fragment
    ReasoningDelta {
        /// Owning cycle
        cycle_id: Uuid,
        /// Text fragment
        delta: String,
    },
    /// Reasoning stream closed
    ReasoningDone {
        /// Owning cycle
        cycle_id: Uuid,
    },
    /// Response stream opened
    ResponseStart {
        /// Owning cycle
        cycle_id: Uuid,
    },
    /// Response text fragment
    ResponseDelta {
        /// Owning cycle
        cycle_id: Uuid,
        /// Text fragment
        delta: String,
    },
    /// Response stream closed
    ResponseDone {
        /// Owning cycle
        cycle_id: Uuid,
    },
    /// A tool invocation began
    ToolStart {
        /// Tool call id from the engine
        id: String,
        /// Tool name
        name: String,
        /// Invocation arguments
        args: Value,
        /// Owning cycle
        cycle_id: Uuid,
    },
    /// Streamed tool output or an early final result
    ToolData {
        /// Tool call id
        id: String,
        /// Tool name
        name: String,
        /// Chunk payload
        data: ToolData,
        /// Owning cycle
        cycle_id: Uuid,
    },
    /// A tool invocation finished
    ToolEnd {
        /// Tool call id
        id: String,
        /// Tool name
        name: String,
        /// Wall-clock duration of the invocation
        elapsed_ms: u64,
        /// Final result; `None` leaves any result set by `tool.data` intact
        result: Option<Value>,
        /// Owning cycle
        cycle_id: Uuid,
    },
    /// Cancellation was requested (advisory, may fire with no active run)
    RunCancel,
    /// The run completed successfully
    RunDone,
    /// The run failed
    RunError {
        /// Sanitized error description
        error: String,
    },
    /// Keepalive, published per subscription on a fixed interval
    Ping {
        /// Server time
        ts: DateTime<Utc>,
    },
    /// Greeting sent immediately on subscribe
    Hello {
        /// Always true; lets clients distinguish a healthy connect
        ok: bool,
        /// Server time
        ts: DateTime<Utc>,
    },
}

impl RunEvent {
    /// Wire name of the event, as carried in the SSE `event:` line.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStart => "run.start",
            Self::CycleStart { .. } => "cycle.start",
            Self::ChatUser { .. } => "chat.user",
            Self::ReasoningStart { .. } => "assistant.reasoning.start",
            Self::ReasoningDelta { .. } => "assistant.reasoning.delta",
            Self::ReasoningDone { .. } => "assistant.reasoning.done",
            Self::ResponseStart { .. } => "assistant.response.start",
            Self::ResponseDelta { .. } => "assistant.response.delta",
            Self::ResponseDone { .. } => "assistant.response.done",
            Self::ToolStart { .. } => "tool.start",
            Self::ToolData { .. } => "tool.data",
            Self::ToolEnd { .. } => "tool.end",
            Self::RunCancel => "run.cancel",
            Self::RunDone => "run.done",
            Self::RunError { .. } => "run.error",
            Self::Ping { .. } => "ping",
            Self::Hello { .. } => "hello",
        }
    }

    /// The cycle this event belongs to, if it carries one.
    #[must_use]
    pub fn cycle_id(&self) -> Option<Uuid> {
        match self {
            Self::CycleStart { cycle_id, .. }
            | Self::ReasoningStart { cycle_id }
            | Self::ReasoningDelta { cycle_id, .. }
            | Self::ReasoningDone { cycle_id }
            | Self::ResponseStart { cycle_id }
            | Self::ResponseDelta { cycle_id, .. }
            | Self::ResponseDone { cycle_id }
            | Self::ToolStart { cycle_id, .. }
            | Self::ToolData { cycle_id, .. }
            | Self::ToolEnd { cycle_id, .. } => Some(*cycle_id),
            _ => None,
        }
    }

    /// Whether this event terminates the run (seals all cycles).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunDone | Self::RunError { .. })
    }

    /// Payload object for the wire, without the event name.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::RunStart | Self::RunCancel | Self::RunDone => json!({}),
            Self::CycleStart { cycle_id, seq } => json!({"cycle_id": cycle_id, "seq": seq}),
            Self::ChatUser { content } => json!({"content": content}),
            Self::ReasoningStart { cycle_id }
            | Self::ReasoningDone { cycle_id }
            | Self::ResponseStart { cycle_id }
            | Self::ResponseDone { cycle_id } => json!({"cycle_id": cycle_id}),
            Self::ReasoningDelta { cycle_id, delta }
            | Self::ResponseDelta { cycle_id, delta } => {
                json!({"cycle_id": cycle_id, "delta": delta})
            }
            Self::ToolStart {
                id,
                name,
                args,
                cycle_id,
            } => json!({"id": id, "name": name, "args": args, "cycle_id": cycle_id}),
            Self::ToolData {
                id,
                name,
                data,
                cycle_id,
            } => json!({"id": id, "name": name, "data": data, "cycle_id": cycle_id}),
            Self::ToolEnd {
                id,
                name,
                elapsed_ms,
                result,
                cycle_id,
            } => json!({
                "id": id,
                "name": name,
                "elapsed_ms": elapsed_ms,
                "result": result,
                "cycle_id": cycle_id,
            }),
            Self::RunError { error } => json!({"error": error}),
            Self::Ping { ts } => json!({"ts": ts}),
            Self::Hello { ok, ts } => json!({"ok": ok, "ts": ts}),
        }
    }

    /// Decode an observer-side frame back into an event.
    ///
    /// Returns `None` for unknown names or malformed payloads; the caller
    /// drops the frame and keeps the subscription alive.
    #[must_use]
    pub fn from_frame(name: &str, payload: &Value) -> Option<Self> {
        #[derive(Deserialize)]
        struct CyclePayload {
            cycle_id: Uuid,
        }
        #[derive(Deserialize)]
        struct CycleStartPayload {
            cycle_id: Uuid,
            seq: u32,
        }
        #[derive(Deserialize)]
        struct DeltaPayload {
            cycle_id: Uuid,
            delta: String,
        }
        #[derive(Deserialize)]
        struct ToolStartPayload {
            id: String,
            name: String,
            args: Value,
            cycle_id: Uuid,
        }
        #[derive(Deserialize)]
        struct ToolDataPayload {
            id: String,
            name: String,
            data: ToolData,
            cycle_id: Uuid,
        }
        #[derive(Deserialize)]
        struct ToolEndPayload {
            id: String,
            name: String,
            elapsed_ms: u64,
            #[serde(default)]
            result: Option<Value>,
            cycle_id: Uuid,
        }

        let ev = match name {
            "run.start" => Self::RunStart,
            "run.cancel" => Self::RunCancel,
            "run.done" => Self::RunDone,
            "run.error" => Self::RunError {
                error: payload.get("error")?.as_str()?.to_string(),
            },
            "chat.user" => Self::ChatUser {
                content: payload.get("content")?.as_str()?.to_string(),
            },
            "cycle.start" => {
                let p: CycleStartPayload = serde_json::from_value(payload.clone()).ok()?;
                Self::CycleStart {
                    cycle_id: p.cycle_id,
                    seq: p.seq,
                }
            }
            "assistant.reasoning.start" => {
                let p: CyclePayload = serde_json::from_value(payload.clone()).ok()?;
                Self::ReasoningStart {
                    cycle_id: p.cycle_id,
                }
            }
            "assistant.reasoning.delta" => {
                let p: DeltaPayload = serde_json::from_value(payload.clone()).ok()?;
                Self::ReasoningDelta {
                    cycle_id: p.cycle_id,
                    delta: p.delta,
                }
            }
            "assistant.reasoning.done" => {
                let p: CyclePayload = serde_json::from_value(payload.clone()).ok()?;
                Self::ReasoningDone {
                    cycle_id: p.cycle_id,
                }
            }
            "assistant.response.start" => {
                let p: CyclePayload = serde_json::from_value(payload.clone()).ok()?;
                Self::ResponseStart {
                    cycle_id: p.cycle_id,
                }
            }
            "assistant.response.delta" => {
                let p: DeltaPayload = serde_json::from_value(payload.clone()).ok()?;
                Self::ResponseDelta {
                    cycle_id: p.cycle_id,
                    delta: p.delta,
                }
            }
            "assistant.response.done" => {
                let p: CyclePayload = serde_json::from_value(payload.clone()).ok()?;
                Self::ResponseDone {
                    cycle_id: p.cycle_id,
                }
            }
            "tool.start" => {
                let p: ToolStartPayload = serde_json::from_value(payload.clone()).ok()?;
                Self::ToolStart {
                    id: p.id,
                    name: p.name,
                    args: p.args,
                    cycle_id: p.cycle_id,
                }
            }
            "tool.data" => {
                let p: ToolDataPayload = serde_json::from_value(payload.clone()).ok()?;
                Self::ToolData {
                    id: p.id,
                    name: p.name,
                    data: p.data,
                    cycle_id: p.cycle_id,
                }
            }
            "tool.end" => {
                let p: ToolEndPayload = serde_json::from_value(payload.clone()).ok()?;
                Self::ToolEnd {
                    id: p.id,
                    name: p.name,
                    elapsed_ms: p.elapsed_ms,
                    result: p.result.filter(|v| !v.is_null()),
                    cycle_id: p.cycle_id,
                }
            }
            "ping" => Self::Ping {
                ts: serde_json::from_value(payload.get("ts")?.clone()).ok()?,
            },
            "hello" => Self::Hello {
                ok: payload.get("ok")?.as_bool()?,
                ts: serde_json::from_value(payload.get("ts")?.clone()).ok()?,
            },
            _ => return None,
        };
        Some(ev)
    }
}

/// A published event with its bus metadata.
///
/// The timestamp is server time at publication; it feeds logging and the
/// observer's last-event bookkeeping and is never part of the wire payload.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Conversation the event belongs to
    pub conversation_id: Uuid,
    /// The event itself
    pub event: RunEvent,
    /// Publication time
    pub ts: DateTime<Utc>,
}

impl Envelope {
    /// Wrap an event for publication, stamping the current time.
    #[must_use]
    pub fn new(conversation_id: Uuid, event: RunEvent) -> Self {
        Self {
            conversation_id,
            event,
            ts: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        let cycle_id = Uuid::nil();
        let cases: Vec<(RunEvent, &str)> = vec![
            (RunEvent::RunStart, "run.start"),
            (RunEvent::CycleStart { cycle_id, seq: 1 }, "cycle.start"),
            (
                RunEvent::ReasoningDelta {
                    cycle_id,
                    delta: "x".into(),
                },
                "assistant.reasoning.delta",
            ),
            (
                RunEvent::ResponseDone { cycle_id },
                "assistant.response.done",
            ),
            (RunEvent::RunCancel, "run.cancel"),
            (
                RunEvent::RunError {
                    error: "boom".into(),
                },
                "run.error",
            ),
        ];
        for (ev, name) in cases {
            assert_eq!(ev.name(), name);
        }
    }

    #[test]
    fn test_payload_shapes() {
        assert_eq!(RunEvent::RunStart.payload(), json!({}));

        let cycle_id = Uuid::new_v4();
        let payload = RunEvent::CycleStart { cycle_id, seq: 3 }.payload();
        assert_eq!(payload["seq"], 3);
        assert_eq!(payload["cycle_id"], json!(cycle_id));

        let payload = RunEvent::ToolEnd {
            id: "t1".into(),
            name: "shell".into(),
            elapsed_ms: 42,
            result: None,
            cycle_id,
        }
        .payload();
        // result is always present on tool.end, null when the tool had none
        assert!(payload["result"].is_null());
        assert_eq!(payload["elapsed_ms"], 42);
    }

    #[test]
    fn test_frame_roundtrip() {
        let cycle_id = Uuid::new_v4();
        let events = vec![
            RunEvent::RunStart,
            RunEvent::CycleStart { cycle_id, seq: 1 },
            RunEvent::ChatUser {
                content: "hi".into(),
            },
            RunEvent::ReasoningStart { cycle_id },
            RunEvent::ReasoningDelta {
                cycle_id,
                delta: "think".into(),
            },
            RunEvent::ReasoningDone { cycle_id },
            RunEvent::ResponseDelta {
                cycle_id,
                delta: "answer".into(),
            },
            RunEvent::ToolStart {
                id: "t1".into(),
                name: "shell".into(),
                args: json!({"cmd": "ls"}),
                cycle_id,
            },
            RunEvent::ToolData {
                id: "t1".into(),
                name: "shell".into(),
                data: ToolData::stream("out"),
                cycle_id,
            },
            RunEvent::ToolEnd {
                id: "t1".into(),
                name: "shell".into(),
                elapsed_ms: 7,
                result: Some(json!({"exit": 0})),
                cycle_id,
            },
            RunEvent::RunDone,
        ];
        for ev in events {
            let decoded = RunEvent::from_frame(ev.name(), &ev.payload()).unwrap();
            assert_eq!(decoded, ev);
        }
    }

    #[test]
    fn test_tool_end_null_result_decodes_as_none() {
        let cycle_id = Uuid::new_v4();
        let ev = RunEvent::ToolEnd {
            id: "t1".into(),
            name: "shell".into(),
            elapsed_ms: 1,
            result: None,
            cycle_id,
        };
        match RunEvent::from_frame("tool.end", &ev.payload()).unwrap() {
            RunEvent::ToolEnd { result, .. } => assert!(result.is_none()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_frames_dropped() {
        assert!(RunEvent::from_frame("no.such.event", &json!({})).is_none());
        assert!(RunEvent::from_frame("cycle.start", &json!({"seq": 1})).is_none());
        assert!(RunEvent::from_frame("chat.user", &json!({})).is_none());
        assert!(
            RunEvent::from_frame("tool.data", &json!({"id": "t1", "cycle_id": "not-a-uuid"}))
                .is_none()
        );
    }

    #[test]
    fn test_tool_data_serialization_skips_absent_fields() {
        let data = ToolData::stream("chunk");
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["phase"], "stream");
        assert_eq!(json["data"], "chunk");
        assert!(json.get("result").is_none());

        let data = ToolData::result(json!({"ok": true}));
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["phase"], "result");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_cycle_id_extraction() {
        let cycle_id = Uuid::new_v4();
        let events = vec![
            RunEvent::CycleStart { cycle_id, seq: 1 },
            RunEvent::ReasoningStart { cycle_id },
            RunEvent::ResponseDelta {
                cycle_id,
                delta: "x".into(),
            },
            RunEvent::ToolEnd {
                id: "t".into(),
                name: "n".into(),
                elapsed_ms: 0,
                result: None,
                cycle_id,
            },
        ];
        for event in events {
            assert_eq!(event.cycle_id(), Some(cycle_id));
        }
        assert!(RunEvent::RunStart.cycle_id().is_none());
        assert!(RunEvent::RunDone.cycle_id().is_none());
    }

    #[test]
    fn test_terminal_events() {
        assert!(RunEvent::RunDone.is_terminal());
        assert!(RunEvent::RunError { error: "e".into() }.is_terminal());
        assert!(!RunEvent::RunCancel.is_terminal());
        assert!(!RunEvent::RunStart.is_terminal());
    }
}
