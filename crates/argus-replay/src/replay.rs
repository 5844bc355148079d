//! Replay builder
//!
//! Reconstructs the structured run view straight from a persisted
//! transcript, without ever seeing live events. Output is observationally
//! equivalent to the live reconciler's sealed view for the same run, except
//! that reasoning/response text comes verbatim from the stored messages instead
//! of accumulated deltas, and timing fields are absent.

use crate::view::{Cycle, RunView, ToolInvocation, ToolState};
use argus_core::conversation::{MessageRole, StoredMessage};
use std::collections::HashMap;
use uuid::Uuid;

/// Build the run view for a conversation's final message list.
///
/// Tool-result messages are grouped by invocation id and joined with the
/// declarations on the assistant messages. Assistant turns whose only
/// content is tool invocations are folded into the nearest visible cycle by
/// the shared normalization step, matching the live view's tool grouping.
#[must_use]
pub fn build_view(messages: &[StoredMessage]) -> RunView {
    let mut results: HashMap<&str, &StoredMessage> = HashMap::new();
    for message in messages {
        if message.role == MessageRole::Tool {
            if let Some(id) = message.tool_call_id.as_deref() {
                results.insert(id, message);
            }
        }
    }

    let mut cycles = Vec::new();
    for message in messages {
        if message.role != MessageRole::Assistant {
            continue;
        }
        let mut cycle = Cycle::new(Uuid::new_v4(), (cycles.len() + 1) as u32);
        cycle.response_text = message.content.clone();
        cycle.reasoning_text = message.reasoning.clone().unwrap_or_default();

        for decl in &message.tool_calls {
            let mut tool = ToolInvocation::started(&decl.id, &decl.name, decl.args.clone());
            tool.state = ToolState::Done;
            if let Some(result) = results.get(decl.id.as_str()) {
                tool.accumulated_output = result.content.clone();
                tool.final_result = result.tool_result.clone();
            }
            cycle.tools.insert(decl.id.clone(), tool);
        }
        cycle.seal();
        cycles.push(cycle);
    }

    RunView { cycles }.normalized()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::CycleReconciler;
    use argus_core::conversation::ToolCallDecl;
    use argus_core::event::{RunEvent, ToolData};
    use serde_json::json;

    #[test]
    fn test_simple_exchange() {
        let messages = vec![
            StoredMessage::user("hi"),
            StoredMessage::assistant("hello").with_reasoning("greeting"),
        ];
        let view = build_view(&messages);

        assert_eq!(view.cycles.len(), 1);
        assert_eq!(view.cycles[0].seq, 1);
        assert_eq!(view.cycles[0].response_text, "hello");
        assert_eq!(view.cycles[0].reasoning_text, "greeting");
        assert!(view.cycles[0].tools.is_empty());
    }

    #[test]
    fn test_tool_results_joined_by_id() {
        let messages = vec![
            StoredMessage::user("list files"),
            StoredMessage::assistant("here you go").with_tool_calls(vec![ToolCallDecl {
                id: "t1".into(),
                name: "shell".into(),
                args: json!({"cmd": "ls"}),
            }]),
            StoredMessage::tool_result("t1", "a.txt\nb.txt").with_result(json!({"exit": 0})),
        ];
        let view = build_view(&messages);

        let tool = &view.cycles[0].tools["t1"];
        assert_eq!(tool.name, "shell");
        assert_eq!(tool.accumulated_output, "a.txt\nb.txt");
        assert_eq!(tool.final_result, Some(json!({"exit": 0})));
        assert_eq!(tool.state, ToolState::Done);
        assert!(tool.elapsed_ms.is_none());
    }

    #[test]
    fn test_tools_only_turn_folds_into_preceding_cycle() {
        let messages = vec![
            StoredMessage::user("go"),
            StoredMessage::assistant("let me check"),
            // tools-only turn: no text, no reasoning
            StoredMessage::assistant("").with_tool_calls(vec![ToolCallDecl {
                id: "t1".into(),
                name: "search".into(),
                args: json!({"q": "x"}),
            }]),
            StoredMessage::tool_result("t1", "found"),
            StoredMessage::assistant("all done"),
        ];
        let view = build_view(&messages);

        assert_eq!(view.cycles.len(), 2);
        assert!(view.cycles[0].tools.contains_key("t1"));
        assert_eq!(view.cycles[1].response_text, "all done");
        assert_eq!(view.cycles[1].seq, 2);
    }

    #[test]
    fn test_missing_result_leaves_output_empty() {
        let messages = vec![StoredMessage::assistant("x").with_tool_calls(vec![ToolCallDecl {
            id: "orphan".into(),
            name: "shell".into(),
            args: json!({}),
        }])];
        let view = build_view(&messages);
        let tool = &view.cycles[0].tools["orphan"];
        assert_eq!(tool.accumulated_output, "");
        assert!(tool.final_result.is_none());
    }

    #[test]
    fn test_replay_matches_live_view() {
        // one run, streamed live and persisted, reconciled both ways
        let cycle_id = Uuid::new_v4();
        let events = vec![
            RunEvent::RunStart,
            RunEvent::CycleStart { cycle_id, seq: 1 },
            RunEvent::ChatUser {
                content: "inspect".into(),
            },
            RunEvent::ReasoningStart { cycle_id },
            RunEvent::ReasoningDelta {
                cycle_id,
                delta: "looking ".into(),
            },
            RunEvent::ReasoningDelta {
                cycle_id,
                delta: "around".into(),
            },
            RunEvent::ReasoningDone { cycle_id },
            RunEvent::ToolStart {
                id: "t1".into(),
                name: "shell".into(),
                args: json!({"cmd": "ls"}),
                cycle_id,
            },
            RunEvent::ToolData {
                id: "t1".into(),
                name: "shell".into(),
                data: ToolData::stream("a.txt"),
                cycle_id,
            },
            RunEvent::ToolEnd {
                id: "t1".into(),
                name: "shell".into(),
                elapsed_ms: 40,
                result: Some(json!({"exit": 0})),
                cycle_id,
            },
            RunEvent::ResponseStart { cycle_id },
            RunEvent::ResponseDelta {
                cycle_id,
                delta: "one file".into(),
            },
            RunEvent::ResponseDone { cycle_id },
            RunEvent::RunDone,
        ];

        let mut live = CycleReconciler::new();
        for event in &events {
            live.apply(event);
        }

        let messages = vec![
            StoredMessage::user("inspect"),
            StoredMessage::assistant("one file")
                .with_reasoning("looking around")
                .with_tool_calls(vec![ToolCallDecl {
                    id: "t1".into(),
                    name: "shell".into(),
                    args: json!({"cmd": "ls"}),
                }]),
            StoredMessage::tool_result("t1", "a.txt").with_result(json!({"exit": 0})),
        ];

        assert_eq!(live.view().normalized(), build_view(&messages));
    }
}
