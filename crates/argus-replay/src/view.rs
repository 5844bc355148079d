//! Structured run views
//!
//! The shape both the live reconciler and the replay builder produce: a list
//! of cycles, each with reasoning text, response text, and its tool
//! invocations. [`RunView::normalized`] is the shared observational
//! projection the two sides are compared through: it seals phases, folds
//! tools-only cycles, renumbers, and strips identifiers that only exist on
//! one side.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Lifecycle phase of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    /// Created, no content streamed yet
    AwaitingFirstToken,
    /// At least one reasoning/response token arrived
    Streaming,
    /// No further mutation
    Sealed,
}

/// State of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolState {
    /// Declared but not yet producing output
    Pending,
    /// Producing streamed output
    Streaming,
    /// Finished
    Done,
}

/// One call the agent made to an external capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    /// Invocation id
    pub id: String,
    /// Tool name
    pub name: String,
    /// Invocation arguments
    pub args: Value,
    /// Current state
    pub state: ToolState,
    /// Streamed output accumulated so far
    pub accumulated_output: String,
    /// Final result, if one was delivered
    pub final_result: Option<Value>,
    /// Wall-clock duration; absent in replayed views
    pub elapsed_ms: Option<u64>,
}

impl ToolInvocation {
    /// A fresh invocation, streaming from the start.
    #[must_use]
    pub fn started(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
            state: ToolState::Streaming,
            accumulated_output: String::new(),
            final_result: None,
            elapsed_ms: None,
        }
    }
}

/// One request/response round within a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cycle {
    /// Cycle id from the live stream; zeroed in normalized views
    pub id: Uuid,
    /// 1-based position within the run
    pub seq: u32,
    /// Lifecycle phase
    pub phase: CyclePhase,
    /// Accumulated reasoning text
    pub reasoning_text: String,
    /// Accumulated response text
    pub response_text: String,
    /// Tool invocations keyed by invocation id
    pub tools: BTreeMap<String, ToolInvocation>,
    /// Response stream has closed (`assistant.response.done` seen)
    pub response_closed: bool,
    /// Whether the cycle body is rendered collapsed
    pub collapsed: bool,
    /// The observer set the collapsed state explicitly; it is then
    /// authoritative and engine events never change it
    pub observer_pinned: bool,
}

impl Cycle {
    /// A fresh cycle awaiting its first token. Cycles render collapsed until
    /// the first token auto-expands them.
    #[must_use]
    pub fn new(id: Uuid, seq: u32) -> Self {
        Self {
            id,
            seq,
            phase: CyclePhase::AwaitingFirstToken,
            reasoning_text: String::new(),
            response_text: String::new(),
            tools: BTreeMap::new(),
            response_closed: false,
            collapsed: true,
            observer_pinned: false,
        }
    }

    /// A cycle with neither reasoning nor response text does not appear in
    /// the visible cycle list; its tools fold into a neighbor.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        !self.reasoning_text.is_empty() || !self.response_text.is_empty()
    }

    /// Whether every tool invocation reached `Done`.
    #[must_use]
    pub fn tools_settled(&self) -> bool {
        self.tools.values().all(|t| t.state == ToolState::Done)
    }

    /// Seal: no further mutation.
    pub fn seal(&mut self) {
        self.phase = CyclePhase::Sealed;
        for tool in self.tools.values_mut() {
            tool.state = ToolState::Done;
        }
        self.response_closed = true;
    }
}

/// The reconciled view of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunView {
    /// Cycles in sequence order
    pub cycles: Vec<Cycle>,
}

impl RunView {
    /// An empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cycle by id.
    #[must_use]
    pub fn cycle(&self, id: Uuid) -> Option<&Cycle> {
        self.cycles.iter().find(|c| c.id == id)
    }

    /// The observational projection used to compare a live-built view with a
    /// replayed one:
    ///
    /// - every cycle sealed,
    /// - tools-only cycles removed, their invocations attached to the nearest
    ///   preceding visible cycle (a leading tools-only cycle attaches to the
    ///   next visible one),
    /// - visible cycles renumbered from 1,
    /// - cycle ids zeroed (replay has no access to live ids),
    /// - timing fields stripped,
    /// - disclosure state reset.
    ///
    /// A run with no visible cycle at all keeps its cycles so the
    /// invocations aren't lost.
    #[must_use]
    pub fn normalized(&self) -> RunView {
        let mut sealed: Vec<Cycle> = self.cycles.clone();
        for cycle in &mut sealed {
            cycle.seal();
            cycle.collapsed = true;
            cycle.observer_pinned = false;
            for tool in cycle.tools.values_mut() {
                tool.elapsed_ms = None;
            }
        }

        if !sealed.iter().any(Cycle::is_visible) {
            // no visible cycle to fold into; keep the ones that carry tools,
            // drop cycles with no content at all
            let mut cycles: Vec<Cycle> = sealed
                .into_iter()
                .filter(|c| !c.tools.is_empty())
                .collect();
            for (i, cycle) in cycles.iter_mut().enumerate() {
                cycle.id = Uuid::nil();
                cycle.seq = (i + 1) as u32;
            }
            return RunView { cycles };
        }

        let mut visible: Vec<Cycle> = Vec::new();
        let mut leading: BTreeMap<String, ToolInvocation> = BTreeMap::new();
        for cycle in sealed {
            if cycle.is_visible() {
                let mut cycle = cycle;
                if !leading.is_empty() {
                    let mut folded = std::mem::take(&mut leading);
                    folded.append(&mut cycle.tools);
                    cycle.tools = folded;
                }
                visible.push(cycle);
            } else if let Some(last) = visible.last_mut() {
                for (id, tool) in cycle.tools {
                    last.tools.insert(id, tool);
                }
            } else {
                for (id, tool) in cycle.tools {
                    leading.insert(id, tool);
                }
            }
        }

        for (i, cycle) in visible.iter_mut().enumerate() {
            cycle.id = Uuid::nil();
            cycle.seq = (i + 1) as u32;
        }
        RunView { cycles: visible }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(id: &str) -> ToolInvocation {
        ToolInvocation::started(id, "shell", json!({}))
    }

    #[test]
    fn test_visibility() {
        let mut cycle = Cycle::new(Uuid::new_v4(), 1);
        assert!(!cycle.is_visible());
        cycle.reasoning_text.push_str("thinking");
        assert!(cycle.is_visible());

        let mut cycle = Cycle::new(Uuid::new_v4(), 1);
        cycle.response_text.push_str("answer");
        assert!(cycle.is_visible());
    }

    #[test]
    fn test_normalized_folds_tools_only_cycle_backwards() {
        let mut first = Cycle::new(Uuid::new_v4(), 1);
        first.response_text.push_str("hello");

        let mut tools_only = Cycle::new(Uuid::new_v4(), 2);
        tools_only.tools.insert("t1".into(), tool("t1"));

        let mut last = Cycle::new(Uuid::new_v4(), 3);
        last.response_text.push_str("done");

        let view = RunView {
            cycles: vec![first, tools_only, last],
        };
        let normalized = view.normalized();

        assert_eq!(normalized.cycles.len(), 2);
        assert_eq!(normalized.cycles[0].seq, 1);
        assert!(normalized.cycles[0].tools.contains_key("t1"));
        assert_eq!(normalized.cycles[1].seq, 2);
        assert!(normalized.cycles[1].tools.is_empty());
    }

    #[test]
    fn test_normalized_leading_tools_attach_forward() {
        let mut tools_only = Cycle::new(Uuid::new_v4(), 1);
        tools_only.tools.insert("t1".into(), tool("t1"));

        let mut visible = Cycle::new(Uuid::new_v4(), 2);
        visible.response_text.push_str("answer");

        let view = RunView {
            cycles: vec![tools_only, visible],
        };
        let normalized = view.normalized();

        assert_eq!(normalized.cycles.len(), 1);
        assert!(normalized.cycles[0].tools.contains_key("t1"));
        assert_eq!(normalized.cycles[0].response_text, "answer");
    }

    #[test]
    fn test_normalized_keeps_invisible_run() {
        let mut tools_only = Cycle::new(Uuid::new_v4(), 1);
        tools_only.tools.insert("t1".into(), tool("t1"));
        let view = RunView {
            cycles: vec![tools_only],
        };
        let normalized = view.normalized();
        assert_eq!(normalized.cycles.len(), 1);
        assert!(normalized.cycles[0].tools.contains_key("t1"));
    }

    #[test]
    fn test_normalized_drops_contentless_cycles() {
        // a cycle that streamed nothing and ran no tools leaves no trace in
        // the transcript, so it leaves no trace in the normalized view either
        let empty = Cycle::new(Uuid::new_v4(), 1);
        let view = RunView { cycles: vec![empty] };
        assert!(view.normalized().cycles.is_empty());
    }

    #[test]
    fn test_normalized_strips_timing_and_ids() {
        let mut cycle = Cycle::new(Uuid::new_v4(), 4);
        cycle.response_text.push_str("x");
        let mut t = tool("t1");
        t.elapsed_ms = Some(120);
        cycle.tools.insert("t1".into(), t);

        let normalized = RunView {
            cycles: vec![cycle],
        }
        .normalized();
        let cycle = &normalized.cycles[0];
        assert_eq!(cycle.id, Uuid::nil());
        assert_eq!(cycle.seq, 1);
        assert_eq!(cycle.phase, CyclePhase::Sealed);
        assert!(cycle.tools["t1"].elapsed_ms.is_none());
        assert_eq!(cycle.tools["t1"].state, ToolState::Done);
    }
}
