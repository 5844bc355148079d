//! Cycle reconciler
//!
//! A pure state machine that folds an ordered event sequence into a
//! [`RunView`]. It runs identically wherever an event stream is consumed,
//! server-side logging or a client UI, and has no network or rendering
//! dependency: feed it literal [`RunEvent`] values.
//!
//! `apply` reports the render key the event dirtied so the caller can
//! coalesce expensive re-renders (see [`crate::coalesce`]); high-frequency
//! delta events map to a per-cycle, per-channel key.

use crate::view::{Cycle, CyclePhase, RunView, ToolInvocation, ToolState};
use argus_core::event::{RunEvent, ToolDataPhase};
use std::collections::HashMap;
use uuid::Uuid;

/// What an applied event dirtied, for render coalescing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderKey {
    /// Reasoning text of one cycle
    Reasoning(Uuid),
    /// Response text of one cycle
    Response(Uuid),
    /// Anything that changes the cycle list or a tool invocation
    Structure,
}

/// Folds run events into a structured view.
#[derive(Debug, Default)]
pub struct CycleReconciler {
    view: RunView,
    index: HashMap<Uuid, usize>,
    sealed: bool,
}

impl CycleReconciler {
    /// An empty reconciler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current view.
    #[must_use]
    pub fn view(&self) -> &RunView {
        &self.view
    }

    /// Whether the run has reached a terminal event; later events are
    /// dropped.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Observer-set disclosure. Once set it is authoritative: engine events
    /// never change it again.
    pub fn set_collapsed(&mut self, cycle_id: Uuid, collapsed: bool) {
        if let Some(cycle) = self.cycle_mut(cycle_id) {
            cycle.collapsed = collapsed;
            cycle.observer_pinned = true;
        }
    }

    fn cycle_mut(&mut self, cycle_id: Uuid) -> Option<&mut Cycle> {
        let idx = *self.index.get(&cycle_id)?;
        self.view.cycles.get_mut(idx)
    }

    /// First token of a cycle: move to Streaming and auto-expand unless the
    /// observer pinned the disclosure state.
    fn on_first_token(cycle: &mut Cycle) {
        if cycle.phase == CyclePhase::AwaitingFirstToken {
            cycle.phase = CyclePhase::Streaming;
            if !cycle.observer_pinned {
                cycle.collapsed = false;
            }
        }
    }

    fn maybe_seal_cycle(cycle: &mut Cycle) {
        if cycle.response_closed && cycle.tools_settled() {
            cycle.phase = CyclePhase::Sealed;
        }
    }

    /// Apply one event. Returns the dirtied render key, or `None` when the
    /// event changed nothing (dropped, unknown cycle, keepalive).
    pub fn apply(&mut self, event: &RunEvent) -> Option<RenderKey> {
        if self.sealed {
            // terminal event already seen; late events are dropped
            return None;
        }
        match event {
            RunEvent::CycleStart { cycle_id, seq } => {
                if self.index.contains_key(cycle_id) {
                    return None;
                }
                self.index.insert(*cycle_id, self.view.cycles.len());
                self.view.cycles.push(Cycle::new(*cycle_id, *seq));
                Some(RenderKey::Structure)
            }
            RunEvent::ReasoningStart { .. } | RunEvent::ResponseStart { .. } => None,
            RunEvent::ReasoningDelta { cycle_id, delta } => {
                let cycle = self.cycle_mut(*cycle_id)?;
                if cycle.phase == CyclePhase::Sealed {
                    return None;
                }
                Self::on_first_token(cycle);
                cycle.reasoning_text.push_str(delta);
                Some(RenderKey::Reasoning(*cycle_id))
            }
            RunEvent::ResponseDelta { cycle_id, delta } => {
                let cycle = self.cycle_mut(*cycle_id)?;
                if cycle.phase == CyclePhase::Sealed {
                    return None;
                }
                Self::on_first_token(cycle);
                cycle.response_text.push_str(delta);
                Some(RenderKey::Response(*cycle_id))
            }
            RunEvent::ReasoningDone { .. } => None,
            RunEvent::ResponseDone { cycle_id } => {
                let cycle = self.cycle_mut(*cycle_id)?;
                if cycle.phase == CyclePhase::Sealed {
                    return None;
                }
                cycle.response_closed = true;
                Self::maybe_seal_cycle(cycle);
                Some(RenderKey::Structure)
            }
            RunEvent::ToolStart {
                id,
                name,
                args,
                cycle_id,
            } => {
                let cycle = self.cycle_mut(*cycle_id)?;
                if cycle.phase == CyclePhase::Sealed || cycle.tools.contains_key(id) {
                    return None;
                }
                cycle
                    .tools
                    .insert(id.clone(), ToolInvocation::started(id, name, args.clone()));
                Some(RenderKey::Structure)
            }
            RunEvent::ToolData {
                id, data, cycle_id, ..
            } => {
                let cycle = self.cycle_mut(*cycle_id)?;
                if cycle.phase == CyclePhase::Sealed {
                    return None;
                }
                let tool = cycle.tools.get_mut(id)?;
                if tool.state == ToolState::Done {
                    return None;
                }
                match data.phase {
                    ToolDataPhase::Stream => {
                        if let Some(chunk) = &data.data {
                            tool.accumulated_output.push_str(chunk);
                        }
                    }
                    ToolDataPhase::Result => {
                        if let Some(result) = &data.result {
                            tool.final_result = Some(result.clone());
                        }
                    }
                }
                Some(RenderKey::Structure)
            }
            RunEvent::ToolEnd {
                id,
                elapsed_ms,
                result,
                cycle_id,
                ..
            } => {
                let cycle = self.cycle_mut(*cycle_id)?;
                if cycle.phase == CyclePhase::Sealed {
                    return None;
                }
                let tool = cycle.tools.get_mut(id)?;
                tool.state = ToolState::Done;
                tool.elapsed_ms = Some(*elapsed_ms);
                // a result on tool.end supersedes one set by tool.data;
                // absence leaves the earlier result intact
                if let Some(result) = result {
                    tool.final_result = Some(result.clone());
                }
                Self::maybe_seal_cycle(cycle);
                Some(RenderKey::Structure)
            }
            RunEvent::RunDone | RunEvent::RunError { .. } => {
                for cycle in &mut self.view.cycles {
                    cycle.seal();
                }
                self.sealed = true;
                Some(RenderKey::Structure)
            }
            RunEvent::RunStart
            | RunEvent::ChatUser { .. }
            | RunEvent::RunCancel
            | RunEvent::Ping { .. }
            | RunEvent::Hello { .. } => None,
        }
    }

    /// Apply a decoded observer frame; unknown or malformed frames are
    /// dropped and the subscription continues.
    pub fn apply_frame(&mut self, name: &str, payload: &serde_json::Value) -> Option<RenderKey> {
        let event = RunEvent::from_frame(name, payload)?;
        self.apply(&event)
    }
}
