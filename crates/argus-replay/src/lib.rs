//! argus-replay: structured views of a run, live and post-hoc
//!
//! The [`reconciler::CycleReconciler`] folds a live event sequence into a
//! [`view::RunView`]; [`replay::build_view`] rebuilds the same view from the
//! persisted transcript once the run is over. The two meet at
//! [`view::RunView::normalized`], the observational projection the
//! equivalence law is stated in. [`coalesce::RenderCoalescer`] keeps
//! high-frequency deltas from triggering a re-render per token.

#![forbid(unsafe_code)]

pub mod coalesce;
pub mod reconciler;
pub mod replay;
pub mod view;

pub use coalesce::RenderCoalescer;
pub use reconciler::{CycleReconciler, RenderKey};
pub use replay::build_view;
pub use view::{Cycle, CyclePhase, RunView, ToolInvocation, ToolState};
