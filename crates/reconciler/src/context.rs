//! Per-pass state threaded through every reconciler call.
//!
//! Nothing here is process-wide: two passes over different roots each own a
//! `PassContext`, and abandoning a pass only needs `abandon()`.

use crate::config::ReconcilerConfig;
use crate::error::Diagnostic;
use crate::thenable::ThenableState;
use crate::types::{Child, ContextId, ContextRead};
use core_types::Lanes;
use std::rc::Rc;

/// Instrumentation counters for one pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub nodes_created: u64,
    pub nodes_reused: u64,
    pub placements: u64,
    pub deletions: u64,
    pub suspensions: u64,
    pub updates_applied: u64,
    pub updates_skipped: u64,
}

#[derive(Debug)]
pub struct PassContext {
    pub config: ReconcilerConfig,
    render_lanes: Lanes,
    root_render_lanes: Lanes,
    pub(crate) thenables: ThenableState,
    providers: Vec<(ContextId, Rc<Child>)>,
    diagnostics: Vec<Diagnostic>,
    counters: Counters,
    skipped_lanes: Lanes,
}

impl PassContext {
    pub fn new(render_lanes: Lanes) -> Self {
        Self::with_config(ReconcilerConfig::default(), render_lanes)
    }

    pub fn with_config(config: ReconcilerConfig, render_lanes: Lanes) -> Self {
        Self {
            config,
            render_lanes,
            root_render_lanes: render_lanes,
            thenables: ThenableState::default(),
            providers: Vec::new(),
            diagnostics: Vec::new(),
            counters: Counters::default(),
            skipped_lanes: Lanes::NONE,
        }
    }

    pub fn render_lanes(&self) -> Lanes {
        self.render_lanes
    }

    /// Lanes of the whole root pass. Hidden subtrees render with a narrower
    /// `render_lanes` but judge their updates against these.
    pub fn root_render_lanes(&self) -> Lanes {
        self.root_render_lanes
    }

    pub fn set_render_lanes(&mut self, lanes: Lanes) {
        self.render_lanes = lanes;
    }

    pub fn push_provider(&mut self, context: ContextId, value: impl Into<Child>) {
        self.providers.push((context, Rc::new(value.into())));
    }

    pub fn pop_provider(&mut self, context: ContextId) -> Option<Rc<Child>> {
        let position = self.providers.iter().rposition(|(id, _)| *id == context)?;
        let (_, value) = self.providers.remove(position);
        Some(value)
    }

    /// Innermost provided value for the context, or its default.
    pub fn read_context(&self, read: &ContextRead) -> Rc<Child> {
        self.providers
            .iter()
            .rev()
            .find(|(id, _)| *id == read.context)
            .map(|(_, value)| Rc::clone(value))
            .unwrap_or_else(|| Rc::clone(&read.default))
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        log::warn!(target: "reconciler.children", "{diagnostic}");
        if self.diagnostics.len() < self.config.max_diagnostics {
            self.diagnostics.push(diagnostic);
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub(crate) fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    pub fn mark_skipped(&mut self, lanes: Lanes) {
        self.skipped_lanes |= lanes;
    }

    /// Lanes left unprocessed by update queues during this pass.
    pub fn skipped_lanes(&self) -> Lanes {
        self.skipped_lanes
    }

    /// Number of deferred values tracked by the attempt in flight.
    pub fn tracked_deferreds(&self) -> usize {
        self.thenables.tracked_len()
    }

    /// Drops all per-pass state. The committed tree is not affected.
    pub fn abandon(&mut self) {
        log::debug!(target: "reconciler.tree", "pass abandoned at lanes {:?}", self.render_lanes);
        self.reset();
    }

    /// Ends the pass and returns its counters.
    pub fn finish(&mut self) -> Counters {
        let counters = std::mem::take(&mut self.counters);
        #[cfg(any(test, feature = "debug-stats"))]
        log::debug!(
            target: "reconciler.tree",
            "pass done: created={} reused={} placements={} deletions={} suspensions={} applied={} skipped={}",
            counters.nodes_created,
            counters.nodes_reused,
            counters.placements,
            counters.deletions,
            counters.suspensions,
            counters.updates_applied,
            counters.updates_skipped
        );
        self.reset();
        counters
    }

    fn reset(&mut self) {
        self.thenables.clear();
        self.providers.clear();
        self.counters = Counters::default();
        self.skipped_lanes = Lanes::NONE;
        self.root_render_lanes = self.render_lanes;
    }
}
