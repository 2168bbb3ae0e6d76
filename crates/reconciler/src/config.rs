//! Pass-level configuration.

/// Child reconciler knobs.
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// Report siblings that share an explicit key.
    pub warn_on_duplicate_keys: bool,
    /// Report list items that carry no explicit key.
    pub warn_on_missing_keys: bool,
    /// Diagnostics beyond this count are dropped (still logged).
    pub max_diagnostics: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            warn_on_duplicate_keys: true,
            warn_on_missing_keys: false,
            max_diagnostics: 256,
        }
    }
}

/// How far the hydration cursor may look past a mismatching markup node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MismatchRetry {
    /// Retry exactly once against the following markup sibling.
    #[default]
    NextSibling,
    /// Fall back to insertion on the first mismatch.
    Off,
}

#[derive(Clone, Debug, Default)]
pub struct HydrationConfig {
    /// Escalate any mismatch to a `ReconcileError` instead of recovering.
    pub strict: bool,
    pub retry: MismatchRetry,
}
