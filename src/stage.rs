//! Run-level state machine.
//!
//! ```text
//! Initializing → Extracting → MaterializingImages → Describing
//!              → Assembling → Writing → Done
//!        (any stage) ─────────────────────────────→ Failed
//! ```
//!
//! The pipeline only ever moves forward. [`StageTracker`] records the current
//! stage so a fatal error can be reported against the stage it happened in.

use serde::Serialize;
use std::fmt;
use tracing::{debug, error};

/// A stage of a single conversion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RunStage {
    Initializing,
    Extracting,
    MaterializingImages,
    Describing,
    Assembling,
    Writing,
    Done,
    Failed,
}

impl RunStage {
    /// `true` for `Done` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStage::Done | RunStage::Failed)
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Initializing => "initialization",
            RunStage::Extracting => "extraction",
            RunStage::MaterializingImages => "image materialization",
            RunStage::Describing => "image description",
            RunStage::Assembling => "assembly",
            RunStage::Writing => "writing",
            RunStage::Done => "done",
            RunStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks forward progress through [`RunStage`]s.
#[derive(Debug)]
pub struct StageTracker {
    current: RunStage,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: RunStage::Initializing,
        }
    }

    pub fn current(&self) -> RunStage {
        self.current
    }

    /// Move to `next`. Backward moves and moves out of a terminal stage are
    /// ignored.
    pub fn advance(&mut self, next: RunStage) {
        if self.current.is_terminal() || next <= self.current {
            return;
        }
        debug!("Run stage: {} → {}", self.current, next);
        self.current = next;
    }

    /// Enter `Failed`, returning the stage that failed.
    pub fn fail(&mut self, reason: &dyn fmt::Display) -> RunStage {
        let failed_in = self.current;
        if !self.current.is_terminal() {
            error!("Run failed during {}: {}", failed_in, reason);
            self.current = RunStage::Failed;
        }
        failed_in
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_forward_only() {
        let mut t = StageTracker::new();
        t.advance(RunStage::Extracting);
        t.advance(RunStage::Describing);
        t.advance(RunStage::Extracting);
        assert_eq!(t.current(), RunStage::Describing);
    }

    #[test]
    fn fail_reports_stage_and_is_terminal() {
        let mut t = StageTracker::new();
        t.advance(RunStage::Writing);
        assert_eq!(t.fail(&"disk full"), RunStage::Writing);
        assert_eq!(t.current(), RunStage::Failed);

        t.advance(RunStage::Done);
        assert_eq!(t.current(), RunStage::Failed);
    }

    #[test]
    fn display_names() {
        assert_eq!(RunStage::MaterializingImages.to_string(), "image materialization");
        assert_eq!(RunStage::Extracting.to_string(), "extraction");
    }
}
