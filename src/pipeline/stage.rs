use std::fmt;
use tracing::debug;

/// Where a pipeline run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Idle,
    Dispatching,
    Settling,
    Collecting,
    Synthesizing,
    Sending,
    Persisting,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Dispatching => "dispatching",
            PipelineStage::Settling => "settling",
            PipelineStage::Collecting => "collecting",
            PipelineStage::Synthesizing => "synthesizing",
            PipelineStage::Sending => "sending",
            PipelineStage::Persisting => "persisting",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Forward-only stage log for one run or one generation task.
#[derive(Debug)]
pub struct StageTracker {
    scope: String,
    stage: PipelineStage,
    history: Vec<PipelineStage>,
}

impl StageTracker {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            stage: PipelineStage::Idle,
            history: vec![PipelineStage::Idle],
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn history(&self) -> &[PipelineStage] {
        &self.history
    }

    /// Moves to `next`. Backward moves and moves out of a terminal stage are ignored.
    pub fn advance(&mut self, next: PipelineStage) {
        if self.stage.is_terminal() || next <= self.stage {
            debug!(
                "[{}] ignoring stage change {} -> {}",
                self.scope, self.stage, next
            );
            return;
        }
        debug!("[{}] {} -> {}", self.scope, self.stage, next);
        self.stage = next;
        self.history.push(next);
    }
}
