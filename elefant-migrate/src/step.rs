use std::fmt::{Display, Formatter};
use async_trait::async_trait;
use crate::capabilities::MigrationContext;
use crate::{MigrationVersion, Result};

/// A single versioned, forward-only schema change.
///
/// `up` must be idempotent: running it against a schema it has already been applied to must not
/// change anything.
#[async_trait]
pub trait MigrationStep: Send + Sync {
    fn version(&self) -> MigrationVersion;

    fn description(&self) -> &str {
        ""
    }

    async fn up(&self, context: &dyn MigrationContext) -> Result;
}

/// Where a step is in its lifecycle during a run.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl StepState {
    /// Moves to `next` if that is a legal transition. Finished steps never move again.
    pub fn transition(self, next: StepState) -> Option<StepState> {
        match (self, next) {
            (StepState::Pending, StepState::Running) => Some(next),
            (StepState::Running, StepState::Succeeded | StepState::Failed) => Some(next),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, StepState::Succeeded | StepState::Failed)
    }
}

impl Display for StepState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepState::Pending => "pending",
            StepState::Running => "running",
            StepState::Succeeded => "succeeded",
            StepState::Failed => "failed",
        };
        f.write_str(s)
    }
}
