//! Pipeline state machine and terminal result.

use serde::{Deserialize, Serialize};

/// Stages of the create flow, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Requested,
    Streaming,
    Assembled,
    Extracted,
    Publishing,
    Done,
}

impl PipelineStage {
    /// Get the display name for this stage
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Streaming => "streaming",
            Self::Assembled => "assembled",
            Self::Extracted => "extracted",
            Self::Publishing => "publishing",
            Self::Done => "done",
        }
    }

    /// The stage that follows this one on the success path
    pub fn next(&self) -> Option<PipelineStage> {
        match self {
            Self::Requested => Some(Self::Streaming),
            Self::Streaming => Some(Self::Assembled),
            Self::Assembled => Some(Self::Extracted),
            Self::Extracted => Some(Self::Publishing),
            Self::Publishing => Some(Self::Done),
            Self::Done => None,
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Current state of one create run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Active(PipelineStage),
    /// Absorbing failure state, remembering where it happened
    Failed(PipelineStage),
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::Active(PipelineStage::Requested)
    }
}

impl PipelineState {
    /// Advance along the success path.
    ///
    /// Failed and Done states are absorbing; advancing them is a no-op.
    pub fn advance(&mut self) -> PipelineStage {
        if let Self::Active(stage) = *self {
            if let Some(next) = stage.next() {
                *self = Self::Active(next);
                return next;
            }
        }
        self.stage()
    }

    /// Move to FAILED at the current stage
    pub fn fail(&mut self) -> PipelineStage {
        let stage = self.stage();
        *self = Self::Failed(stage);
        stage
    }

    pub fn stage(&self) -> PipelineStage {
        match *self {
            Self::Active(stage) | Self::Failed(stage) => stage,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Active(PipelineStage::Done))
    }
}

/// The single terminal result of a create request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub success: bool,
    pub project_name: String,
    pub repository_name: String,
    pub user_name: String,
    /// DONE on success, otherwise the stage that failed
    pub stage: PipelineStage,
    /// Human-readable outcome
    pub message: String,
    /// Machine-readable detail, empty on success
    pub error: String,
}
