use crate::launcher::LaunchError;
use crate::readiness::ReadinessError;
use thiserror::Error;

/// A request that breaks a campaign invariant. Raised before anything on disk is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Only the master may wipe the shared output directory.
    #[error("Only the master (`--id 0`) may restart the campaign, got node id {node_id:?}")]
    RestartRequiresMaster { node_id: String },

    #[error("Node id {node_id:?} is not a decimal number (strict-node-ids is enabled)")]
    MalformedNodeId { node_id: String },
}

/// Everything that can end a `fuzz` or `await` run.
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Probe wrapper never became ready: {0}")]
    Readiness(#[from] ReadinessError),

    #[error("Fuzzer launch failed: {0}")]
    Launch(#[from] LaunchError),
}

impl CampaignError {
    /// Exit code the engine itself terminated with, if that is why the run failed.
    pub fn engine_exit_code(&self) -> Option<i32> {
        match self {
            CampaignError::Launch(LaunchError::Exited { code, .. }) => *code,
            _ => None,
        }
    }
}
