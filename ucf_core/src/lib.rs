pub mod cancel;
pub mod config;
pub mod error;
pub mod invocation;
pub mod launcher;
pub mod orchestrator;
pub mod readiness;
pub mod resume;
pub mod role;

pub use cancel::CancellationToken;
pub use config::CampaignConfig;
pub use error::{CampaignError, ValidationError};
pub use invocation::{FuzzerInvocation, HarnessCommand, InvocationBuilder};
pub use launcher::{LaunchError, LaunchOutcome, Launcher, ProcessLauncher};
pub use orchestrator::{CampaignPlan, FuzzReport, FuzzRequest, Orchestrator};
pub use readiness::{ReadinessError, ReadinessGate};
pub use resume::{CorpusSource, ResetOutcome, ResumeDecision, ResumePolicy};
pub use role::{IdentifierPolicy, NodeRole};
