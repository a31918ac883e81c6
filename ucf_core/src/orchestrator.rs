use crate::cancel::CancellationToken;
use crate::config::CampaignConfig;
use crate::error::CampaignError;
use crate::invocation::{FuzzerInvocation, InvocationBuilder};
use crate::launcher::{LaunchOutcome, Launcher};
use crate::readiness::ReadinessGate;
use crate::resume::{CorpusSource, ResetOutcome, ResumePolicy};
use crate::role::{IdentifierPolicy, NodeRole, validate_node_id};
use serde::Serialize;

/// One `ucf fuzz` request.
#[derive(Debug, Clone)]
pub struct FuzzRequest {
    pub node_id: String,
    pub restart: bool,
    pub print_outputs: bool,
}

impl FuzzRequest {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            restart: false,
            print_outputs: false,
        }
    }
}

/// What `fuzz` would do, without doing it.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignPlan {
    pub node_id: String,
    pub role: NodeRole,
    pub corpus: CorpusSource,
    /// Set when a restart would clear the output root.
    pub reset: Option<ResetOutcome>,
    pub invocation: FuzzerInvocation,
}

#[derive(Debug, Clone)]
pub struct FuzzReport {
    pub role: NodeRole,
    pub corpus: CorpusSource,
    pub reset: Option<ResetOutcome>,
    pub outcome: LaunchOutcome,
}

/// Runs one campaign node: role, resume decision, readiness, launch.
pub struct Orchestrator<'a, L: Launcher> {
    config: &'a CampaignConfig,
    launcher: L,
}

impl<'a, L: Launcher> Orchestrator<'a, L> {
    pub fn new(config: &'a CampaignConfig, launcher: L) -> Self {
        Self { config, launcher }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    fn resume_policy(&self) -> ResumePolicy {
        ResumePolicy::new(&self.config.afl_outputs, &self.config.afl_inputs)
    }

    pub fn readiness_gate(&self) -> ReadinessGate {
        ReadinessGate::new(self.config.request_dir())
            .with_poll_interval(self.config.poll_interval)
            .with_timeout(self.config.readiness_timeout)
    }

    fn resolve(&self, node_id: &str) -> Result<NodeRole, CampaignError> {
        validate_node_id(
            node_id,
            IdentifierPolicy::from_strict_flag(self.config.strict_node_ids),
        )?;
        Ok(NodeRole::resolve(node_id))
    }

    fn build_invocation(
        &self,
        role: &NodeRole,
        corpus: &CorpusSource,
        print_outputs: bool,
    ) -> FuzzerInvocation {
        InvocationBuilder::from_config(self.config)
            .role(role.clone())
            .corpus(corpus.clone())
            .print_outputs(print_outputs)
            .build()
    }

    /// Validates and decides like `fuzz`, but never mutates, waits or launches.
    pub fn plan(&self, request: &FuzzRequest) -> Result<CampaignPlan, CampaignError> {
        let role = self.resolve(&request.node_id)?;
        let decision = self
            .resume_policy()
            .preview(&role, &request.node_id, request.restart)?;
        let invocation = self.build_invocation(&role, &decision.corpus, request.print_outputs);

        Ok(CampaignPlan {
            node_id: request.node_id.clone(),
            role,
            corpus: decision.corpus,
            reset: decision.reset,
            invocation,
        })
    }

    /// Blocks until the probe wrapper is up.
    pub fn await_ready(&self, cancel: &CancellationToken) -> Result<(), CampaignError> {
        self.readiness_gate().wait(cancel)?;
        Ok(())
    }

    /// Runs the node end to end. The engine's terminal status is the result.
    pub fn fuzz(
        &mut self,
        request: &FuzzRequest,
        cancel: &CancellationToken,
    ) -> Result<FuzzReport, CampaignError> {
        let role = self.resolve(&request.node_id)?;
        tracing::info!(node_id = %request.node_id, node = role.name(), flag = %role.selection_flag(), "resolved node role");

        let decision = self
            .resume_policy()
            .apply(&role, &request.node_id, request.restart)?;

        self.await_ready(cancel)?;

        let outcome = if cancel.is_cancelled() {
            tracing::info!(node = role.name(), "cancelled before launch");
            LaunchOutcome::Cancelled
        } else {
            let invocation =
                self.build_invocation(&role, &decision.corpus, request.print_outputs);
            self.launcher.launch(&invocation, cancel)?
        };

        Ok(FuzzReport {
            role,
            corpus: decision.corpus,
            reset: decision.reset,
            outcome,
        })
    }
}
