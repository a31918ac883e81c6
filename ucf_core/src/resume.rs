use crate::error::ValidationError;
use crate::role::NodeRole;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Passed to afl-fuzz as `-i` to resume from the node's own queue.
pub const RESUME_SENTINEL: &str = "-";

/// Where a node takes its inputs from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "kebab-case")]
pub enum CorpusSource {
    /// Start from the configured seed directory.
    Fresh(PathBuf),
    /// Continue from the queue afl-fuzz persisted in a previous run.
    Resume,
}

impl CorpusSource {
    /// The value handed to afl-fuzz `-i`.
    pub fn as_arg(&self) -> String {
        match self {
            CorpusSource::Fresh(path) => path.to_string_lossy().into_owned(),
            CorpusSource::Resume => RESUME_SENTINEL.to_string(),
        }
    }
}

/// What happened to the output root during a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResetOutcome {
    Removed,
    NotFound,
    /// Deletion failed for a reason other than absence. The run continues.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeDecision {
    pub corpus: CorpusSource,
    /// `Some` only when a restart was requested.
    pub reset: Option<ResetOutcome>,
}

/// Decides between a fresh start and resuming, based on the shared output root.
#[derive(Debug, Clone)]
pub struct ResumePolicy {
    output_root: PathBuf,
    fresh_corpus: PathBuf,
}

impl ResumePolicy {
    pub fn new(output_root: impl Into<PathBuf>, fresh_corpus: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            fresh_corpus: fresh_corpus.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Secondaries may never wipe shared campaign state. Touches nothing on disk.
    pub fn check_restart(role: &NodeRole, node_id: &str, restart: bool) -> Result<(), ValidationError> {
        if restart && !role.is_master() {
            return Err(ValidationError::RestartRequiresMaster {
                node_id: node_id.to_string(),
            });
        }
        Ok(())
    }

    /// Best-effort removal of the whole output root.
    pub fn reset_campaign_state(&self) -> ResetOutcome {
        match std::fs::remove_dir_all(&self.output_root) {
            Ok(()) => {
                tracing::info!(output_root = %self.output_root.display(), "removed previous campaign outputs");
                ResetOutcome::Removed
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(output_root = %self.output_root.display(), "no previous campaign outputs to remove");
                ResetOutcome::NotFound
            }
            Err(e) => {
                tracing::warn!(
                    output_root = %self.output_root.display(),
                    error = %e,
                    "could not remove previous campaign outputs, continuing"
                );
                ResetOutcome::Failed(e.to_string())
            }
        }
    }

    /// `Resume` if `output_root/<node_name>` already exists, else the fresh corpus.
    pub fn corpus_source(&self, node_name: &str) -> CorpusSource {
        if self.output_root.join(node_name).is_dir() {
            CorpusSource::Resume
        } else {
            CorpusSource::Fresh(self.fresh_corpus.clone())
        }
    }

    /// Validate, optionally reset, then decide. Not atomic with the later launch.
    pub fn apply(
        &self,
        role: &NodeRole,
        node_id: &str,
        restart: bool,
    ) -> Result<ResumeDecision, ValidationError> {
        Self::check_restart(role, node_id, restart)?;

        let reset = restart.then(|| self.reset_campaign_state());
        let corpus = self.corpus_source(role.name());
        match &corpus {
            CorpusSource::Resume => {
                tracing::info!(node = role.name(), "found previous output, resuming queue")
            }
            CorpusSource::Fresh(path) => {
                tracing::info!(node = role.name(), inputs = %path.display(), "starting from fresh corpus")
            }
        }
        Ok(ResumeDecision { corpus, reset })
    }

    /// Like `apply`, but predicts the outcome without touching the disk.
    pub fn preview(
        &self,
        role: &NodeRole,
        node_id: &str,
        restart: bool,
    ) -> Result<ResumeDecision, ValidationError> {
        Self::check_restart(role, node_id, restart)?;

        if restart {
            let reset = if self.output_root.exists() {
                ResetOutcome::Removed
            } else {
                ResetOutcome::NotFound
            };
            return Ok(ResumeDecision {
                corpus: CorpusSource::Fresh(self.fresh_corpus.clone()),
                reset: Some(reset),
            });
        }
        Ok(ResumeDecision {
            corpus: self.corpus_source(role.name()),
            reset: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn policy_in(dir: &Path) -> ResumePolicy {
        ResumePolicy::new(dir.join("afl_output"), dir.join("afl_inputs"))
    }

    #[test]
    fn fresh_corpus_when_no_prior_output() {
        let dir = tempdir().unwrap();
        let policy = policy_in(dir.path());
        let decision = policy.apply(&NodeRole::Master, "0", false).unwrap();
        assert_eq!(
            decision.corpus,
            CorpusSource::Fresh(dir.path().join("afl_inputs"))
        );
        assert_eq!(decision.reset, None);
    }

    #[test]
    fn resumes_when_node_directory_exists() {
        let dir = tempdir().unwrap();
        let policy = policy_in(dir.path());
        fs::create_dir_all(dir.path().join("afl_output/fuzzer3")).unwrap();

        let role = NodeRole::resolve("3");
        let decision = policy.apply(&role, "3", false).unwrap();
        assert_eq!(decision.corpus, CorpusSource::Resume);
        assert_eq!(decision.corpus.as_arg(), "-");
    }

    #[test]
    fn other_nodes_output_does_not_trigger_resume() {
        let dir = tempdir().unwrap();
        let policy = policy_in(dir.path());
        fs::create_dir_all(dir.path().join("afl_output/master")).unwrap();

        let decision = policy.apply(&NodeRole::resolve("1"), "1", false).unwrap();
        assert!(matches!(decision.corpus, CorpusSource::Fresh(_)));
    }

    #[test]
    fn plain_file_named_like_node_is_not_resumed() {
        let dir = tempdir().unwrap();
        let policy = policy_in(dir.path());
        fs::create_dir_all(dir.path().join("afl_output")).unwrap();
        fs::write(dir.path().join("afl_output/master"), b"").unwrap();

        assert!(matches!(
            policy.corpus_source("master"),
            CorpusSource::Fresh(_)
        ));
    }

    #[test]
    fn secondary_restart_is_rejected_without_touching_disk() {
        let dir = tempdir().unwrap();
        let policy = policy_in(dir.path());
        let node_dir = dir.path().join("afl_output/fuzzer5");
        fs::create_dir_all(&node_dir).unwrap();

        let err = policy
            .apply(&NodeRole::resolve("5"), "5", true)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::RestartRequiresMaster {
                node_id: "5".to_string()
            }
        );
        assert!(node_dir.is_dir());
        assert!(err.to_string().contains("Only the master"));
    }

    #[test]
    fn master_restart_removes_output_root_and_starts_fresh() {
        let dir = tempdir().unwrap();
        let policy = policy_in(dir.path());
        fs::create_dir_all(dir.path().join("afl_output/master/queue")).unwrap();
        fs::create_dir_all(dir.path().join("afl_output/fuzzer1")).unwrap();

        let decision = policy.apply(&NodeRole::Master, "0", true).unwrap();
        assert_eq!(decision.reset, Some(ResetOutcome::Removed));
        assert!(!dir.path().join("afl_output").exists());
        assert_eq!(
            decision.corpus,
            CorpusSource::Fresh(dir.path().join("afl_inputs"))
        );
    }

    #[test]
    fn master_restart_without_outputs_is_not_an_error() {
        let dir = tempdir().unwrap();
        let policy = policy_in(dir.path());
        let decision = policy.apply(&NodeRole::Master, "0", true).unwrap();
        assert_eq!(decision.reset, Some(ResetOutcome::NotFound));
    }

    #[test]
    fn failed_reset_is_reported_not_fatal() {
        let dir = tempdir().unwrap();
        // A regular file where the output root should be makes remove_dir_all fail.
        let root = dir.path().join("afl_output");
        fs::write(&root, b"not a directory").unwrap();
        let policy = ResumePolicy::new(&root, dir.path().join("afl_inputs"));

        let decision = policy.apply(&NodeRole::Master, "0", true).unwrap();
        assert!(matches!(decision.reset, Some(ResetOutcome::Failed(_))));
        assert!(matches!(decision.corpus, CorpusSource::Fresh(_)));
    }

    #[test]
    fn preview_predicts_without_mutation() {
        let dir = tempdir().unwrap();
        let policy = policy_in(dir.path());
        fs::create_dir_all(dir.path().join("afl_output/master")).unwrap();

        let plain = policy.preview(&NodeRole::Master, "0", false).unwrap();
        assert_eq!(plain.corpus, CorpusSource::Resume);

        let restart = policy.preview(&NodeRole::Master, "0", true).unwrap();
        assert_eq!(restart.reset, Some(ResetOutcome::Removed));
        assert!(matches!(restart.corpus, CorpusSource::Fresh(_)));
        assert!(dir.path().join("afl_output/master").is_dir());

        assert!(policy.preview(&NodeRole::resolve("2"), "2", true).is_err());
    }
}
