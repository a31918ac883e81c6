use crate::config::{CampaignConfig, default_compcov_level, default_trial_timeout_ms};
use crate::resume::CorpusSource;
use crate::role::NodeRole;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const AFL_FUZZ_BINARY: &str = "afl-fuzz";
pub const COMPCOV_LEVEL_VAR: &str = "AFL_COMPCOV_LEVEL";
pub const DEBUG_CHILD_OUTPUT_VAR: &str = "AFL_DEBUG_CHILD_OUTPUT";
/// afl-fuzz replaces this with the path of the current test case.
pub const INPUT_PLACEHOLDER: &str = "@@";
const HARNESS_SUBCOMMAND: &str = "emu";

/// A fully specified afl-fuzz command. Building one runs nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuzzerInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Prepended to the inherited `PATH` when the command is launched.
    pub search_path_prefix: PathBuf,
}

impl FuzzerInvocation {
    /// The `PATH` value for the child: the prefix, then whatever was inherited.
    pub fn search_path(&self, inherited: Option<OsString>) -> Result<OsString, std::env::JoinPathsError> {
        let mut paths = vec![self.search_path_prefix.clone()];
        if let Some(inherited) = inherited {
            paths.extend(std::env::split_paths(&inherited));
        }
        std::env::join_paths(paths)
    }

    /// Shell-style rendering for logs. Not meant to be executed.
    pub fn command_line(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        parts.push(self.program.display().to_string());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// The command afl-fuzz runs once per trial, minus the input placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessCommand {
    pub launcher: Vec<String>,
    pub entry: PathBuf,
}

impl HarnessCommand {
    fn argv(&self) -> Vec<String> {
        let mut argv = self.launcher.clone();
        argv.push(self.entry.to_string_lossy().into_owned());
        argv.push(HARNESS_SUBCOMMAND.to_string());
        argv.push(INPUT_PLACEHOLDER.to_string());
        argv
    }
}

#[derive(Debug, Clone)]
pub struct InvocationBuilder {
    afl_path: PathBuf,
    harness: HarnessCommand,
    role: NodeRole,
    corpus: CorpusSource,
    output_root: PathBuf,
    dictionary: Option<PathBuf>,
    trial_timeout: Duration,
    compcov_level: u8,
    print_outputs: bool,
}

impl InvocationBuilder {
    pub fn new(afl_path: impl Into<PathBuf>, harness: HarnessCommand) -> Self {
        Self {
            afl_path: afl_path.into(),
            harness,
            role: NodeRole::Master,
            corpus: CorpusSource::Resume,
            output_root: PathBuf::new(),
            dictionary: None,
            trial_timeout: Duration::from_millis(default_trial_timeout_ms()),
            compcov_level: default_compcov_level(),
            print_outputs: false,
        }
    }

    /// Seeds everything the config decides; role and corpus still need setting.
    pub fn from_config(config: &CampaignConfig) -> Self {
        Self::new(
            &config.afl_path,
            HarnessCommand {
                launcher: config.harness_launcher.clone(),
                entry: config.harness_entry.clone(),
            },
        )
        .output_root(&config.afl_outputs)
        .dictionary(config.afl_dict.as_deref())
        .trial_timeout(config.trial_timeout)
        .compcov_level(config.compcov_level)
    }

    pub fn role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    pub fn corpus(mut self, corpus: CorpusSource) -> Self {
        self.corpus = corpus;
        self
    }

    pub fn output_root(mut self, output_root: impl Into<PathBuf>) -> Self {
        self.output_root = output_root.into();
        self
    }

    pub fn dictionary(mut self, dictionary: Option<&Path>) -> Self {
        self.dictionary = dictionary.map(Path::to_path_buf);
        self
    }

    pub fn trial_timeout(mut self, trial_timeout: Duration) -> Self {
        self.trial_timeout = trial_timeout;
        self
    }

    pub fn compcov_level(mut self, level: u8) -> Self {
        self.compcov_level = level;
        self
    }

    /// Let the harness write to the terminal instead of afl-fuzz swallowing it.
    pub fn print_outputs(mut self, print_outputs: bool) -> Self {
        self.print_outputs = print_outputs;
        self
    }

    pub fn build(&self) -> FuzzerInvocation {
        let mut env = BTreeMap::new();
        env.insert(COMPCOV_LEVEL_VAR.to_string(), self.compcov_level.to_string());
        if self.print_outputs {
            env.insert(DEBUG_CHILD_OUTPUT_VAR.to_string(), "1".to_string());
        }

        let mut args: Vec<String> = vec![
            "-U".into(),
            "-m".into(),
            "none".into(),
            "-i".into(),
            self.corpus.as_arg(),
            "-o".into(),
            self.output_root.to_string_lossy().into_owned(),
            "-t".into(),
            format!("{}+", self.trial_timeout.as_millis()),
        ];
        args.extend(self.role.selection_args().iter().map(|s| s.to_string()));
        if let Some(dictionary) = &self.dictionary {
            args.push("-x".into());
            args.push(dictionary.to_string_lossy().into_owned());
        }
        args.push("--".into());
        args.extend(self.harness.argv());

        FuzzerInvocation {
            program: self.afl_path.join(AFL_FUZZ_BINARY),
            args,
            env,
            search_path_prefix: self.afl_path.clone(),
        }
    }
}
