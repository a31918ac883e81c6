use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name of the AFL++ checkout inside the unicorefuzz installation.
pub const AFL_DIR_NAME: &str = "AFLplusplus";
/// Created by the probe wrapper once it is attached; harness page requests go here.
pub const REQUEST_DIR_NAME: &str = "requests";
/// Captured pages and registers, written by the probe wrapper.
pub const STATE_DIR_NAME: &str = "state";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct HarnessSettings {
    /// Interpreter or wrapper placed in front of the entry point, e.g. `["python3"]`.
    #[serde(default)]
    pub launcher: Vec<String>,
    pub entry: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ReadinessSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    pub timeout_secs: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct LaunchSettings {
    #[serde(default = "default_trial_timeout_ms")]
    pub trial_timeout_ms: u64,
    #[serde(default = "default_compcov_level")]
    pub compcov_level: u8,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

pub fn default_trial_timeout_ms() -> u64 {
    4000
}

pub fn default_compcov_level() -> u8 {
    2
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            trial_timeout_ms: default_trial_timeout_ms(),
            compcov_level: default_compcov_level(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

/// The config file as written by the operator. Paths may be relative to the file.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub unicore_path: PathBuf,
    pub workdir: Option<PathBuf>,
    pub afl_path: Option<PathBuf>,
    pub afl_inputs: PathBuf,
    pub afl_outputs: Option<PathBuf>,
    pub afl_dict: Option<PathBuf>,
    #[serde(default)]
    pub strict_node_ids: bool,
    #[serde(default)]
    pub harness: HarnessSettings,
    #[serde(default)]
    pub readiness: ReadinessSettings,
    #[serde(default)]
    pub launch: LaunchSettings,
}

/// Validated campaign configuration. Every path is absolute.
#[derive(Debug, Clone)]
pub struct CampaignConfig {
    pub unicore_path: PathBuf,
    pub workdir: PathBuf,
    pub afl_path: PathBuf,
    pub afl_inputs: PathBuf,
    pub afl_outputs: PathBuf,
    pub afl_dict: Option<PathBuf>,
    pub strict_node_ids: bool,
    pub harness_launcher: Vec<String>,
    pub harness_entry: PathBuf,
    pub poll_interval: Duration,
    pub readiness_timeout: Option<Duration>,
    pub trial_timeout: Duration,
    pub compcov_level: u8,
    pub shutdown_grace: Duration,
}

impl CampaignConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let file: ConfigFile = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        let base_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let base_dir = std::path::absolute(&base_dir).map_err(|e| {
            anyhow::anyhow!("Failed to resolve config directory {:?}: {}", base_dir, e)
        })?;

        Self::from_file(file, &base_dir)
    }

    /// Applies defaults and resolves relative paths against `base_dir`.
    pub fn from_file(file: ConfigFile, base_dir: &Path) -> Result<Self, anyhow::Error> {
        if file.launch.trial_timeout_ms == 0 {
            anyhow::bail!("launch.trial-timeout-ms must be greater than zero");
        }
        if file.readiness.poll_interval_ms == 0 {
            anyhow::bail!("readiness.poll-interval-ms must be greater than zero");
        }
        if file.harness.launcher.iter().any(|part| part.trim().is_empty()) {
            anyhow::bail!("harness.launcher must not contain empty entries");
        }

        let unicore_path = resolve(base_dir, &file.unicore_path);
        let afl_path = match &file.afl_path {
            Some(p) => resolve(base_dir, p),
            None => unicore_path.join(AFL_DIR_NAME),
        };
        let afl_outputs = match &file.afl_outputs {
            Some(p) => resolve(base_dir, p),
            None => unicore_path.join("afl_output"),
        };
        let workdir = match &file.workdir {
            Some(p) => resolve(base_dir, p),
            None => base_dir.join("unicore_workdir"),
        };
        let harness_entry = match &file.harness.entry {
            Some(p) => resolve(base_dir, p),
            None => unicore_path.join("ucf"),
        };

        Ok(Self {
            afl_inputs: resolve(base_dir, &file.afl_inputs),
            afl_dict: file.afl_dict.as_deref().map(|p| resolve(base_dir, p)),
            unicore_path,
            workdir,
            afl_path,
            afl_outputs,
            strict_node_ids: file.strict_node_ids,
            harness_launcher: file.harness.launcher,
            harness_entry,
            poll_interval: Duration::from_millis(file.readiness.poll_interval_ms),
            readiness_timeout: file.readiness.timeout_secs.map(Duration::from_secs),
            trial_timeout: Duration::from_millis(file.launch.trial_timeout_ms),
            compcov_level: file.launch.compcov_level,
            shutdown_grace: Duration::from_millis(file.launch.shutdown_grace_ms),
        })
    }

    /// The readiness sentinel: exists once the probe wrapper is serving requests.
    pub fn request_dir(&self) -> PathBuf {
        self.workdir.join(REQUEST_DIR_NAME)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.workdir.join(STATE_DIR_NAME)
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Annotated template printed by `ucf spec`.
pub const CONFIG_TEMPLATE: &str = r#"# Config options for ucf.
# Keys marked [Optional] fall back to the shown default when left out.
# Relative paths are resolved against the directory of this file.

# Installation root of unicorefuzz.
unicore-path = "/opt/unicorefuzz"

# The seed directory to use for fuzzing.
afl-inputs = "afl_inputs"

# [Optional] AFL output directory. Default: <unicore-path>/afl_output
# afl-outputs = "afl_outputs"

# [Optional] AFL dictionary to use for fuzzing.
# afl-dict = "dict.txt"

# [Optional] Directory of the AFL++ build. Default: <unicore-path>/AFLplusplus
# afl-path = "/opt/unicorefuzz/AFLplusplus"

# [Optional] Work directory shared with the probe wrapper. Default: unicore_workdir next to this file
# workdir = "unicore_workdir"

# [Optional] Reject node ids that are not decimal numbers. Default: false
# strict-node-ids = false

[harness]
# [Optional] Interpreter in front of the harness entry point. Default: []
# launcher = ["python3"]
# [Optional] Harness entry point, invoked as `<entry> emu @@`. Default: <unicore-path>/ucf
# entry = "/opt/unicorefuzz/ucf"

[readiness]
# [Optional] How often to look for the probe wrapper. Default: 500
# poll-interval-ms = 500
# [Optional] Give up waiting after this many seconds. Default: wait forever
# timeout-secs = 600

[launch]
# [Optional] Per-trial timeout handed to afl-fuzz (auto-extended). Default: 4000
# trial-timeout-ms = 4000
# [Optional] AFL_COMPCOV_LEVEL for unicorn mode. Default: 2
# compcov-level = 2
# [Optional] Time afl-fuzz gets to shut down after Ctrl-C before it is killed. Default: 5000
# shutdown-grace-ms = 5000
"#;
