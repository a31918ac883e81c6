use ucf_core::config::CONFIG_TEMPLATE;
use ucf_core::{
    CampaignConfig, CampaignError, CancellationToken, FuzzRequest, LaunchOutcome, Orchestrator,
    ProcessLauncher, ReadinessError,
};

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Exit status used when the operator interrupts a node.
const EXIT_INTERRUPTED: u8 = 130;
const EXIT_FAILURE: u8 = 1;
const LOG_ENV: &str = "UCF_LOG";

#[derive(Parser, Debug)]
#[clap(author, version, about = "Orchestrates unicorn-mode AFL++ campaigns against captured kernel state", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start or resume one campaign node under afl-fuzz
    Fuzz {
        /// Path to the campaign config
        #[clap(value_parser, default_value = "config.toml")]
        config: PathBuf,
        /// Node id: 0 is the master, anything else a secondary
        #[clap(short, long, default_value = "0")]
        id: String,
        /// Wipe all previous campaign outputs first (master only)
        #[clap(short, long)]
        restart: bool,
        /// Show harness output instead of letting afl-fuzz swallow it
        #[clap(short = 'P', long)]
        print_outputs: bool,
        /// Print what would be launched as JSON and exit
        #[clap(long)]
        dry_run: bool,
    },
    /// Block until the probe wrapper is available
    Await {
        #[clap(value_parser, default_value = "config.toml")]
        config: PathBuf,
        /// Give up after this many seconds instead of waiting forever
        #[clap(long)]
        timeout_secs: Option<u64>,
    },
    /// Print the AFL++ directory the config resolves to
    AflPath {
        #[clap(value_parser, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print an annotated config template
    Spec,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Result<CampaignConfig, anyhow::Error> {
    tracing::debug!(path = %path.display(), "loading configuration");
    CampaignConfig::load_from_file(path)
}

/// Cancels the token on Ctrl-C. afl-fuzz sees the same SIGINT and gets to exit cleanly.
fn install_interrupt_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        tracing::warn!(error = %e, "could not install Ctrl-C handler");
    }
    token
}

fn run(cli: Cli) -> Result<ExitCode, anyhow::Error> {
    match cli.command {
        Commands::Fuzz {
            config,
            id,
            restart,
            print_outputs,
            dry_run,
        } => {
            let config = load_config(&config)?;
            let request = FuzzRequest {
                node_id: id,
                restart,
                print_outputs,
            };
            let mut orchestrator =
                Orchestrator::new(&config, ProcessLauncher::new(config.shutdown_grace));

            if dry_run {
                let plan = orchestrator.plan(&request)?;
                println!("{}", serde_json::to_string_pretty(&plan)?);
                return Ok(ExitCode::SUCCESS);
            }

            let cancel = install_interrupt_handler();
            let report = orchestrator.fuzz(&request, &cancel)?;
            match report.outcome {
                LaunchOutcome::Completed => {
                    tracing::info!(node = report.role.name(), "afl-fuzz finished");
                    Ok(ExitCode::SUCCESS)
                }
                LaunchOutcome::Cancelled => {
                    tracing::info!(node = report.role.name(), "node interrupted");
                    Ok(ExitCode::from(EXIT_INTERRUPTED))
                }
            }
        }
        Commands::Await {
            config,
            timeout_secs,
        } => {
            let mut config = load_config(&config)?;
            if let Some(secs) = timeout_secs {
                config.readiness_timeout = Some(Duration::from_secs(secs));
            }
            let orchestrator = Orchestrator::new(&config, ProcessLauncher::default());
            orchestrator.await_ready(&install_interrupt_handler())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::AflPath { config } => {
            let config = load_config(&config)?;
            println!("{}", config.afl_path.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Spec => {
            print!("{CONFIG_TEMPLATE}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Mirrors the engine's own exit code where there is one.
fn exit_status_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<CampaignError>() {
        Some(CampaignError::Readiness(ReadinessError::Cancelled(_))) => EXIT_INTERRUPTED,
        Some(campaign_err) => campaign_err
            .engine_exit_code()
            .and_then(|code| u8::try_from(code).ok())
            .filter(|code| *code != 0)
            .unwrap_or(EXIT_FAILURE),
        None => EXIT_FAILURE,
    }
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_status_for(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use ucf_core::{LaunchError, ValidationError};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fuzz_defaults() {
        let cli = Cli::try_parse_from(["ucf", "fuzz"]).unwrap();
        match cli.command {
            Commands::Fuzz {
                config,
                id,
                restart,
                print_outputs,
                dry_run,
            } => {
                assert_eq!(config, PathBuf::from("config.toml"));
                assert_eq!(id, "0");
                assert!(!restart && !print_outputs && !dry_run);
            }
            other => panic!("Expected fuzz, got {other:?}"),
        }
    }

    #[test]
    fn fuzz_flags_parse() {
        let cli = Cli::try_parse_from([
            "ucf", "fuzz", "campaign.toml", "--id", "3", "--restart", "--print-outputs",
        ])
        .unwrap();
        match cli.command {
            Commands::Fuzz {
                config,
                id,
                restart,
                print_outputs,
                ..
            } => {
                assert_eq!(config, PathBuf::from("campaign.toml"));
                assert_eq!(id, "3");
                assert!(restart);
                assert!(print_outputs);
            }
            other => panic!("Expected fuzz, got {other:?}"),
        }
    }

    #[test]
    fn engine_exit_code_is_mirrored() {
        let err = anyhow::Error::from(CampaignError::Launch(LaunchError::Exited {
            code: Some(7),
            description: "exited with code 7".to_string(),
        }));
        assert_eq!(exit_status_for(&err), 7);

        let signalled = anyhow::Error::from(CampaignError::Launch(LaunchError::Exited {
            code: None,
            description: "terminated by signal 9".to_string(),
        }));
        assert_eq!(exit_status_for(&signalled), EXIT_FAILURE);
    }

    #[test]
    fn interrupted_wait_exits_like_sigint() {
        let err = anyhow::Error::from(CampaignError::Readiness(ReadinessError::Cancelled(
            PathBuf::from("/work/requests"),
        )));
        assert_eq!(exit_status_for(&err), EXIT_INTERRUPTED);
    }

    #[test]
    fn validation_failure_is_plain_failure() {
        let err = anyhow::Error::from(CampaignError::Validation(
            ValidationError::RestartRequiresMaster {
                node_id: "5".to_string(),
            },
        ));
        assert_eq!(exit_status_for(&err), EXIT_FAILURE);
    }
}
