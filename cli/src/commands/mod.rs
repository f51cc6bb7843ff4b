//! CLI command definitions and dispatch.

mod check;
mod list_checks;
mod plugins;
mod run_check;
mod version;

use std::path::PathBuf;

use ccert_core::{CertConfig, LogLevel};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::logging;

/// ccert: container image certification.
#[derive(Parser)]
#[command(name = "ccert", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Run a certification plugin against an image
    Check(check::CheckArgs),
    /// Run a single check against an image (debugging aid, not for certification)
    RunCheck(run_check::RunCheckArgs),
    /// List the checks of each policy
    ListChecks(list_checks::ListChecksArgs),
    /// List the registered certification plugins
    Plugins(plugins::PluginsArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Configuration shared by the commands that run checks.
///
/// Values come from, in increasing precedence: the config file, `PFLT_*`
/// environment variables, flags.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// YAML configuration file (default: <config dir>/ccert/config.yaml when present)
    #[arg(long, env = "PFLT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to a docker config.json holding registry credentials
    #[arg(short = 'd', long, env = "PFLT_DOCKERCONFIG")]
    pub docker_config: Option<PathBuf>,

    /// Architecture of the image to pull, e.g. amd64 or linux/arm64
    #[arg(long, env = "PFLT_PLATFORM")]
    pub platform: Option<String>,

    /// API token for the certification service
    #[arg(long, env = "PFLT_PYXIS_API_TOKEN", hide_env_values = true)]
    pub pyxis_api_token: Option<String>,

    /// Certification project id
    #[arg(long, env = "PFLT_CERTIFICATION_PROJECT_ID")]
    pub certification_project_id: Option<String>,

    /// Certification service host, overrides --pyxis-env
    #[arg(long, env = "PFLT_PYXIS_HOST")]
    pub pyxis_host: Option<String>,

    /// Certification service environment (prod, uat, qa, stage)
    #[arg(long, env = "PFLT_PYXIS_ENV")]
    pub pyxis_env: Option<String>,

    /// Directory receiving the JSON artifacts
    #[arg(long, env = "PFLT_ARTIFACTS")]
    pub artifacts: Option<PathBuf>,

    /// Log file written during the run
    #[arg(long, env = "PFLT_LOGFILE")]
    pub logfile: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PFLT_LOGLEVEL")]
    pub loglevel: Option<LogLevel>,

    /// Skip TLS certificate verification against the registry
    #[arg(long, env = "PFLT_INSECURE")]
    pub insecure: bool,
}

impl ConfigArgs {
    fn config_file(&self) -> Option<PathBuf> {
        self.config.clone().or_else(|| {
            dirs::config_dir()
                .map(|d| d.join("ccert").join("config.yaml"))
                .filter(|p| p.is_file())
        })
    }

    /// Build the run configuration.
    pub fn resolve(&self) -> Result<CertConfig, Box<dyn std::error::Error>> {
        let mut config = match self.config_file() {
            Some(path) => CertConfig::from_file(&path)?,
            None => CertConfig::default(),
        };

        if let Some(v) = &self.docker_config {
            config.docker_config = Some(v.clone());
        }
        if let Some(v) = &self.platform {
            config.platform = v.clone();
        }
        if let Some(v) = &self.pyxis_api_token {
            config.pyxis_api_token = Some(v.clone());
        }
        if let Some(v) = &self.certification_project_id {
            config.certification_project_id = Some(v.clone());
        }
        if let Some(v) = &self.pyxis_host {
            config.pyxis_host = Some(v.clone());
        }
        if let Some(v) = &self.pyxis_env {
            config.pyxis_env = v.clone();
        }
        if let Some(v) = &self.artifacts {
            config.artifacts = v.clone();
        }
        if let Some(v) = &self.logfile {
            config.logfile = v.clone();
        }
        if let Some(v) = self.loglevel {
            config.loglevel = v;
        }
        config.insecure |= self.insecure;
        Ok(config)
    }
}

/// Cancellation token tripped by Ctrl-C.
pub(crate) fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling the run");
            trigger.cancel();
        }
    });
    cancel
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Check(args) => {
            let config = args.config.resolve()?;
            logging::init_with_file(config.loglevel, &config.logfile)?;
            check::execute(args, config).await
        }
        Command::RunCheck(args) => {
            let config = args.config.resolve()?;
            logging::init_with_file(config.loglevel, &config.logfile)?;
            run_check::execute(args, config).await
        }
        Command::ListChecks(args) => {
            logging::init_stderr(LogLevel::Warn);
            list_checks::execute(args).await
        }
        Command::Plugins(args) => {
            logging::init_stderr(LogLevel::Warn);
            plugins::execute(args).await
        }
        Command::Version(args) => version::execute(args).await,
    }
}
