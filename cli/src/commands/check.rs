//! `ccert check` command.

use ccert_core::CertConfig;
use ccert_runtime::{CertificationPlugin, ContainerPlugin};
use clap::Args;

use crate::output::{self, ReportFormat};

use super::ConfigArgs;

#[derive(Args)]
pub struct CheckArgs {
    /// Plugin to run (see `ccert plugins`)
    pub plugin: String,

    /// Image reference to certify
    pub image: String,

    /// Submit the results to the certification service
    #[arg(short, long, env = "PFLT_SUBMIT")]
    pub submit: bool,

    /// Report format written to stdout
    #[arg(long, value_enum, default_value = "text")]
    pub format: ReportFormat,

    #[command(flatten)]
    pub config: ConfigArgs,
}

pub async fn execute(args: CheckArgs, config: CertConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut plugin = ContainerPlugin::all()
        .into_iter()
        .find(|p| p.name() == args.plugin)
        .ok_or_else(|| {
            let names: Vec<_> = ContainerPlugin::all().iter().map(|p| p.name()).collect();
            format!("unknown plugin '{}' (available: {})", args.plugin, names.join(", "))
        })?;

    let artifacts = config.artifacts.clone();
    plugin.init(config, std::slice::from_ref(&args.image))?;

    let cancel = super::interrupt_token();
    plugin.execute_checks(&cancel).await?;

    let result = plugin
        .results()
        .ok_or("the run produced no results")?;
    print!("{}", output::render(result, args.format)?);
    println!();
    println!("{}: {}", plugin.title(), output::verdict(result));
    println!("Artifacts written to {}", artifacts.display());

    if args.submit {
        plugin.submit(&cancel).await?;
    }
    Ok(())
}
