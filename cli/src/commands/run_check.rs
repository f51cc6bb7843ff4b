//! `ccert run-check` command.

use ccert_core::{CertConfig, Policy};
use ccert_runtime::{deps_from_config, ArtifactWriter, CertificationEngine, CheckId, PolicySource};
use clap::Args;

use crate::output::{self, ReportFormat};

use super::ConfigArgs;

#[derive(Args)]
pub struct RunCheckArgs {
    /// Check to run, e.g. HasLicense (see `ccert list-checks`)
    pub check: CheckId,

    /// Image reference to test
    pub image: String,

    #[command(flatten)]
    pub config: ConfigArgs,
}

pub async fn execute(args: RunCheckArgs, config: CertConfig) -> Result<(), Box<dyn std::error::Error>> {
    let deps = deps_from_config(&config)?;
    let artifacts = ArtifactWriter::new(&config.artifacts)?;
    let mut engine = CertificationEngine::new(deps, artifacts, PolicySource::Fixed(Policy::Standard))
        .with_checks(vec![args.check]);

    let cancel = super::interrupt_token();
    let result = engine.execute(&args.image, &cancel).await?;
    print!("{}", output::render(result, ReportFormat::Text)?);
    Ok(())
}
