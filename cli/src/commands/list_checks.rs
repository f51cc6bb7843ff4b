//! `ccert list-checks` command.

use ccert_core::{CertConfig, Policy};
use ccert_runtime::{checks_for, deps_from_config, Check, CheckId};
use clap::Args;

use crate::output;

#[derive(Args)]
pub struct ListChecksArgs {
    /// Only list the checks of this policy (standard, root-exception, scratch)
    #[arg(long)]
    pub policy: Option<Policy>,
}

pub async fn execute(args: ListChecksArgs) -> Result<(), Box<dyn std::error::Error>> {
    let deps = deps_from_config(&CertConfig::default())?;
    let policies: Vec<Policy> = match args.policy {
        Some(policy) => vec![policy],
        None => Policy::ALL.to_vec(),
    };

    let mut table = output::new_table(&["NAME", "LEVEL", "POLICIES", "DESCRIPTION"]);
    for id in CheckId::ALL {
        let applies: Vec<&str> = policies
            .iter()
            .filter(|p| checks_for(**p).contains(&id))
            .map(|p| p.as_str())
            .collect();
        if applies.is_empty() {
            continue;
        }
        let check = id.build(&deps);
        let metadata = check.metadata();
        table.add_row(vec![
            check.name().to_string(),
            metadata.level.to_string(),
            applies.join(","),
            metadata.description,
        ]);
    }

    println!("{table}");
    Ok(())
}
