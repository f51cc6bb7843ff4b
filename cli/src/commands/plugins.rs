//! `ccert plugins` command.

use ccert_runtime::{CertificationPlugin, ContainerPlugin};
use clap::Args;

use crate::output;

#[derive(Args)]
pub struct PluginsArgs;

pub async fn execute(_args: PluginsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut table = output::new_table(&["NAME", "TITLE"]);
    for plugin in ContainerPlugin::all() {
        table.add_row(vec![plugin.name(), plugin.title()]);
    }
    println!("{table}");
    Ok(())
}
