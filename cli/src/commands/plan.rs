//! Plan command showing the resource graph without touching anything
//!
//! Prints the execution waves in apply order so a reviewer can see what an
//! `up` would create and in which order.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::config::DeploymentConfig;
use crate::resources::plan::deployment_graph;
use crate::ui;

pub async fn execute(config_path: &Path) -> Result<()> {
    let config = DeploymentConfig::load(config_path)?;
    let graph = deployment_graph(&config)?;

    ui::print_header(&format!(
        "Plan for stack {} in project {}",
        config.stack, config.project
    ));

    for (i, wave) in graph.waves().iter().enumerate() {
        println!("{}", format!("Wave {}", i + 1).bold());
        for node in wave {
            let after = if node.depends_on.is_empty() {
                String::new()
            } else {
                format!("after {}", node.depends_on.join(", ")).dimmed().to_string()
            };
            println!(
                "   {:<22} {:<36} {}",
                node.spec.kind().cyan(),
                node.name,
                after
            );
        }
        println!();
    }

    ui::print_info(&format!(
        "{} resources across {} waves",
        graph.len(),
        graph.waves().len()
    ));
    Ok(())
}
