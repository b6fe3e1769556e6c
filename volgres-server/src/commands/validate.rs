use std::path::PathBuf;

use anyhow::Result;

use volgres_engine::validate::validate_cluster_spec;

use crate::config::load_cluster_spec;

pub async fn run_validate(spec_path: PathBuf) -> Result<()> {
    let spec = load_cluster_spec(&spec_path)?;
    let report = validate_cluster_spec(&spec);

    println!("Cluster: {}", spec.name);
    println!("{}", "=".repeat(60));

    for findings in &report.volumes {
        if findings.errors.is_empty() && findings.warnings.is_empty() {
            println!("✓ {}", findings.volume);
            continue;
        }
        for error in &findings.errors {
            println!("✗ {}: {}", findings.volume, error);
        }
        for warning in &findings.warnings {
            println!("! {}: {}", findings.volume, warning);
        }
    }

    println!();
    if report.is_valid() {
        println!("Spec is valid");
        Ok(())
    } else {
        anyhow::bail!("Spec has validation errors")
    }
}
