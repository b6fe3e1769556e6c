use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use volgres_models::ClusterSpec;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub spec_path: PathBuf,
    pub reconcile_interval_secs: u64,
    /// Status older than this is unknown to the decision engine
    pub freshness_secs: u64,
    /// Upper bound on any single disk or database probe
    pub probe_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            spec_path: std::env::var("VOLGRES_SPEC_PATH")
                .unwrap_or_else(|_| "cluster.json".to_string())
                .into(),
            reconcile_interval_secs: std::env::var("VOLGRES_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("VOLGRES_INTERVAL_SECS must be a number of seconds")?,
            freshness_secs: std::env::var("VOLGRES_FRESHNESS_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .context("VOLGRES_FRESHNESS_SECS must be a number of seconds")?,
            probe_timeout_secs: std::env::var("VOLGRES_PROBE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("VOLGRES_PROBE_TIMEOUT_SECS must be a number of seconds")?,
        })
    }
}

/// Load and parse a cluster spec file
pub fn load_cluster_spec(path: &Path) -> Result<ClusterSpec> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cluster spec '{}'", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse cluster spec '{}'", path.display()))
}
