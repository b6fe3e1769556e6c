use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Volgres - storage auto-resize for PostgreSQL on Kubernetes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Run the reconcile loop with the observability API
    Serve {
        /// Path to the cluster spec file (overrides VOLGRES_SPEC_PATH)
        #[arg(long)]
        spec: Option<PathBuf>,

        /// API port
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Reconcile interval in seconds (overrides VOLGRES_INTERVAL_SECS)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Validate a cluster spec file against the admission rules
    Validate {
        /// Path to the cluster spec file (JSON)
        spec: PathBuf,
    },

    /// Show the per-volume status projection for a cluster
    Status {
        /// Cluster name
        cluster: String,

        /// Output format (table or json)
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Show recent auto-resize events for a cluster
    Events {
        /// Cluster name
        cluster: String,

        /// Maximum number of events to show
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Output format (table or json)
        #[arg(short, long, default_value = "table")]
        output: String,
    },
}
