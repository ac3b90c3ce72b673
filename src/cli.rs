use clap::{Parser, Subcommand};

use crate::config::ServeConfig;

#[derive(Parser)]
#[command(name = "azdo-runner-operator")]
#[command(about = "Elastic controller for self-hosted Azure DevOps build agents")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check cluster connectivity and permissions
    Check,

    /// Run the controller: registry watch, poll scheduler, error sweeper, and HTTP server
    Serve(ServeConfig),

    /// Manage the RunnerPool CRD
    Crd {
        #[command(subcommand)]
        action: CrdAction,
    },
}

#[derive(Subcommand)]
pub enum CrdAction {
    /// Print the RunnerPool CRD YAML to stdout
    Generate,

    /// Install the RunnerPool CRD into the connected cluster
    Install,
}
