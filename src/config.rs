//! Process-level configuration for the `serve` command: where to bind
//! the HTTP server and how to format logs. Everything else (per-pool
//! poll interval, max/min agents, capability images, ...) lives on the
//! RunnerPool spec, not here.

use std::net::SocketAddr;

use clap::Args;

#[derive(Debug, Clone, Args)]
pub struct ServeConfig {
    /// Address the health/readiness/metrics HTTP server binds to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub http_addr: SocketAddr,

    /// Namespace the controller watches for RunnerPool resources.
    /// Defaults to all namespaces.
    #[arg(long)]
    pub namespace: Option<String>,

    /// Emit logs as newline-delimited JSON instead of compact text.
    #[arg(long)]
    pub log_json: bool,
}

pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}
