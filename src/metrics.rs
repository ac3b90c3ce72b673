//! Prometheus metrics for the reconciliation engine, exposed by the
//! HTTP server's `/metrics` endpoint. Registered once into a private
//! registry via `LazyLock`, independent of the process-global default
//! registry so tests can gather without cross-test interference.

use std::sync::LazyLock;

use prometheus::{Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static RECONCILE_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("azdo_runner_operator_reconcile_total", "Total reconcile ticks attempted across all pools")
        .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

pub static RECONCILE_SUCCESS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("azdo_runner_operator_reconcile_success_total", "Total reconcile ticks that completed without error")
        .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

pub static RECONCILE_FAILURE_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("azdo_runner_operator_reconcile_failure_total", "Total reconcile ticks that failed")
        .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

pub static ACTIONS_PLANNED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("azdo_runner_operator_actions_planned_total", "Total planner actions produced across all ticks")
        .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

pub static ACTIONS_APPLIED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        Opts::new("azdo_runner_operator_actions_applied_total", "Total actions applied, by kind and outcome"),
        &["kind", "outcome"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

pub static QUEUED_JOBS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let g = GaugeVec::new(
        Opts::new("azdo_runner_operator_queued_jobs", "Queued Azure DevOps job requests observed at last poll, by pool"),
        &["pool"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(g.clone())).expect("metric not yet registered");
    g
});

pub static RUNNING_AGENTS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let g = GaugeVec::new(
        Opts::new("azdo_runner_operator_running_agents", "Running agent pods observed at last poll, by pool"),
        &["pool"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(g.clone())).expect("metric not yet registered");
    g
});

pub static REGISTERED_POOLS: LazyLock<Gauge> = LazyLock::new(|| {
    let g = Gauge::new("azdo_runner_operator_registered_pools", "Number of RunnerPool resources currently tracked by the registry")
        .expect("metric definition is valid");
    REGISTRY.register(Box::new(g.clone())).expect("metric not yet registered");
    g
});

pub static RECONCILE_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let h = Histogram::with_opts(HistogramOpts::new(
        "azdo_runner_operator_reconcile_duration_seconds",
        "Wall-clock time spent reconciling a single pool's tick",
    ))
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(h.clone())).expect("metric not yet registered");
    h
});

/// Renders every metric in this module's registry in the Prometheus
/// text exposition format, for the `/metrics` HTTP handler.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("encoding registered metrics should not fail");
    String::from_utf8(buffer).expect("prometheus text encoding is always valid utf8")
}
