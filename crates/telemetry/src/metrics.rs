use anyhow::Result;
use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Optimizer Metrics ====
    pub static ref OPTIMIZATION_REQUESTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "optimization_requests_total",
                "Total optimization requests by provider and outcome",
            ),
            &["provider", "outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref OPTIMIZATION_FALLBACKS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "optimization_fallbacks_total",
                "Times the fallback provider produced the result, by reason",
            ),
            &["reason"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref OPTIMIZATION_DURATION: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "optimization_duration_seconds",
                "End-to-end optimization latency",
            ),
            &["provider"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CLAMP_WARNINGS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "optimization_clamp_warnings_total",
                "Recommended values replaced during capability clamping",
            ),
            &["field"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Apply Engine Metrics ====
    pub static ref APPLY_JOBS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "apply_jobs_total",
                "Apply jobs by terminal state",
            ),
            &["state"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ACTIVE_APPLY_JOBS: IntGauge = {
        let metric = IntGauge::new("apply_jobs_active", "Apply jobs currently in a non-terminal state")
            .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref APPLY_JOB_DURATION: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "apply_job_duration_seconds",
                "Wall time from job start to terminal state",
            ),
            &["adapter"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Backend Adapter Metrics ====
    pub static ref ADAPTER_OPERATIONS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "adapter_operations_total",
                "Adapter operations by backend, operation and status",
            ),
            &["backend", "operation", "status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref DISCOVERED_CAMERAS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "discovered_cameras_total",
                "Cameras returned by discovery scans",
            ),
            &["backend"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Render all registered metrics in the prometheus text format.
pub fn gather() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
