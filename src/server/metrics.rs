use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all worker metrics
const PREFIX: &str = "digest_worker";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Cycle Metrics
    pub static ref CYCLE_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_cycle_runs_total"), "Total cycle runs by outcome"),
        &["cycle", "outcome"]
    ).expect("Failed to create cycle_runs_total metric");

    pub static ref CYCLE_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_cycle_duration_seconds"),
            "Cycle run duration in seconds"
        )
        .buckets(vec![0.01, 0.1, 1.0, 10.0, 60.0, 300.0, 900.0, 3600.0]),
        &["cycle"]
    ).expect("Failed to create cycle_duration_seconds metric");

    pub static ref CYCLE_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_cycle_running"), "Whether a cycle is currently running (1) or not (0)"),
        &["cycle"]
    ).expect("Failed to create cycle_running metric");

    // Pipeline Metrics
    pub static ref PIPELINE_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_pipeline_runs_total"), "Total pipeline runs by outcome"),
        &["outcome"]
    ).expect("Failed to create pipeline_runs_total metric");

    pub static ref GENERATION_TASKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_generation_tasks_total"), "Generation tasks by category, source and outcome"),
        &["category", "source", "outcome"]
    ).expect("Failed to create generation_tasks_total metric");

    pub static ref SYNTHESIS_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_synthesis_calls_total"), "AI synthesis calls by outcome"),
        &["outcome"]
    ).expect("Failed to create synthesis_calls_total metric");

    pub static ref MESSAGES_SENT_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_messages_sent_total"), "Outbound messages by outcome"),
        &["outcome"]
    ).expect("Failed to create messages_sent_total metric");

    // Collaborator Metrics
    pub static ref COLLABORATOR_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_collaborator_request_duration_seconds"),
            "Outbound request duration in seconds"
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 90.0]),
        &["collaborator", "operation", "status"]
    ).expect("Failed to create collaborator_request_duration_seconds metric");

    pub static ref LOCK_CONTENTION_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_lock_contention_total"),
        "Times a user was skipped because another cycle held it"
    ).expect("Failed to create lock_contention_total metric");

    pub static ref PENDING_INITIAL_SENDS: Gauge = Gauge::new(
        format!("{PREFIX}_pending_initial_sends"),
        "Delayed first digests waiting to go out"
    ).expect("Failed to create pending_initial_sends metric");

    // Process Metrics
    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(CYCLE_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CYCLE_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(CYCLE_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(PIPELINE_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(GENERATION_TASKS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SYNTHESIS_CALLS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(MESSAGES_SENT_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(COLLABORATOR_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(LOCK_CONTENTION_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PENDING_INITIAL_SENDS.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record a finished cycle run
pub fn record_cycle_run(cycle: &str, outcome: &str, duration: Duration) {
    CYCLE_RUNS_TOTAL.with_label_values(&[cycle, outcome]).inc();
    CYCLE_DURATION_SECONDS
        .with_label_values(&[cycle])
        .observe(duration.as_secs_f64());
}

pub fn set_cycle_running(cycle: &str, running: bool) {
    CYCLE_RUNNING
        .with_label_values(&[cycle])
        .set(if running { 1.0 } else { 0.0 });
}

pub fn record_pipeline_run(outcome: &str) {
    PIPELINE_RUNS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_generation_task(category: &str, source: &str, outcome: &str) {
    GENERATION_TASKS_TOTAL
        .with_label_values(&[category, source, outcome])
        .inc();
}

pub fn record_synthesis_call(outcome: &str) {
    SYNTHESIS_CALLS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_message_send(outcome: &str) {
    MESSAGES_SENT_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record one outbound request to a collaborator ("openserv", "gemini", "store")
pub fn record_collaborator_request(
    collaborator: &str,
    operation: &str,
    success: bool,
    duration: Duration,
) {
    let status = if success { "ok" } else { "error" };
    COLLABORATOR_REQUEST_DURATION_SECONDS
        .with_label_values(&[collaborator, operation, status])
        .observe(duration.as_secs_f64());
}

pub fn record_lock_contention() {
    LOCK_CONTENTION_TOTAL.inc();
}

pub fn set_pending_initial_sends(count: usize) {
    PENDING_INITIAL_SENDS.set(count as f64);
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<f64>().ok());
            if let Some(kb) = rss_kb {
                PROCESS_MEMORY_BYTES.set(kb * 1024.0);
            }
        }
    }
}

/// Prometheus text exposition of the registry
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    match encode_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        init_metrics();

        let metric_families = REGISTRY.gather();
        assert!(!metric_families.is_empty(), "Metrics should be registered");
    }

    #[test]
    fn test_record_cycle_run() {
        init_metrics();

        record_cycle_run("immediate-check", "success", Duration::from_millis(50));

        let encoded = encode_metrics().unwrap();
        assert!(encoded.contains("digest_worker_cycle_runs_total"));
        assert!(encoded.contains("immediate-check"));
    }

    #[test]
    fn test_record_generation_and_messages() {
        init_metrics();

        record_generation_task("watchlist", "intel", "success");
        record_message_send("failed");
        record_lock_contention();

        let encoded = encode_metrics().unwrap();
        assert!(encoded.contains("digest_worker_generation_tasks_total"));
        assert!(encoded.contains("digest_worker_messages_sent_total"));
        assert!(encoded.contains("digest_worker_lock_contention_total"));
    }
}
