use std::net::SocketAddr;
use std::time::Instant;

use tracing::{info, warn};

/// Install the Prometheus exporter on the given port.
pub fn init_metrics(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed (possibly already installed): {}", e),
    }
}

/// Stage-level measurements recorded by the stage executor.
pub struct StageMetrics;

impl StageMetrics {
    pub fn record_outcome(stage: &'static str, outcome: &'static str, started: Instant) {
        ::metrics::counter!("hcs_stage_runs_total", "stage" => stage, "outcome" => outcome).increment(1);
        ::metrics::histogram!("hcs_stage_duration_seconds", "stage" => stage)
            .record(started.elapsed().as_secs_f64());
    }

    pub fn record_skip(stage: &'static str) {
        ::metrics::counter!("hcs_stage_runs_total", "stage" => stage, "outcome" => "skipped").increment(1);
    }
}

pub fn record_job_outcome(status: &'static str) {
    ::metrics::counter!("hcs_jobs_total", "status" => status).increment(1);
}

pub fn record_rows_parsed(rows: usize) {
    ::metrics::counter!("hcs_table_rows_parsed_total").increment(rows as u64);
}
