//! Prometheus-compatible metrics endpoint
//!
//! Counters are bumped by the scheduler and session registry; the endpoint
//! renders them on demand. Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

const UPDATE_HISTORY_LEN: usize = 1000;

#[derive(Debug)]
pub struct Metrics {
    // Scheduler
    pub outer_updates: AtomicU64,
    pub sim_steps: AtomicU64,
    /// Outer updates that hit the catch-up cap with time left over
    pub catch_up_capped: AtomicU64,
    pub replication_cycles: AtomicU64,
    pub update_time_us: AtomicU64,
    pub update_time_p99_us: AtomicU64,

    // Replication traffic
    pub commands_sent: AtomicU64,
    pub update_batches_sent: AtomicU64,
    pub snapshots_sent: AtomicU64,
    pub resyncs_served: AtomicU64,
    pub inputs_dropped: AtomicU64,

    // Gauges
    pub active_instances: AtomicU64,
    pub active_sessions: AtomicU64,
    pub connected_clients: AtomicU64,

    start_time: Instant,
    update_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            outer_updates: AtomicU64::new(0),
            sim_steps: AtomicU64::new(0),
            catch_up_capped: AtomicU64::new(0),
            replication_cycles: AtomicU64::new(0),
            update_time_us: AtomicU64::new(0),
            update_time_p99_us: AtomicU64::new(0),
            commands_sent: AtomicU64::new(0),
            update_batches_sent: AtomicU64::new(0),
            snapshots_sent: AtomicU64::new(0),
            resyncs_served: AtomicU64::new(0),
            inputs_dropped: AtomicU64::new(0),
            active_instances: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            connected_clients: AtomicU64::new(0),
            start_time: Instant::now(),
            update_history: RwLock::new(VecDeque::with_capacity(UPDATE_HISTORY_LEN)),
        }
    }

    #[inline]
    pub fn incr(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    #[inline]
    pub fn set(gauge: &AtomicU64, value: u64) {
        gauge.store(value, Ordering::Relaxed);
    }

    /// Record how long one outer scheduler update took
    pub fn record_update_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.update_time_us.store(us, Ordering::Relaxed);

        let mut history = self.update_history.write();
        history.push_back(us);
        while history.len() > UPDATE_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;
            self.update_time_p99_us
                .store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Render every metric in Prometheus text format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("gridsync_outer_updates_total", "Outer scheduler updates", "counter",
            self.outer_updates.load(Ordering::Relaxed));
        metric!("gridsync_sim_steps_total", "Fixed simulation steps executed", "counter",
            self.sim_steps.load(Ordering::Relaxed));
        metric!("gridsync_catch_up_capped_total", "Updates that hit the catch-up step cap", "counter",
            self.catch_up_capped.load(Ordering::Relaxed));
        metric!("gridsync_replication_cycles_total", "Replication passes executed", "counter",
            self.replication_cycles.load(Ordering::Relaxed));
        metric!("gridsync_update_time_microseconds", "Last outer update duration", "gauge",
            self.update_time_us.load(Ordering::Relaxed));
        metric!("gridsync_update_time_p99_microseconds", "99th percentile outer update duration", "gauge",
            self.update_time_p99_us.load(Ordering::Relaxed));

        metric!("gridsync_commands_sent_total", "Game commands handed to the sender", "counter",
            self.commands_sent.load(Ordering::Relaxed));
        metric!("gridsync_update_batches_sent_total", "Dirty-update batches sent", "counter",
            self.update_batches_sent.load(Ordering::Relaxed));
        metric!("gridsync_snapshots_sent_total", "Full snapshots sent", "counter",
            self.snapshots_sent.load(Ordering::Relaxed));
        metric!("gridsync_resyncs_served_total", "Client resync requests served", "counter",
            self.resyncs_served.load(Ordering::Relaxed));
        metric!("gridsync_inputs_dropped_total", "Move inputs rejected by backpressure", "counter",
            self.inputs_dropped.load(Ordering::Relaxed));

        metric!("gridsync_active_instances", "Running game instances", "gauge",
            self.active_instances.load(Ordering::Relaxed));
        metric!("gridsync_active_sessions", "Open sessions", "gauge",
            self.active_sessions.load(Ordering::Relaxed));
        metric!("gridsync_connected_clients", "Registered clients", "gauge",
            self.connected_clients.load(Ordering::Relaxed));
        metric!("gridsync_uptime_seconds", "Server uptime", "counter", self.uptime_seconds());

        output
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({
            "scheduler": {
                "outer_updates": self.outer_updates.load(Ordering::Relaxed),
                "sim_steps": self.sim_steps.load(Ordering::Relaxed),
                "catch_up_capped": self.catch_up_capped.load(Ordering::Relaxed),
                "replication_cycles": self.replication_cycles.load(Ordering::Relaxed),
                "update_time_us": self.update_time_us.load(Ordering::Relaxed),
                "update_time_p99_us": self.update_time_p99_us.load(Ordering::Relaxed),
            },
            "replication": {
                "commands_sent": self.commands_sent.load(Ordering::Relaxed),
                "update_batches_sent": self.update_batches_sent.load(Ordering::Relaxed),
                "snapshots_sent": self.snapshots_sent.load(Ordering::Relaxed),
                "resyncs_served": self.resyncs_served.load(Ordering::Relaxed),
                "inputs_dropped": self.inputs_dropped.load(Ordering::Relaxed),
            },
            "active": {
                "instances": self.active_instances.load(Ordering::Relaxed),
                "sessions": self.active_sessions.load(Ordering::Relaxed),
                "clients": self.connected_clients.load(Ordering::Relaxed),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Bind `0.0.0.0:port` and serve metrics until the task is dropped
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Metrics server listening on http://{}/metrics", addr);
    serve_metrics(listener, metrics).await
}

/// Serve metrics on an already bound listener
pub async fn serve_metrics(listener: TcpListener, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    let response = if request.starts_with("GET /metrics/json") {
                        http_response("application/json", &metrics.to_json())
                    } else if request.starts_with("GET /metrics") {
                        http_response("text/plain; version=0.0.4", &metrics.to_prometheus())
                    } else if request.starts_with("GET /health") {
                        http_response("text/plain", "OK")
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
