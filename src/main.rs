use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use gridsync_server::config::ServerConfig;
use gridsync_server::metrics;
use gridsync_server::net::protocol::encode_batch;
use gridsync_server::net::sender::OutboundBatch;
use gridsync_server::ServerContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Gridsync Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    info!(
        "Configuration loaded: role={:?}, sim={}Hz, replication={}Hz, max_sessions={}",
        config.role, config.sim_tick_rate, config.replication_tick_rate, config.max_sessions
    );

    let ctx = ServerContext::new(config)?;

    let metrics_port = ctx.config.metrics_port;
    let server_metrics = ctx.metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(server_metrics, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        _ = run_update_loop(&ctx) => {}
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    for session in ctx.scheduler.active_sessions() {
        ctx.sessions.end_game(&session);
    }
    info!("Server stopped");
    Ok(())
}

/// Drive the scheduler at the simulation rate and flush outbound batches
async fn run_update_loop(ctx: &ServerContext) {
    let step = Duration::from_secs_f32(ctx.scheduler.sim_step());
    let mut ticker = interval(step);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = Instant::now();

    loop {
        ticker.tick().await;
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f32();
        last = now;

        let summary = ctx.update(dt);
        if summary.sim_steps > 0 {
            debug!(
                "Tick: {} steps, {} replication cycles, {} batches",
                summary.sim_steps, summary.replication_cycles, summary.batches_sent
            );
        }

        if let Some(outbound) = &ctx.outbound {
            for batch in outbound.try_iter() {
                flush_batch(&batch);
            }
        }
        drain_events(ctx);
    }
}

/// Lifecycle events have no consumer beyond the log in this binary
fn drain_events(ctx: &ServerContext) {
    for event in ctx.session_events.try_iter() {
        info!("Session event: {:?}", event);
    }
    for event in ctx.scheduler_events.try_iter() {
        info!("Scheduler event: {:?}", event);
    }
}

/// Encode a batch for the transport. Transport delivery lives outside this
/// binary, so the encoded payload is only accounted for here.
fn flush_batch(batch: &OutboundBatch) {
    match encode_batch(&batch.commands) {
        Ok(payload) => debug!(
            "Batch of {} commands ({} bytes) for clients {:?}",
            batch.commands.len(),
            payload.len(),
            batch.targets.as_slice()
        ),
        Err(e) => warn!("Failed to encode outbound batch: {}", e),
    }
}
