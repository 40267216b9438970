mod args;
mod audit;
mod handlers;
mod loader;
mod metrics;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use clap::Parser;
use relay_common::telemetry::{init_tracing, OtlpExport};
use relay_engine::backend::stub::StubModelBackend;
use relay_engine::backend::{DockerCliRuntime, ModelBackend, OpenAiCompatBackend, ReqwestInvoker};
use relay_engine::memory::{MemoryIdentity, MemoryRegistry, MemoryRetentionQueue, MemoryTelemetry};
use relay_engine::{Engine, EngineConfig, ExecutionRouter};

use crate::args::Args;
use crate::audit::{AuditExporter, ExportingTelemetry};
use crate::handlers::{agent_summary, execute, healthz};
use crate::metrics::{metrics_handler, track_requests};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let otlp = args.otlp_endpoint.clone().map(|endpoint| OtlpExport {
        endpoint,
        token: args.otlp_token.clone(),
    });
    let tracer_provider = init_tracing("relay-gateway", otlp.as_ref());

    let config = EngineConfig::from_env()?;

    let registry = match &args.manifests {
        Some(path) => MemoryRegistry::from_manifests(loader::load_manifests(path).await?),
        None => MemoryRegistry::new(),
    };
    let identity = match &args.grants {
        Some(path) => MemoryIdentity::from_grants(loader::load_grants(path).await?),
        None => MemoryIdentity::new(),
    };
    tracing::info!(agents = registry.len(), "registry loaded");

    let model: Arc<dyn ModelBackend> = match &args.model_base_url {
        Some(url) => Arc::new(OpenAiCompatBackend::new(url.clone(), args.model_api_key.clone())?),
        None => {
            tracing::warn!("no model backend configured, prompt agents will echo their prompt");
            Arc::new(StubModelBackend::new())
        }
    };
    let router = ExecutionRouter::with_backends(
        model,
        Arc::new(ReqwestInvoker::new()?),
        Arc::new(DockerCliRuntime::new(args.docker_bin.clone())),
    );

    let telemetry = Arc::new(MemoryTelemetry::with_history(args.telemetry_history));
    let exporter = AuditExporter::spawn(
        args.audit_export_url.as_deref(),
        args.audit_export_token.as_deref(),
    );
    let retention = MemoryRetentionQueue::new();

    let engine = Engine::builder(
        Arc::new(registry),
        Arc::new(identity),
        Arc::new(ExportingTelemetry::new(telemetry.clone(), exporter)),
    )
    .config(config)
    .router(router)
    .retention(Arc::new(retention.clone()))
    .build();

    tokio::spawn(retention_sweep_loop(
        retention,
        telemetry.clone(),
        Duration::from_secs(args.retention_sweep_secs.max(1)),
    ));

    let st = AppState {
        engine: Arc::new(engine),
        telemetry,
        metrics: Arc::new(metrics::Metrics::default()),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/v1/agents/:agent_id/execute", post(execute))
        .route("/v1/agents/:agent_id/summary", get(agent_summary))
        .layer(middleware::from_fn_with_state(st.clone(), track_requests))
        .with_state(st);

    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    tracing::info!(addr = %args.listen_addr, "relay gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(provider) = tracer_provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("failed to flush spans: {e}");
        }
    }
    Ok(())
}

/// Applies cleanups whose retention period has ended and forgets idle
/// rate windows.
async fn retention_sweep_loop(
    queue: MemoryRetentionQueue,
    telemetry: Arc<MemoryTelemetry>,
    every: Duration,
) {
    let mut tick = tokio::time::interval(every);
    loop {
        tick.tick().await;
        let idle = telemetry.sweep_windows();
        if idle > 0 {
            tracing::debug!(idle, "dropped idle rate windows");
        }
        for entry in queue.drain_due(chrono::Utc::now()).await {
            let removed = telemetry.purge_execution(&entry.execution_id).await;
            tracing::info!(
                execution_id = %entry.execution_id,
                agent_id = %entry.agent_id,
                removed,
                "retention cleanup applied"
            );
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
