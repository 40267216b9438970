use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_common::RateLimit;
use relay_engine::memory::MemoryTelemetry;
use relay_engine::{AuditEvent, InvocationRecord, Telemetry};
use tokio::sync::mpsc;

const BATCH_SIZE: usize = 64;

/// Background writer that batches audit events and posts them to a collector.
pub struct AuditExporter {
    tx: mpsc::Sender<AuditEvent>,
}

impl AuditExporter {
    /// Spawn the export worker. Returns `None` if no collector is configured.
    pub fn spawn(url: Option<&str>, token: Option<&str>) -> Option<Arc<Self>> {
        let url = url.filter(|u| !u.is_empty())?.to_string();
        let token = token.filter(|t| !t.is_empty()).map(str::to_string);

        let http = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "audit export disabled, http client unavailable");
                return None;
            }
        };

        let (tx, rx) = mpsc::channel::<AuditEvent>(4096);
        tokio::spawn(export_worker(http, url.clone(), token, rx));

        tracing::info!(%url, "audit export enabled");
        Some(Arc::new(Self { tx }))
    }

    pub fn send(&self, event: AuditEvent) {
        // Fire-and-forget; drop if the channel is full.
        if self.tx.try_send(event).is_err() {
            tracing::debug!("audit export queue full, event dropped");
        }
    }
}

pub fn batch_url(base: &str) -> String {
    format!("{}/v1/audit/batch", base.trim_end_matches('/'))
}

async fn export_worker(
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    mut rx: mpsc::Receiver<AuditEvent>,
) {
    let ingest_url = batch_url(&base_url);
    let mut buf: Vec<AuditEvent> = Vec::with_capacity(BATCH_SIZE);

    while let Some(event) = rx.recv().await {
        buf.push(event);
        while buf.len() < BATCH_SIZE {
            match rx.try_recv() {
                Ok(e) => buf.push(e),
                Err(_) => break,
            }
        }

        let body = serde_json::json!({ "events": buf });
        let mut req = http.post(&ingest_url).json(&body);
        if let Some(token) = &token {
            req = req.bearer_auth(token);
        }
        match req.send().await {
            Ok(resp) if !resp.status().is_success() => {
                tracing::warn!(status = %resp.status(), count = buf.len(), "audit collector rejected batch");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, count = buf.len(), "failed to export audit batch");
            }
        }
        buf.clear();
    }
}

/// In-memory telemetry that also forwards every audit event to the exporter.
pub struct ExportingTelemetry {
    inner: Arc<MemoryTelemetry>,
    exporter: Option<Arc<AuditExporter>>,
}

impl ExportingTelemetry {
    pub fn new(inner: Arc<MemoryTelemetry>, exporter: Option<Arc<AuditExporter>>) -> Self {
        Self { inner, exporter }
    }
}

#[async_trait]
impl Telemetry for ExportingTelemetry {
    async fn record_invocation(&self, record: InvocationRecord) -> anyhow::Result<()> {
        self.inner.record_invocation(record).await
    }

    async fn log_audit_event(&self, event: AuditEvent) -> anyhow::Result<()> {
        if let Some(exporter) = &self.exporter {
            exporter.send(event.clone());
        }
        self.inner.log_audit_event(event).await
    }

    async fn get_window_count(&self, agent_id: &str, window_secs: u64) -> anyhow::Result<u64> {
        self.inner.get_window_count(agent_id, window_secs).await
    }

    async fn update_performance_summary(
        &self,
        agent_id: &str,
        duration_ms: u64,
        success: bool,
    ) -> anyhow::Result<()> {
        self.inner
            .update_performance_summary(agent_id, duration_ms, success)
            .await
    }

    async fn reserve_slot(&self, agent_id: &str, limit: &RateLimit) -> anyhow::Result<bool> {
        self.inner.reserve_slot(agent_id, limit).await
    }
}
