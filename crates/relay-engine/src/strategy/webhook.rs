use std::sync::Arc;

use async_trait::async_trait;
use relay_common::{BackendAudit, BackendError, ExecutionContext, ExecutionType, Manifest, Usage};
use reqwest::Url;
use tokio::time::Instant;

use super::{elapsed_ms, invocation_payload, ExecutionStrategy, StrategyOutput};
use crate::backend::{HttpCall, HttpInvoker};

pub struct WebhookStrategy {
    http: Arc<dyn HttpInvoker>,
}

impl WebhookStrategy {
    pub fn new(http: Arc<dyn HttpInvoker>) -> Self {
        Self { http }
    }
}

pub(crate) fn parse_http_url(raw: &str) -> Result<Url, BackendError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| BackendError::Misconfigured(format!("invalid URL '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(BackendError::Misconfigured(format!(
            "unsupported URL scheme '{other}'"
        ))),
    }
}

#[async_trait]
impl ExecutionStrategy for WebhookStrategy {
    fn kind(&self) -> ExecutionType {
        ExecutionType::Webhook
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        manifest: &Manifest,
    ) -> Result<StrategyOutput, BackendError> {
        let url = parse_http_url(&manifest.entrypoint)?;
        let target = webhook_target(&url);

        let started = Instant::now();
        let reply = self
            .http
            .call(HttpCall {
                method: "POST".to_string(),
                url: url.to_string(),
                auth: manifest.execution.auth.clone().unwrap_or_default(),
                body: invocation_payload(ctx, manifest),
            })
            .await?;

        if !reply.is_success() {
            return Err(BackendError::upstream(reply.status, &reply.body.to_string()));
        }

        Ok(StrategyOutput {
            raw_output: reply.body,
            usage: Usage {
                chargeable_units: reply.chargeable_units,
                ..Usage::duration_only(elapsed_ms(started))
            },
            backend_audit: BackendAudit {
                data_sources_accessed: Vec::new(),
                external_apis_called: vec![target],
            },
        })
    }

    fn targets(&self, _ctx: &ExecutionContext, manifest: &Manifest) -> Vec<String> {
        parse_http_url(&manifest.entrypoint)
            .map(|url| vec![webhook_target(&url)])
            .unwrap_or_default()
    }
}

fn webhook_target(url: &Url) -> String {
    format!("webhook:{}", url.host_str().unwrap_or_default())
}
