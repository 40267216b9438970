use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use relay_common::{
    BackendAudit, BackendError, ExecutionContext, ExecutionType, ExternalApi, Manifest, Usage,
};
use serde_json::{json, Map, Value};
use tokio::time::Instant;

use super::webhook::parse_http_url;
use super::{elapsed_ms, identity_json, metadata_json, ExecutionStrategy, StrategyOutput};
use crate::backend::{HttpCall, HttpInvoker};

/// Calls every external API the manifest depends on concurrently and
/// aggregates the replies keyed by API name.
pub struct PluginStrategy {
    http: Arc<dyn HttpInvoker>,
}

impl PluginStrategy {
    pub fn new(http: Arc<dyn HttpInvoker>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ExecutionStrategy for PluginStrategy {
    fn kind(&self) -> ExecutionType {
        ExecutionType::Plugin
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        manifest: &Manifest,
    ) -> Result<StrategyOutput, BackendError> {
        let apis = &manifest.dependencies.external_apis;
        if apis.is_empty() {
            return Err(BackendError::Misconfigured(
                "plugin agents require at least one external API".into(),
            ));
        }

        let mut calls = Vec::with_capacity(apis.len());
        for api in apis {
            let url = parse_http_url(&api.url)?;
            calls.push(HttpCall {
                method: api.method.to_uppercase(),
                url: url.to_string(),
                auth: manifest.execution.auth.clone().unwrap_or_default(),
                body: json!({
                    "operation": manifest.entrypoint,
                    "inputs": ctx.inputs,
                    "metadata": metadata_json(ctx, manifest),
                    "identity": identity_json(ctx),
                }),
            });
        }

        let started = Instant::now();
        let replies = join_all(calls.into_iter().map(|call| self.http.call(call))).await;

        let mut output = Map::new();
        let mut units: Option<f64> = None;
        let mut audit = BackendAudit::default();
        for (api, reply) in apis.iter().zip(replies) {
            let reply = reply?;
            if !reply.is_success() {
                tracing::warn!(api = %api.name, status = reply.status, "plugin dependency failed");
                return Err(BackendError::upstream(reply.status, &reply.body.to_string()));
            }
            if let Some(u) = reply.chargeable_units {
                *units.get_or_insert(0.0) += u;
            }
            audit.external_apis_called.push(plugin_target(api));
            output.insert(api.name.clone(), reply.body);
        }

        Ok(StrategyOutput {
            raw_output: Value::Object(output),
            usage: Usage {
                chargeable_units: units,
                ..Usage::duration_only(elapsed_ms(started))
            },
            backend_audit: audit,
        })
    }

    fn targets(&self, _ctx: &ExecutionContext, manifest: &Manifest) -> Vec<String> {
        manifest
            .dependencies
            .external_apis
            .iter()
            .map(plugin_target)
            .collect()
    }
}

fn plugin_target(api: &ExternalApi) -> String {
    format!("plugin:{}", api.name)
}
