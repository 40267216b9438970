use std::sync::Arc;

use async_trait::async_trait;
use relay_common::{BackendAudit, BackendError, ExecutionContext, ExecutionType, Manifest, Usage};
use serde_json::Value;
use tokio::time::Instant;

use super::{elapsed_ms, ExecutionStrategy, StrategyOutput};
use crate::backend::{ModelBackend, ModelRequest};

/// Renders `entrypoint` as a prompt template and sends it to the model backend.
pub struct PromptStrategy {
    backend: Arc<dyn ModelBackend>,
}

impl PromptStrategy {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ExecutionStrategy for PromptStrategy {
    fn kind(&self) -> ExecutionType {
        ExecutionType::Prompt
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        manifest: &Manifest,
    ) -> Result<StrategyOutput, BackendError> {
        let model_config = manifest
            .model_config
            .as_ref()
            .filter(|m| m.has_provider())
            .ok_or_else(|| {
                BackendError::Misconfigured("prompt agents require a model provider".into())
            })?;

        let model = ctx
            .runtime_overrides
            .model_override
            .clone()
            .or_else(|| model_config.model.clone())
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| BackendError::Misconfigured("no model configured".into()))?;

        let prompt = render_template(&manifest.entrypoint, ctx);

        let started = Instant::now();
        let resp = self
            .backend
            .complete(ModelRequest {
                provider: model_config.provider.clone(),
                model: model.clone(),
                prompt,
                parameters: model_config.parameters.clone(),
            })
            .await?;

        Ok(StrategyOutput {
            raw_output: Value::String(resp.text),
            usage: Usage {
                token_count: Some(resp.token_count.unwrap_or(0)),
                ..Usage::duration_only(elapsed_ms(started))
            },
            backend_audit: BackendAudit {
                data_sources_accessed: Vec::new(),
                external_apis_called: vec![model_target(&model_config.provider, &model)],
            },
        })
    }

    fn targets(&self, ctx: &ExecutionContext, manifest: &Manifest) -> Vec<String> {
        let Some(config) = manifest.model_config.as_ref().filter(|m| m.has_provider()) else {
            return Vec::new();
        };
        ctx.runtime_overrides
            .model_override
            .clone()
            .or_else(|| config.model.clone())
            .map(|model| vec![model_target(&config.provider, &model)])
            .unwrap_or_default()
    }
}

fn model_target(provider: &str, model: &str) -> String {
    format!("model:{provider}/{model}")
}

/// Substitutes `{input.<path>}` and `{user.<field>}` placeholders.
///
/// Dotted input paths walk into nested objects. Placeholders that do not
/// resolve are left in place verbatim.
pub fn render_template(template: &str, ctx: &ExecutionContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &after[..close];
        match resolve_placeholder(key, ctx) {
            Some(v) => out.push_str(&v),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn resolve_placeholder(key: &str, ctx: &ExecutionContext) -> Option<String> {
    let key = key.trim();
    if let Some(path) = key.strip_prefix("input.") {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut value = ctx.inputs.get(first)?;
        for seg in segments {
            value = match value {
                Value::Object(map) => map.get(seg)?,
                Value::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        return Some(value_to_text(value));
    }

    let field = key.strip_prefix("user.")?;
    let identity = &ctx.caller_identity;
    match field {
        "id" | "userId" | "user_id" => Some(identity.user_id.clone()),
        "orgId" | "org_id" => identity.org_id.clone(),
        "networkId" | "network_id" => identity.network_id.clone(),
        _ => None,
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
