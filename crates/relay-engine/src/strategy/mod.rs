pub mod container;
pub mod plugin;
pub mod prompt;
pub mod webhook;

use async_trait::async_trait;
use chrono::Utc;
use relay_common::{BackendAudit, BackendError, ExecutionContext, ExecutionType, Manifest, Usage};
use serde_json::{json, Value};

pub use container::ContainerStrategy;
pub use plugin::PluginStrategy;
pub use prompt::PromptStrategy;
pub use webhook::WebhookStrategy;

/// Uniform result every strategy hands back to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutput {
    pub raw_output: Value,
    pub usage: Usage,
    pub backend_audit: BackendAudit,
}

/// A pluggable execution backend.
///
/// The router selects exactly one strategy per invocation from
/// `Manifest::execution_type`; the engine bounds `execute` with the effective
/// timeout and drops the future when it expires.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn kind(&self) -> ExecutionType;

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        manifest: &Manifest,
    ) -> Result<StrategyOutput, BackendError>;

    /// External targets one attempt reaches. Kept in the audit trail when
    /// the attempt fails or times out.
    fn targets(&self, ctx: &ExecutionContext, manifest: &Manifest) -> Vec<String> {
        let _ = (ctx, manifest);
        Vec::new()
    }

    /// Usage billed for an attempt cut off after `elapsed_ms`. Duration only,
    /// unless the backend holds resources for the whole attempt.
    fn timeout_usage(&self, manifest: &Manifest, elapsed_ms: u64) -> Usage {
        let _ = manifest;
        Usage::duration_only(elapsed_ms)
    }
}

pub(crate) fn identity_json(ctx: &ExecutionContext) -> Value {
    json!({
        "userId": ctx.caller_identity.user_id,
        "orgId": ctx.caller_identity.org_id,
        "networkId": ctx.caller_identity.network_id,
    })
}

pub(crate) fn metadata_json(ctx: &ExecutionContext, manifest: &Manifest) -> Value {
    json!({
        "executionId": ctx.execution_id,
        "agentId": manifest.agent_id,
        "version": manifest.version,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

/// Envelope sent to webhook, container and plugin backends.
pub(crate) fn invocation_payload(ctx: &ExecutionContext, manifest: &Manifest) -> Value {
    json!({
        "inputs": ctx.inputs,
        "metadata": metadata_json(ctx, manifest),
        "identity": identity_json(ctx),
    })
}

pub(crate) fn elapsed_ms(started: tokio::time::Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
