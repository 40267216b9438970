use std::sync::Arc;

use async_trait::async_trait;
use relay_common::{
    BackendAudit, BackendError, Deployment, ExecutionContext, ExecutionType, Manifest, Usage,
};
use tokio::time::Instant;

use super::{elapsed_ms, invocation_payload, ExecutionStrategy, StrategyOutput};
use crate::backend::ContainerRuntime;

pub struct ContainerStrategy {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerStrategy {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl ExecutionStrategy for ContainerStrategy {
    fn kind(&self) -> ExecutionType {
        ExecutionType::Container
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        manifest: &Manifest,
    ) -> Result<StrategyOutput, BackendError> {
        let deployment = manifest.deployment.as_ref().ok_or_else(|| {
            BackendError::Misconfigured("container agents require a deployment".into())
        })?;

        let started = Instant::now();
        let run = self
            .runtime
            .run(&ctx.execution_id, deployment, &invocation_payload(ctx, manifest))
            .await?;

        Ok(StrategyOutput {
            raw_output: run.output,
            usage: Usage {
                memory_mb: run.memory_mb,
                cpu_cores: run.cpu_cores,
                ..Usage::duration_only(elapsed_ms(started))
            },
            backend_audit: BackendAudit {
                data_sources_accessed: Vec::new(),
                external_apis_called: vec![container_target(deployment)],
            },
        })
    }

    fn targets(&self, _ctx: &ExecutionContext, manifest: &Manifest) -> Vec<String> {
        manifest.deployment.iter().map(container_target).collect()
    }

    // The container holds its reservation until it is removed, so a cut-off
    // run still bills memory and cpu for the elapsed time.
    fn timeout_usage(&self, manifest: &Manifest, elapsed_ms: u64) -> Usage {
        let deployment = manifest.deployment.as_ref();
        Usage {
            memory_mb: deployment.and_then(|d| d.memory_mb),
            cpu_cores: deployment.and_then(|d| d.cpu_cores),
            ..Usage::duration_only(elapsed_ms)
        }
    }
}

fn container_target(deployment: &Deployment) -> String {
    format!("container:{}", deployment.image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::stub::StubContainerRuntime;
    use crate::strategy::fixtures::{context, manifest};
    use relay_common::Deployment;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    fn container_manifest() -> Manifest {
        let mut m = manifest("container", "summarize");
        m.deployment = Some(Deployment {
            image: "acme/summarizer:1".into(),
            memory_mb: Some(512),
            cpu_cores: Some(0.5),
            env: HashMap::new(),
            command: None,
        });
        m
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_declared_limits_and_elapsed_time() {
        let runtime = Arc::new(StubContainerRuntime::new(
            Duration::from_millis(2000),
            json!({"summary": "ok"}),
        ));
        let out = ContainerStrategy::new(runtime.clone())
            .execute(&context(json!({})), &container_manifest())
            .await
            .unwrap();

        assert_eq!(runtime.runs(), 1);
        assert_eq!(out.raw_output, json!({"summary": "ok"}));
        assert_eq!(out.usage.memory_mb, Some(512));
        assert_eq!(out.usage.cpu_cores, Some(0.5));
        assert_eq!(out.usage.duration_ms, 2000);
        assert!(out.usage.token_count.is_none());
    }

    #[tokio::test]
    async fn test_missing_deployment_is_misconfigured() {
        let runtime = Arc::new(StubContainerRuntime::default());
        let err = ContainerStrategy::new(runtime.clone())
            .execute(&context(json!({})), &manifest("container", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Misconfigured(_)));
        assert_eq!(runtime.runs(), 0);
    }

    #[test]
    fn test_timeout_usage_bills_reservation() {
        let strategy = ContainerStrategy::new(Arc::new(StubContainerRuntime::default()));
        let usage = strategy.timeout_usage(&container_manifest(), 1500);
        assert_eq!(usage.duration_ms, 1500);
        assert_eq!(usage.memory_mb, Some(512));
        assert_eq!(usage.cpu_cores, Some(0.5));
    }
}
