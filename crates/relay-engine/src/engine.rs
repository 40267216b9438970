use std::sync::Arc;
use std::time::Duration;

use relay_common::{
    BackendAudit, EngineError, ExecutionContext, ExecutionRequest, ExecutionResult, Manifest,
    RoutingError,
};
use tokio::time::Instant;
use tracing::Instrument;

use crate::admission::AdmissionValidator;
use crate::assembler::{assemble, Outcome, ResultEmitter, Timing};
use crate::collaborators::{Identity, Registry, RetentionScheduler, Telemetry};
use crate::config::EngineConfig;
use crate::cost::{BackendKind, CostEstimator};
use crate::router::ExecutionRouter;

/// Validate → route → execute → cost → assemble → emit.
///
/// `execute` never fails: every outcome, including an unknown agent, comes
/// back as an [`ExecutionResult`] and is recorded exactly once.
pub struct Engine {
    registry: Arc<dyn Registry>,
    admission: AdmissionValidator,
    router: ExecutionRouter,
    estimator: CostEstimator,
    emitter: ResultEmitter,
    default_timeout: Duration,
}

pub struct EngineBuilder {
    config: EngineConfig,
    registry: Arc<dyn Registry>,
    identity: Arc<dyn Identity>,
    telemetry: Arc<dyn Telemetry>,
    retention: Option<Arc<dyn RetentionScheduler>>,
    router: ExecutionRouter,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn router(mut self, router: ExecutionRouter) -> Self {
        self.router = router;
        self
    }

    pub fn retention(mut self, retention: Arc<dyn RetentionScheduler>) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn build(self) -> Engine {
        tracing::debug!(strategies = ?self.router.registered(), "building engine");
        Engine {
            registry: self.registry,
            admission: AdmissionValidator::new(
                self.identity,
                self.telemetry.clone(),
                self.config.max_input_bytes,
            ),
            router: self.router,
            estimator: CostEstimator::new(self.config.cost_rates),
            emitter: ResultEmitter::new(self.telemetry, self.retention),
            default_timeout: self.config.default_timeout,
        }
    }
}

impl Engine {
    pub fn builder(
        registry: Arc<dyn Registry>,
        identity: Arc<dyn Identity>,
        telemetry: Arc<dyn Telemetry>,
    ) -> EngineBuilder {
        EngineBuilder {
            config: EngineConfig::default(),
            registry,
            identity,
            telemetry,
            retention: None,
            router: ExecutionRouter::new(),
        }
    }

    pub fn estimator(&self) -> &CostEstimator {
        &self.estimator
    }

    pub async fn execute(&self, req: ExecutionRequest) -> ExecutionResult {
        self.execute_context(ExecutionContext::new(req)).await
    }

    pub async fn execute_context(&self, ctx: ExecutionContext) -> ExecutionResult {
        let span = tracing::info_span!(
            "execute",
            execution_id = %ctx.execution_id,
            agent_id = %ctx.agent_id,
            execution_type = tracing::field::Empty,
        );
        self.run(ctx).instrument(span).await
    }

    /// Precedence: caller override, then manifest, then engine default.
    pub fn effective_timeout(&self, ctx: &ExecutionContext, manifest: &Manifest) -> Duration {
        ctx.runtime_overrides
            .timeout()
            .or_else(|| manifest.timeout())
            .unwrap_or(self.default_timeout)
    }

    async fn run(&self, ctx: ExecutionContext) -> ExecutionResult {
        let timing = Timing::start();
        let mut operations = vec!["lookup".to_string()];

        let manifest = match self.registry.get_manifest(&ctx.agent_id).await {
            Ok(Some(m)) => m,
            Ok(None) => {
                let outcome = Outcome::rejected(RoutingError::AgentNotFound(ctx.agent_id.clone()));
                return self.finish(&ctx, None, outcome, &timing, operations).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "registry lookup failed");
                let outcome = Outcome::rejected(RoutingError::AgentNotFound(ctx.agent_id.clone()));
                return self.finish(&ctx, None, outcome, &timing, operations).await;
            }
        };
        tracing::Span::current().record("execution_type", manifest.execution_type.as_str());

        operations.push("admission".to_string());
        if let Err(e) = self.admission.check(&ctx, &manifest).await {
            tracing::info!(kind = %e.kind(), reason = %e, "admission rejected");
            return self
                .finish(&ctx, Some(&manifest), Outcome::rejected(e), &timing, operations)
                .await;
        }

        operations.push("route".to_string());
        let strategy = match self.router.route(&manifest) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "no strategy for manifest");
                return self
                    .finish(&ctx, Some(&manifest), Outcome::rejected(e), &timing, operations)
                    .await;
            }
        };

        // Only a call that will reach a backend spends rate budget.
        if let Err(e) = self.admission.reserve(&manifest).await {
            tracing::info!(kind = %e.kind(), reason = %e, "admission rejected");
            return self
                .finish(&ctx, Some(&manifest), Outcome::rejected(e), &timing, operations)
                .await;
        }

        let kind = strategy.kind();
        let timeout = self.effective_timeout(&ctx, &manifest);
        operations.push(format!("execute:{kind}"));

        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, strategy.execute(&ctx, &manifest)).await {
            Ok(Ok(output)) => {
                let cost = self
                    .estimator
                    .estimate(&output.usage, BackendKind::for_manifest(kind, &manifest));
                Outcome::Completed { output, cost }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "backend failed");
                let calls = if e.reached_backend() {
                    strategy.targets(&ctx, &manifest)
                } else {
                    Vec::new()
                };
                Outcome::Failed {
                    error: e.into(),
                    usage: None,
                    cost: 0.0,
                    backend: Some(attempted(calls)),
                }
            }
            Err(_) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "execution timed out");
                let usage = strategy.timeout_usage(&manifest, elapsed_ms);
                let cost = self
                    .estimator
                    .estimate(&usage, BackendKind::for_manifest(kind, &manifest));
                Outcome::Failed {
                    error: EngineError::Timeout(timeout),
                    usage: Some(usage),
                    cost,
                    backend: Some(attempted(strategy.targets(&ctx, &manifest))),
                }
            }
        };
        operations.push("cost".to_string());

        self.finish(&ctx, Some(&manifest), outcome, &timing, operations)
            .await
    }

    async fn finish(
        &self,
        ctx: &ExecutionContext,
        manifest: Option<&Manifest>,
        outcome: Outcome,
        timing: &Timing,
        operations: Vec<String>,
    ) -> ExecutionResult {
        let result = assemble(outcome, ctx, manifest, timing, operations);
        self.emitter.emit(&result, ctx, manifest).await;

        tracing::info!(
            success = result.success,
            error_kind = result.error.as_ref().map(|e| e.kind.as_str()),
            duration_ms = result.metrics.duration_ms,
            cost = result.metrics.cost,
            "execution finished"
        );
        result
    }
}

fn attempted(calls: Vec<String>) -> BackendAudit {
    BackendAudit {
        data_sources_accessed: Vec::new(),
        external_apis_called: calls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::stub::{StubContainerRuntime, StubHttpInvoker, StubModelBackend};
    use crate::backend::HttpReply;
    use crate::collaborators::{AuditEvent, AuditOutcome, InvocationRecord};
    use crate::memory::{MemoryIdentity, MemoryRegistry, MemoryRetentionQueue, MemoryTelemetry};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use relay_common::{
        CallerIdentity, Deployment, ErrorKind, ExternalApi, ModelConfig, RateLimit,
        RuntimeOverrides,
    };
    use serde_json::{json, Map, Value};
    use std::collections::HashMap;

    struct Harness {
        engine: Engine,
        registry: Arc<MemoryRegistry>,
        identity: Arc<MemoryIdentity>,
        telemetry: Arc<MemoryTelemetry>,
        model: Arc<StubModelBackend>,
        http: Arc<StubHttpInvoker>,
        containers: Arc<StubContainerRuntime>,
    }

    fn harness_with(http: StubHttpInvoker, model: StubModelBackend) -> Harness {
        let registry = Arc::new(MemoryRegistry::new());
        let identity = Arc::new(MemoryIdentity::new());
        identity.grant_agent("u-1", crate::memory::ANY_AGENT);
        let telemetry = Arc::new(MemoryTelemetry::new());
        let model = Arc::new(model);
        let http = Arc::new(http);
        let containers = Arc::new(StubContainerRuntime::new(
            Duration::from_millis(2000),
            json!({"done": true}),
        ));

        let engine = Engine::builder(registry.clone(), identity.clone(), telemetry.clone())
            .router(ExecutionRouter::with_backends(
                model.clone(),
                http.clone(),
                containers.clone(),
            ))
            .build();

        Harness {
            engine,
            registry,
            identity,
            telemetry,
            model,
            http,
            containers,
        }
    }

    fn harness() -> Harness {
        harness_with(StubHttpInvoker::ok(json!({"ok": true})), StubModelBackend::new())
    }

    fn manifest(agent_id: &str, execution_type: &str, entrypoint: &str) -> Manifest {
        serde_json::from_value(json!({
            "agentId": agent_id,
            "executionType": execution_type,
            "entrypoint": entrypoint,
        }))
        .unwrap()
    }

    fn request(agent_id: &str, inputs: Value) -> ExecutionRequest {
        let inputs: Map<String, Value> = serde_json::from_value(inputs).unwrap();
        ExecutionRequest {
            agent_id: agent_id.into(),
            caller_identity: CallerIdentity {
                user_id: "u-1".into(),
                org_id: None,
                network_id: None,
            },
            inputs,
            runtime_overrides: RuntimeOverrides::default(),
        }
    }

    fn error_kind(result: &ExecutionResult) -> Option<ErrorKind> {
        result.error.as_ref().map(|e| e.kind)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixth_call_within_a_minute_is_rate_limited() {
        let h = harness();
        let mut m = manifest("a-rate", "webhook", "https://hooks.local/run");
        m.rate_limit = RateLimit {
            calls_per_minute: 5,
            calls_per_hour: 0,
        };
        h.registry.insert(m);

        for _ in 0..5 {
            let r = h.engine.execute(request("a-rate", json!({}))).await;
            assert!(r.success, "{:?}", r.error);
        }
        let r = h.engine.execute(request("a-rate", json!({}))).await;

        assert!(!r.success);
        assert_eq!(error_kind(&r), Some(ErrorKind::RateLimitExceeded));
        assert_eq!(r.metrics.duration_ms, 0);
        assert_eq!(r.metrics.cost, 0.0);
        assert_eq!(h.http.calls().await.len(), 5);
    }

    #[tokio::test]
    async fn test_prompt_template_reaches_backend() {
        let h = harness();
        let mut m = manifest("a-prompt", "prompt", "Hello {input.name}");
        m.model_config = Some(ModelConfig {
            provider: "openai".into(),
            model: Some("small-1".into()),
            parameters: Map::new(),
        });
        h.registry.insert(m);

        let r = h.engine.execute(request("a-prompt", json!({"name": "Ada"}))).await;

        assert!(r.success, "{:?}", r.error);
        let seen = h.model.requests().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].prompt, "Hello Ada");
        assert_eq!(r.metrics.token_count, Some(2));
        assert_eq!(r.metrics.cost, 2.0 * 0.000_002);
        assert_eq!(
            r.audit.operations_performed,
            vec!["lookup", "admission", "route", "execute:prompt", "cost"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_container_cost_from_declared_limits() {
        let h = harness();
        let mut m = manifest("a-box", "container", "run");
        m.deployment = Some(Deployment {
            image: "acme/box:1".into(),
            memory_mb: Some(512),
            cpu_cores: Some(0.5),
            env: HashMap::new(),
            command: None,
        });
        h.registry.insert(m);

        let r = h.engine.execute(request("a-box", json!({}))).await;

        assert!(r.success, "{:?}", r.error);
        assert_eq!(h.containers.runs(), 1);
        assert_eq!(r.metrics.memory_mb, Some(512));
        assert_eq!(r.metrics.cpu_cores, Some(0.5));
        let hours = 2000.0 / 3_600_000.0;
        let expected = 0.5 * hours * 0.01 + 0.5 * hours * 0.04;
        assert!((r.metrics.cost - expected).abs() < 1e-15, "{}", r.metrics.cost);
    }

    #[tokio::test(start_paused = true)]
    async fn test_webhook_past_manifest_timeout_fails_without_cost() {
        let h = harness_with(
            StubHttpInvoker::ok(json!({})).delayed(Duration::from_secs(301)),
            StubModelBackend::new(),
        );
        let mut m = manifest("a-slow", "webhook", "https://slow.local/run");
        m.execution.timeout_secs = Some(300);
        h.registry.insert(m);

        let r = h.engine.execute(request("a-slow", json!({}))).await;

        assert!(!r.success);
        assert_eq!(error_kind(&r), Some(ErrorKind::ExecutionTimeout));
        assert_eq!(r.metrics.cost, 0.0);
        assert_eq!(r.metrics.duration_ms, 300_000);
        assert_eq!(r.audit.external_calls_made, vec!["webhook:slow.local"]);
        assert_eq!(h.telemetry.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_webhook_still_audits_the_call() {
        let h = harness_with(
            StubHttpInvoker::replying(HttpReply {
                status: 500,
                body: json!("boom"),
                chargeable_units: None,
            }),
            StubModelBackend::new(),
        );
        h.registry.insert(manifest("a-hook", "webhook", "https://hooks.local/run"));
        h.registry.insert(manifest("a-bad", "webhook", "ftp://hooks.local/run"));

        let r = h.engine.execute(request("a-hook", json!({}))).await;
        assert_eq!(error_kind(&r), Some(ErrorKind::BackendError));
        assert_eq!(r.audit.external_calls_made, vec!["webhook:hooks.local"]);
        let events = h.telemetry.audit_events().await;
        assert_eq!(events[0].external_calls_made, vec!["webhook:hooks.local"]);

        let r = h.engine.execute(request("a-bad", json!({}))).await;
        assert_eq!(error_kind(&r), Some(ErrorKind::BackendError));
        assert!(r.audit.external_calls_made.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_override_shortens_timeout() {
        let h = harness_with(
            StubHttpInvoker::ok(json!({})).delayed(Duration::from_secs(10)),
            StubModelBackend::new(),
        );
        let mut m = manifest("a-slow", "webhook", "https://slow.local/run");
        m.execution.timeout_secs = Some(60);
        h.registry.insert(m);

        let mut req = request("a-slow", json!({}));
        req.runtime_overrides.timeout_secs = Some(2);
        let r = h.engine.execute(req).await;

        assert_eq!(error_kind(&r), Some(ErrorKind::ExecutionTimeout));
        assert_eq!(r.metrics.duration_ms, 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_container_timeout_bills_held_resources() {
        let h = harness();
        let mut m = manifest("a-box", "container", "run");
        m.execution.timeout_secs = Some(1);
        m.deployment = Some(Deployment {
            image: "acme/box:1".into(),
            memory_mb: Some(1024),
            cpu_cores: Some(1.0),
            env: HashMap::new(),
            command: None,
        });
        h.registry.insert(m);

        let r = h.engine.execute(request("a-box", json!({}))).await;

        assert_eq!(error_kind(&r), Some(ErrorKind::ExecutionTimeout));
        assert!(r.metrics.cost > 0.0);
        assert_eq!(r.metrics.memory_mb, Some(1024));
    }

    #[tokio::test]
    async fn test_unknown_execution_type_runs_nothing() {
        let h = harness();
        h.registry.insert(manifest("a-odd", "lambda", "https://x.local"));

        let r = h.engine.execute(request("a-odd", json!({}))).await;

        assert_eq!(error_kind(&r), Some(ErrorKind::UnsupportedExecutionType));
        assert!(h.http.calls().await.is_empty());
        assert!(h.model.requests().await.is_empty());
        assert_eq!(h.containers.runs(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_type_keeps_reporting_routing_error() {
        let h = harness();
        let mut m = manifest("a-odd", "lambda", "https://x.local");
        m.rate_limit = RateLimit {
            calls_per_minute: 2,
            calls_per_hour: 0,
        };
        h.registry.insert(m);

        for _ in 0..3 {
            let r = h.engine.execute(request("a-odd", json!({}))).await;
            assert_eq!(error_kind(&r), Some(ErrorKind::UnsupportedExecutionType));
        }
        assert_eq!(h.telemetry.get_window_count("a-odd", 60).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_agent_is_recorded() {
        let h = harness();
        let r = h.engine.execute(request("ghost", json!({}))).await;

        assert_eq!(error_kind(&r), Some(ErrorKind::AgentNotFound));
        let records = h.telemetry.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].agent_id, "ghost");
        assert!(records[0].agent_version.is_none());
        assert!(h.telemetry.summary("ghost").is_none());
        assert_eq!(h.telemetry.tracked_windows(), 0);
    }

    #[tokio::test]
    async fn test_every_call_emits_one_record_and_one_audit_event() {
        let h = harness_with(
            StubHttpInvoker::replying(HttpReply {
                status: 500,
                body: json!("boom"),
                chargeable_units: None,
            }),
            StubModelBackend::new(),
        );
        h.registry.insert(manifest("a-hook", "webhook", "https://h.local/x"));
        let mut locked = manifest("a-locked", "webhook", "https://h.local/x");
        locked.data_sources = vec![relay_common::DataSourceRef {
            id: "crm".into(),
            kind: None,
            access: relay_common::DataAccess::Read,
        }];
        h.registry.insert(locked);

        let results = vec![
            h.engine.execute(request("a-hook", json!({}))).await,
            h.engine.execute(request("a-locked", json!({}))).await,
            h.engine.execute(request("missing", json!({}))).await,
        ];

        let records = h.telemetry.records().await;
        let events = h.telemetry.audit_events().await;
        assert_eq!(records.len(), results.len());
        assert_eq!(events.len(), results.len());
        for (result, event) in results.iter().zip(&events) {
            assert!(result.is_consistent());
            assert_eq!(result.success, result.error.is_none());
            assert_eq!(event.execution_id, result.execution_id);
            assert_eq!(event.outcome, AuditOutcome::Failure);
        }
        assert_eq!(error_kind(&results[0]), Some(ErrorKind::BackendError));
        assert_eq!(error_kind(&results[1]), Some(ErrorKind::DataSourceDenied));
        assert!(events[1].security_relevant);
        assert!(!events[0].security_relevant);
    }

    #[tokio::test]
    async fn test_concurrent_burst_admits_at_most_the_limit() {
        let h = harness();
        let mut m = manifest("a-burst", "webhook", "https://h.local/x");
        m.rate_limit.calls_per_minute = 4;
        h.registry.insert(m);
        let engine = Arc::new(h.engine);

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.execute(request("a-burst", json!({}))).await })
            })
            .collect();

        let mut admitted = 0;
        for t in tasks {
            if t.await.unwrap().success {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 4);
        assert_eq!(h.http.calls().await.len(), 4);
        assert_eq!(h.telemetry.records().await.len(), 20);
    }

    #[tokio::test]
    async fn test_scoped_agent_requires_org_membership() {
        let h = harness();
        let mut m = manifest("a-org", "webhook", "https://h.local/x");
        m.access_scope.visibility = relay_common::Visibility::Organization;
        m.access_scope.org_id = Some("acme".into());
        h.registry.insert(m);

        let r = h.engine.execute(request("a-org", json!({}))).await;
        assert_eq!(error_kind(&r), Some(ErrorKind::PermissionDenied));

        h.identity.grant_org("u-1", "acme");
        let r = h.engine.execute(request("a-org", json!({}))).await;
        assert!(r.success, "{:?}", r.error);
    }

    #[tokio::test]
    async fn test_plugin_aggregates_dependencies() {
        let h = harness();
        let mut m = manifest("a-plug", "plugin", "lookup");
        m.dependencies.external_apis = vec![
            ExternalApi {
                name: "geo".into(),
                url: "https://geo.local".into(),
                method: "POST".into(),
            },
            ExternalApi {
                name: "fx".into(),
                url: "https://fx.local".into(),
                method: "GET".into(),
            },
        ];
        h.registry.insert(m);

        let r = h.engine.execute(request("a-plug", json!({}))).await;

        assert!(r.success, "{:?}", r.error);
        assert_eq!(r.output, json!({"geo": {"ok": true}, "fx": {"ok": true}}));
        assert_eq!(r.metrics.cost, 0.0);
        assert_eq!(r.audit.external_calls_made, vec!["plugin:geo", "plugin:fx"]);
    }

    #[tokio::test]
    async fn test_retention_is_scheduled_off_the_critical_path() {
        let queue = MemoryRetentionQueue::new();
        let registry = Arc::new(MemoryRegistry::new());
        let identity = Arc::new(MemoryIdentity::new());
        identity.grant_agent("u-1", "a-keep");
        let engine = Engine::builder(registry.clone(), identity, Arc::new(MemoryTelemetry::new()))
            .router(ExecutionRouter::with_backends(
                Arc::new(StubModelBackend::new()),
                Arc::new(StubHttpInvoker::ok(json!({}))),
                Arc::new(StubContainerRuntime::default()),
            ))
            .retention(Arc::new(queue.clone()))
            .build();
        let mut m = manifest("a-keep", "webhook", "https://h.local/x");
        m.security.retention_days = Some(30);
        registry.insert(m);

        let r = engine.execute(request("a-keep", json!({}))).await;
        assert!(r.success);
        assert!(r.compliance.retention_applied);

        let mut pending = Vec::new();
        for _ in 0..16 {
            pending = queue.pending().await;
            if !pending.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].execution_id, r.execution_id);
    }

    /// Admits everything but cannot store anything.
    struct WriteOnlyFailingTelemetry(MemoryTelemetry);

    #[async_trait]
    impl Telemetry for WriteOnlyFailingTelemetry {
        async fn record_invocation(&self, _: InvocationRecord) -> anyhow::Result<()> {
            Err(anyhow!("sink unavailable"))
        }
        async fn log_audit_event(&self, _: AuditEvent) -> anyhow::Result<()> {
            Err(anyhow!("sink unavailable"))
        }
        async fn get_window_count(&self, agent_id: &str, secs: u64) -> anyhow::Result<u64> {
            self.0.get_window_count(agent_id, secs).await
        }
        async fn update_performance_summary(&self, _: &str, _: u64, _: bool) -> anyhow::Result<()> {
            Err(anyhow!("sink unavailable"))
        }
        async fn reserve_slot(&self, agent_id: &str, limit: &RateLimit) -> anyhow::Result<bool> {
            self.0.reserve_slot(agent_id, limit).await
        }
    }

    #[tokio::test]
    async fn test_emission_failure_does_not_fail_the_call() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.insert(manifest("a-hook", "webhook", "https://h.local/x"));
        let identity = Arc::new(MemoryIdentity::new());
        identity.grant_agent("u-1", "a-hook");
        let engine = Engine::builder(
            registry,
            identity,
            Arc::new(WriteOnlyFailingTelemetry(MemoryTelemetry::new())),
        )
        .router(ExecutionRouter::with_backends(
            Arc::new(StubModelBackend::new()),
            Arc::new(StubHttpInvoker::ok(json!({"ok": 1}))),
            Arc::new(StubContainerRuntime::default()),
        ))
        .build();

        let r = engine.execute(request("a-hook", json!({}))).await;
        assert!(r.success, "{:?}", r.error);
        assert_eq!(r.output, json!({"ok": 1}));
    }
}
