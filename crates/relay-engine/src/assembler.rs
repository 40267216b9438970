//! Builds the uniform [`ExecutionResult`] and emits it to telemetry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use relay_common::{
    BackendAudit, ComplianceFlags, EngineError, ExecutionAudit, ExecutionContext, ExecutionMetrics,
    ExecutionResult, Manifest, PiiHandling, Usage,
};
use tokio::time::Instant;
use uuid::Uuid;

use crate::collaborators::{AuditEvent, AuditOutcome, InvocationRecord, RetentionScheduler, Telemetry};
use crate::strategy::StrategyOutput;

pub const AUDIT_ACTION: &str = "agent.execute";

/// Wall-clock start plus a monotonic anchor for the duration.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl Timing {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// How the pipeline ended.
#[derive(Debug)]
pub enum Outcome {
    Completed {
        output: StrategyOutput,
        cost: f64,
    },
    Failed {
        error: EngineError,
        /// Usage billed up to the failure, when any was incurred.
        usage: Option<Usage>,
        cost: f64,
        /// What the backend was asked to reach before the failure.
        backend: Option<BackendAudit>,
    },
}

impl Outcome {
    /// A failure before any backend work; nothing is billed.
    pub fn rejected(error: impl Into<EngineError>) -> Self {
        Self::Failed {
            error: error.into(),
            usage: None,
            cost: 0.0,
            backend: None,
        }
    }
}

pub fn compliance_flags(manifest: Option<&Manifest>) -> ComplianceFlags {
    match manifest {
        Some(m) => ComplianceFlags {
            retention_applied: m.security.retention_days.is_some(),
            encryption_used: true,
            pii_handled: m.security.pii_handling != PiiHandling::None,
            audit_logged: true,
        },
        None => ComplianceFlags {
            audit_logged: true,
            ..ComplianceFlags::default()
        },
    }
}

fn metrics(timing: &Timing, usage: Option<&Usage>, cost: f64) -> ExecutionMetrics {
    let duration_ms = timing.elapsed_ms();
    ExecutionMetrics {
        start: timing.started_at,
        end: timing.started_at + chrono::Duration::milliseconds(duration_ms as i64),
        duration_ms,
        token_count: usage.and_then(|u| u.token_count),
        memory_mb: usage.and_then(|u| u.memory_mb),
        cpu_cores: usage.and_then(|u| u.cpu_cores),
        cost,
    }
}

/// Declared data sources were only reached if the backend actually ran.
fn audit_trail(
    manifest: Option<&Manifest>,
    backend: Option<BackendAudit>,
    operations: Vec<String>,
) -> ExecutionAudit {
    let Some(backend) = backend else {
        return ExecutionAudit {
            operations_performed: operations,
            ..ExecutionAudit::default()
        };
    };
    let mut merged = BackendAudit {
        data_sources_accessed: manifest
            .map(|m| m.data_sources.iter().map(|d| d.id.clone()).collect())
            .unwrap_or_default(),
        external_apis_called: Vec::new(),
    };
    merged.merge(backend);
    ExecutionAudit {
        data_sources_accessed: merged.data_sources_accessed,
        operations_performed: operations,
        external_calls_made: merged.external_apis_called,
    }
}

pub fn assemble(
    outcome: Outcome,
    ctx: &ExecutionContext,
    manifest: Option<&Manifest>,
    timing: &Timing,
    operations: Vec<String>,
) -> ExecutionResult {
    let compliance = compliance_flags(manifest);
    match outcome {
        Outcome::Completed { output, cost } => ExecutionResult::succeeded(
            ctx.execution_id.clone(),
            output.raw_output,
            metrics(timing, Some(&output.usage), cost),
            audit_trail(manifest, Some(output.backend_audit), operations),
            compliance,
        ),
        Outcome::Failed {
            error,
            usage,
            cost,
            backend,
        } => {
            let attempted = matches!(error, EngineError::Backend(_) | EngineError::Timeout(_));
            let backend = backend.or_else(|| attempted.then(BackendAudit::default));
            ExecutionResult::failed(
                ctx.execution_id.clone(),
                error.to_execution_error(),
                metrics(timing, usage.as_ref(), cost),
                audit_trail(manifest, backend, operations),
                compliance,
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

/// Writes the single invocation record, audit event and summary update for
/// a finished call. Failures are logged and never change the result.
pub struct ResultEmitter {
    telemetry: Arc<dyn Telemetry>,
    retention: Option<Arc<dyn RetentionScheduler>>,
}

impl ResultEmitter {
    pub fn new(
        telemetry: Arc<dyn Telemetry>,
        retention: Option<Arc<dyn RetentionScheduler>>,
    ) -> Self {
        Self {
            telemetry,
            retention,
        }
    }

    pub async fn emit(
        &self,
        result: &ExecutionResult,
        ctx: &ExecutionContext,
        manifest: Option<&Manifest>,
    ) {
        let record = invocation_record(result, ctx, manifest);
        if let Err(e) = self.telemetry.record_invocation(record).await {
            tracing::error!(execution_id = %result.execution_id, error = %e, "failed to record invocation");
        }

        let event = audit_event(result, ctx);
        if let Err(e) = self.telemetry.log_audit_event(event).await {
            tracing::error!(execution_id = %result.execution_id, error = %e, "failed to log audit event");
        }

        // Summaries and retention only exist for registered agents.
        let Some(manifest) = manifest else {
            return;
        };

        if let Err(e) = self
            .telemetry
            .update_performance_summary(&ctx.agent_id, result.metrics.duration_ms, result.success)
            .await
        {
            tracing::warn!(agent_id = %ctx.agent_id, error = %e, "failed to update performance summary");
        }

        if let Some(days) = manifest.security.retention_days {
            self.schedule_retention(&result.execution_id, &ctx.agent_id, days);
        }
    }

    fn schedule_retention(&self, execution_id: &str, agent_id: &str, days: u32) {
        let Some(retention) = self.retention.clone() else {
            tracing::debug!(execution_id, "no retention scheduler configured");
            return;
        };
        let execution_id = execution_id.to_string();
        let agent_id = agent_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = retention.schedule_cleanup(&execution_id, &agent_id, days).await {
                tracing::warn!(%execution_id, error = %e, "failed to schedule retention cleanup");
            }
        });
    }
}

pub fn invocation_record(
    result: &ExecutionResult,
    ctx: &ExecutionContext,
    manifest: Option<&Manifest>,
) -> InvocationRecord {
    InvocationRecord {
        execution_id: result.execution_id.clone(),
        agent_id: ctx.agent_id.clone(),
        agent_version: manifest.map(|m| m.version.clone()),
        execution_type: manifest.map(|m| m.execution_type.clone()),
        user_id: ctx.caller_identity.user_id.clone(),
        org_id: ctx.caller_identity.org_id.clone(),
        success: result.success,
        error_kind: result.error.as_ref().map(|e| e.kind),
        started_at: result.metrics.start,
        finished_at: result.metrics.end,
        duration_ms: result.metrics.duration_ms,
        token_count: result.metrics.token_count,
        cost: result.metrics.cost,
    }
}

pub fn audit_event(result: &ExecutionResult, ctx: &ExecutionContext) -> AuditEvent {
    AuditEvent {
        id: Uuid::new_v4().to_string(),
        timestamp: result.metrics.end,
        execution_id: result.execution_id.clone(),
        agent_id: ctx.agent_id.clone(),
        user_id: ctx.caller_identity.user_id.clone(),
        org_id: ctx.caller_identity.org_id.clone(),
        action: AUDIT_ACTION.to_string(),
        outcome: if result.success {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        },
        error: result.error.clone(),
        security_relevant: result
            .error
            .as_ref()
            .is_some_and(|e| e.kind.is_security_relevant()),
        data_sources_accessed: result.audit.data_sources_accessed.clone(),
        operations_performed: result.audit.operations_performed.clone(),
        external_calls_made: result.audit.external_calls_made.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryRetentionQueue, MemoryTelemetry};
    use crate::strategy::fixtures::{context, manifest};
    use relay_common::{AdmissionError, BackendError, DataAccess, DataSourceRef, ErrorKind};
    use serde_json::{json, Value};

    fn with_sources(mut m: Manifest) -> Manifest {
        m.data_sources = vec![DataSourceRef {
            id: "crm".into(),
            kind: None,
            access: DataAccess::Read,
        }];
        m
    }

    #[test]
    fn test_success_result_carries_usage_and_compliance() {
        let mut m = with_sources(manifest("prompt", "hi"));
        m.security.pii_handling = PiiHandling::Mask;
        m.security.retention_days = Some(30);
        let ctx = context(json!({}));

        let out = StrategyOutput {
            raw_output: json!("hello"),
            usage: Usage {
                token_count: Some(12),
                ..Usage::duration_only(40)
            },
            backend_audit: BackendAudit {
                data_sources_accessed: vec!["crm".into(), "wiki".into()],
                external_apis_called: vec!["model:openai/small-1".into()],
            },
        };
        let result = assemble(
            Outcome::Completed { output: out, cost: 0.5 },
            &ctx,
            Some(&m),
            &Timing::start(),
            vec!["admission".into()],
        );

        assert!(result.success && result.is_consistent());
        assert_eq!(result.execution_id, ctx.execution_id);
        assert_eq!(result.metrics.token_count, Some(12));
        assert_eq!(result.metrics.cost, 0.5);
        assert_eq!(result.audit.data_sources_accessed, vec!["crm", "wiki"]);
        assert_eq!(result.audit.external_calls_made, vec!["model:openai/small-1"]);
        assert_eq!(
            result.compliance,
            ComplianceFlags {
                retention_applied: true,
                encryption_used: true,
                pii_handled: true,
                audit_logged: true,
            }
        );
    }

    #[test]
    fn test_admission_failure_touches_nothing() {
        let m = with_sources(manifest("prompt", "hi"));
        let result = assemble(
            Outcome::rejected(AdmissionError::PermissionDenied("no".into())),
            &context(json!({})),
            Some(&m),
            &Timing::start(),
            vec!["admission".into()],
        );
        assert!(!result.success && result.is_consistent());
        assert_eq!(result.output, Value::Null);
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(ErrorKind::PermissionDenied));
        assert_eq!(result.metrics.cost, 0.0);
        assert!(result.audit.data_sources_accessed.is_empty());
        assert!(!result.compliance.pii_handled);
    }

    #[test]
    fn test_backend_failure_records_declared_sources() {
        let m = with_sources(manifest("webhook", "http://h/x"));
        let result = assemble(
            Outcome::rejected(BackendError::Transport("reset".into())),
            &context(json!({})),
            Some(&m),
            &Timing::start(),
            Vec::new(),
        );
        assert_eq!(result.audit.data_sources_accessed, vec!["crm"]);
    }

    #[test]
    fn test_failed_call_keeps_attempted_targets() {
        let m = with_sources(manifest("webhook", "http://h/x"));
        let result = assemble(
            Outcome::Failed {
                error: BackendError::upstream(500, "boom").into(),
                usage: None,
                cost: 0.0,
                backend: Some(BackendAudit {
                    data_sources_accessed: Vec::new(),
                    external_apis_called: vec!["webhook:h".into()],
                }),
            },
            &context(json!({})),
            Some(&m),
            &Timing::start(),
            Vec::new(),
        );
        assert_eq!(result.audit.external_calls_made, vec!["webhook:h"]);
        assert_eq!(result.audit.data_sources_accessed, vec!["crm"]);
    }

    #[test]
    fn test_audit_event_flags_security_denials() {
        let ctx = context(json!({}));
        let result = assemble(
            Outcome::rejected(AdmissionError::DataSourceDenied("crm".into())),
            &ctx,
            None,
            &Timing::start(),
            Vec::new(),
        );
        let event = audit_event(&result, &ctx);
        assert!(event.security_relevant);
        assert_eq!(event.outcome, AuditOutcome::Failure);
        assert_eq!(event.action, AUDIT_ACTION);

        let record = invocation_record(&result, &ctx, None);
        assert_eq!(record.error_kind, Some(ErrorKind::DataSourceDenied));
        assert!(record.agent_version.is_none());
    }

    #[tokio::test]
    async fn test_emit_writes_once_and_schedules_retention() {
        let telemetry = Arc::new(MemoryTelemetry::new());
        let queue = MemoryRetentionQueue::new();
        let emitter = ResultEmitter::new(telemetry.clone(), Some(Arc::new(queue.clone())));
        let mut m = manifest("prompt", "hi");
        m.security.retention_days = Some(7);
        let ctx = context(json!({}));
        let result = assemble(
            Outcome::rejected(AdmissionError::SchemaViolation("x".into())),
            &ctx,
            Some(&m),
            &Timing::start(),
            Vec::new(),
        );

        emitter.emit(&result, &ctx, Some(&m)).await;

        assert_eq!(telemetry.records().await.len(), 1);
        assert_eq!(telemetry.audit_events().await.len(), 1);
        assert_eq!(telemetry.summary("agent-1").map(|s| s.failures), Some(1));

        let mut pending = Vec::new();
        for _ in 0..16 {
            pending = queue.pending().await;
            if !pending.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].execution_id, ctx.execution_id);
    }
}
