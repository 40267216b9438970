//! Contracts of the systems the engine consumes but does not own.
//!
//! Every collaborator is injected into [`crate::Engine`] as an `Arc<dyn …>`;
//! in-memory implementations live in [`crate::memory`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_common::{DataSourceRef, ErrorKind, ExecutionError, Manifest, RateLimit, Visibility};
use serde::{Deserialize, Serialize};

/// Source of agent manifests.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn get_manifest(&self, agent_id: &str) -> Result<Option<Manifest>>;
}

/// Entitlement and access-control queries.
#[async_trait]
pub trait Identity: Send + Sync {
    async fn has_agent_access(&self, user_id: &str, agent_id: &str) -> Result<bool>;

    /// `scope_id` is the organization or network id the agent is scoped to.
    async fn has_org_access(
        &self,
        user_id: &str,
        scope_id: &str,
        visibility: Visibility,
    ) -> Result<bool>;

    async fn has_data_source_access(
        &self,
        user_id: &str,
        org_id: Option<&str>,
        source: &DataSourceRef,
    ) -> Result<bool>;
}

/// System of record for invocations, audit events and rolling counters.
#[async_trait]
pub trait Telemetry: Send + Sync {
    async fn record_invocation(&self, record: InvocationRecord) -> Result<()>;

    async fn log_audit_event(&self, event: AuditEvent) -> Result<()>;

    /// Invocations of `agent_id` admitted in the trailing `window_secs`.
    async fn get_window_count(&self, agent_id: &str, window_secs: u64) -> Result<u64>;

    async fn update_performance_summary(
        &self,
        agent_id: &str,
        duration_ms: u64,
        success: bool,
    ) -> Result<()>;

    /// Atomically checks every bounded window of `limit` and, only if all of
    /// them have room, counts one more invocation. Returns `false` when the
    /// budget is exhausted; nothing is counted in that case.
    async fn reserve_slot(&self, agent_id: &str, limit: &RateLimit) -> Result<bool>;
}

/// Schedules deletion of invocation data once its retention period ends.
#[async_trait]
pub trait RetentionScheduler: Send + Sync {
    async fn schedule_cleanup(
        &self,
        execution_id: &str,
        agent_id: &str,
        retention_days: u32,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRecord {
    pub execution_id: String,
    pub agent_id: String,
    pub agent_version: Option<String>,
    pub execution_type: Option<String>,
    pub user_id: String,
    pub org_id: Option<String>,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub token_count: Option<u64>,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub execution_id: String,
    pub agent_id: String,
    pub user_id: String,
    pub org_id: Option<String>,
    pub action: String,
    pub outcome: AuditOutcome,
    pub error: Option<ExecutionError>,
    /// Set for permission and data-source denials.
    pub security_relevant: bool,
    pub data_sources_accessed: Vec<String>,
    pub operations_performed: Vec<String>,
    pub external_calls_made: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
    pub max_duration_ms: u64,
}

impl PerformanceSummary {
    pub fn observe(&mut self, duration_ms: u64, success: bool) {
        self.invocations += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_duration_ms = self.total_duration_ms.saturating_add(duration_ms);
        self.max_duration_ms = self.max_duration_ms.max(duration_ms);
    }

    pub fn avg_duration_ms(&self) -> f64 {
        if self.invocations == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.invocations as f64
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.invocations == 0 {
            0.0
        } else {
            self.successes as f64 / self.invocations as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_performance_summary_observe() {
        let mut s = PerformanceSummary::default();
        s.observe(100, true);
        s.observe(300, false);
        assert_eq!(s.invocations, 2);
        assert_eq!(s.failures, 1);
        assert_eq!(s.max_duration_ms, 300);
        assert_eq!(s.avg_duration_ms(), 200.0);
        assert_eq!(s.success_rate(), 0.5);
    }
}
