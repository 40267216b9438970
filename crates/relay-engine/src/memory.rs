//! In-process collaborator implementations, used by the gateway and as test doubles.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use relay_common::{DataAccess, DataSourceRef, Manifest, RateLimit, Visibility};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::collaborators::{
    AuditEvent, Identity, InvocationRecord, PerformanceSummary, Registry, RetentionScheduler,
    Telemetry,
};

/// Wildcard grant matching every agent id.
pub const ANY_AGENT: &str = "*";

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    manifests: DashMap<String, Manifest>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_manifests(manifests: impl IntoIterator<Item = Manifest>) -> Self {
        let reg = Self::new();
        for m in manifests {
            reg.insert(m);
        }
        reg
    }

    /// Publishes `manifest` as the current version of its agent.
    pub fn insert(&self, manifest: Manifest) {
        self.manifests.insert(manifest.agent_id.clone(), manifest);
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn get_manifest(&self, agent_id: &str) -> Result<Option<Manifest>> {
        Ok(self.manifests.get(agent_id).map(|m| m.value().clone()))
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Serializable grant table, keyed by user id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grants {
    #[serde(default)]
    pub agents: HashMap<String, HashSet<String>>,
    #[serde(default)]
    pub orgs: HashMap<String, HashSet<String>>,
    #[serde(default)]
    pub networks: HashMap<String, HashSet<String>>,
    #[serde(default)]
    pub data_sources: HashMap<String, HashMap<String, DataAccess>>,
}

#[derive(Debug, Default)]
pub struct MemoryIdentity {
    grants: std::sync::RwLock<Grants>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_grants(grants: Grants) -> Self {
        Self {
            grants: std::sync::RwLock::new(grants),
        }
    }

    pub fn grant_agent(&self, user_id: &str, agent_id: &str) -> &Self {
        self.write(|g| {
            g.agents
                .entry(user_id.to_string())
                .or_default()
                .insert(agent_id.to_string());
        });
        self
    }

    pub fn grant_org(&self, user_id: &str, org_id: &str) -> &Self {
        self.write(|g| {
            g.orgs
                .entry(user_id.to_string())
                .or_default()
                .insert(org_id.to_string());
        });
        self
    }

    pub fn grant_network(&self, user_id: &str, network_id: &str) -> &Self {
        self.write(|g| {
            g.networks
                .entry(user_id.to_string())
                .or_default()
                .insert(network_id.to_string());
        });
        self
    }

    pub fn grant_data_source(&self, user_id: &str, source_id: &str, access: DataAccess) -> &Self {
        self.write(|g| {
            g.data_sources
                .entry(user_id.to_string())
                .or_default()
                .insert(source_id.to_string(), access);
        });
        self
    }

    fn write(&self, f: impl FnOnce(&mut Grants)) {
        let mut guard = self
            .grants
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard);
    }

    fn read<T>(&self, f: impl FnOnce(&Grants) -> T) -> T {
        let guard = self
            .grants
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }
}

#[async_trait]
impl Identity for MemoryIdentity {
    async fn has_agent_access(&self, user_id: &str, agent_id: &str) -> Result<bool> {
        Ok(self.read(|g| {
            g.agents
                .get(user_id)
                .map(|set| set.contains(agent_id) || set.contains(ANY_AGENT))
                .unwrap_or(false)
        }))
    }

    async fn has_org_access(
        &self,
        user_id: &str,
        scope_id: &str,
        visibility: Visibility,
    ) -> Result<bool> {
        Ok(self.read(|g| {
            let table = match visibility {
                Visibility::Network => &g.networks,
                _ => &g.orgs,
            };
            table
                .get(user_id)
                .map(|set| set.contains(scope_id))
                .unwrap_or(false)
        }))
    }

    async fn has_data_source_access(
        &self,
        user_id: &str,
        _org_id: Option<&str>,
        source: &DataSourceRef,
    ) -> Result<bool> {
        Ok(self.read(|g| {
            g.data_sources
                .get(user_id)
                .and_then(|m| m.get(&source.id))
                .map(|granted| granted.covers(source.access))
                .unwrap_or(false)
        }))
    }
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

const LONGEST_WINDOW: Duration = Duration::from_secs(RateLimit::HOUR_SECS);

/// Records and audit events kept before the oldest are evicted.
pub const DEFAULT_HISTORY: usize = 10_000;

/// Keeps records, audit events, rolling admission windows and per-agent
/// performance summaries in memory.
///
/// Records and audit events are bounded rings of `history` entries each.
#[derive(Debug)]
pub struct MemoryTelemetry {
    history: usize,
    records: RwLock<VecDeque<InvocationRecord>>,
    audit: RwLock<VecDeque<AuditEvent>>,
    windows: DashMap<String, VecDeque<Instant>>,
    summaries: DashMap<String, PerformanceSummary>,
}

impl Default for MemoryTelemetry {
    fn default() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history: usize) -> Self {
        Self {
            history: history.max(1),
            records: RwLock::default(),
            audit: RwLock::default(),
            windows: DashMap::new(),
            summaries: DashMap::new(),
        }
    }

    pub async fn records(&self) -> Vec<InvocationRecord> {
        self.records.read().await.iter().cloned().collect()
    }

    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit.read().await.iter().cloned().collect()
    }

    /// Drops windows with no admission inside the longest window.
    /// Returns how many agents were forgotten.
    pub fn sweep_windows(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            Self::prune(window, now);
            !window.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }

    fn push_bounded<T>(ring: &mut VecDeque<T>, item: T, cap: usize) {
        while ring.len() >= cap {
            ring.pop_front();
        }
        ring.push_back(item);
    }

    pub fn summary(&self, agent_id: &str) -> Option<PerformanceSummary> {
        self.summaries.get(agent_id).map(|s| s.value().clone())
    }

    /// Drops every stored record and audit event for `execution_id`.
    /// Returns how many entries were removed.
    pub async fn purge_execution(&self, execution_id: &str) -> usize {
        let mut removed = 0;
        {
            let mut records = self.records.write().await;
            let before = records.len();
            records.retain(|r| r.execution_id != execution_id);
            removed += before - records.len();
        }
        {
            let mut audit = self.audit.write().await;
            let before = audit.len();
            audit.retain(|e| e.execution_id != execution_id);
            removed += before - audit.len();
        }
        removed
    }

    fn prune(window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= LONGEST_WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    fn count_within(window: &VecDeque<Instant>, now: Instant, secs: u64) -> u64 {
        let span = Duration::from_secs(secs);
        window
            .iter()
            .rev()
            .take_while(|t| now.duration_since(**t) < span)
            .count() as u64
    }
}

#[async_trait]
impl Telemetry for MemoryTelemetry {
    async fn record_invocation(&self, record: InvocationRecord) -> Result<()> {
        Self::push_bounded(&mut *self.records.write().await, record, self.history);
        Ok(())
    }

    async fn log_audit_event(&self, event: AuditEvent) -> Result<()> {
        if event.security_relevant {
            tracing::warn!(
                execution_id = %event.execution_id,
                agent_id = %event.agent_id,
                user_id = %event.user_id,
                "security-relevant denial recorded"
            );
        }
        Self::push_bounded(&mut *self.audit.write().await, event, self.history);
        Ok(())
    }

    async fn get_window_count(&self, agent_id: &str, window_secs: u64) -> Result<u64> {
        let now = Instant::now();
        Ok(self
            .windows
            .get(agent_id)
            .map(|w| Self::count_within(&w, now, window_secs))
            .unwrap_or(0))
    }

    async fn update_performance_summary(
        &self,
        agent_id: &str,
        duration_ms: u64,
        success: bool,
    ) -> Result<()> {
        self.summaries
            .entry(agent_id.to_string())
            .or_default()
            .observe(duration_ms, success);
        Ok(())
    }

    async fn reserve_slot(&self, agent_id: &str, limit: &RateLimit) -> Result<bool> {
        let now = Instant::now();
        // The entry guard holds the shard lock, so check and increment are one step.
        let mut window = self.windows.entry(agent_id.to_string()).or_default();
        Self::prune(&mut window, now);

        for (secs, bound) in limit.windows() {
            if Self::count_within(&window, now, secs) + 1 > u64::from(bound) {
                return Ok(false);
            }
        }

        window.push_back(now);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionEntry {
    pub execution_id: String,
    pub agent_id: String,
    pub purge_at: DateTime<Utc>,
}

/// Pending cleanups, drained by a sweeper once they fall due.
#[derive(Debug, Default, Clone)]
pub struct MemoryRetentionQueue {
    entries: Arc<RwLock<Vec<RetentionEntry>>>,
}

impl MemoryRetentionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pending(&self) -> Vec<RetentionEntry> {
        self.entries.read().await.clone()
    }

    /// Removes and returns every entry due at or before `now`.
    pub async fn drain_due(&self, now: DateTime<Utc>) -> Vec<RetentionEntry> {
        let mut entries = self.entries.write().await;
        let (due, keep): (Vec<_>, Vec<_>) = entries.drain(..).partition(|e| e.purge_at <= now);
        *entries = keep;
        due
    }
}

#[async_trait]
impl RetentionScheduler for MemoryRetentionQueue {
    async fn schedule_cleanup(
        &self,
        execution_id: &str,
        agent_id: &str,
        retention_days: u32,
    ) -> Result<()> {
        let purge_at = Utc::now() + chrono::Duration::days(i64::from(retention_days));
        self.entries.write().await.push(RetentionEntry {
            execution_id: execution_id.to_string(),
            agent_id: agent_id.to_string(),
            purge_at,
        });
        Ok(())
    }
}
