//! Pre-flight gate run before any backend is touched.
//!
//! Checks run in a fixed order and stop at the first failure: rate budget,
//! agent permission, data-source entitlements, input schema. A rate slot is
//! reserved separately with [`AdmissionValidator::reserve`], once the caller
//! knows the call can actually run, so rejected calls never count against
//! the budget.

use std::sync::Arc;

use relay_common::{AdmissionError, ExecutionContext, Manifest, Visibility};

use crate::collaborators::{Identity, Telemetry};

pub struct AdmissionValidator {
    identity: Arc<dyn Identity>,
    telemetry: Arc<dyn Telemetry>,
    max_input_bytes: usize,
}

impl AdmissionValidator {
    pub fn new(
        identity: Arc<dyn Identity>,
        telemetry: Arc<dyn Telemetry>,
        max_input_bytes: usize,
    ) -> Self {
        Self {
            identity,
            telemetry,
            max_input_bytes,
        }
    }

    /// Runs every check and reserves a slot.
    pub async fn validate(
        &self,
        ctx: &ExecutionContext,
        manifest: &Manifest,
    ) -> Result<(), AdmissionError> {
        self.check(ctx, manifest).await?;
        self.reserve(manifest).await
    }

    /// Runs the checks without touching the rate budget.
    pub async fn check(
        &self,
        ctx: &ExecutionContext,
        manifest: &Manifest,
    ) -> Result<(), AdmissionError> {
        self.check_rate(manifest).await?;
        self.check_permission(ctx, manifest).await?;
        self.check_data_sources(ctx, manifest).await?;
        self.check_schema(ctx, manifest)
    }

    async fn check_rate(&self, manifest: &Manifest) -> Result<(), AdmissionError> {
        for (secs, bound) in manifest.rate_limit.windows() {
            let count = self
                .telemetry
                .get_window_count(&manifest.agent_id, secs)
                .await
                .map_err(|e| {
                    AdmissionError::RateLimitExceeded(format!("rate window unavailable: {e:#}"))
                })?;
            if count + 1 > u64::from(bound) {
                return Err(AdmissionError::RateLimitExceeded(format!(
                    "{count} calls in the last {secs}s (limit {bound})"
                )));
            }
        }
        Ok(())
    }

    async fn check_permission(
        &self,
        ctx: &ExecutionContext,
        manifest: &Manifest,
    ) -> Result<(), AdmissionError> {
        let user_id = ctx.user_id();
        let allowed = self
            .identity
            .has_agent_access(user_id, &manifest.agent_id)
            .await
            .map_err(|e| AdmissionError::PermissionDenied(format!("identity unavailable: {e:#}")))?;
        if !allowed {
            return Err(AdmissionError::PermissionDenied(format!(
                "user '{user_id}' is not entitled to agent '{}'",
                manifest.agent_id
            )));
        }

        let scope = &manifest.access_scope;
        if !scope.visibility.is_scoped() {
            return Ok(());
        }

        // A scope id pinned on the manifest wins over the caller's own.
        let scope_id = match scope.visibility {
            Visibility::Network => scope
                .network_id
                .as_deref()
                .or(ctx.caller_identity.network_id.as_deref()),
            _ => scope
                .org_id
                .as_deref()
                .or(ctx.caller_identity.org_id.as_deref()),
        };
        let Some(scope_id) = scope_id else {
            return Err(AdmissionError::PermissionDenied(format!(
                "{} agent requires a scope id",
                scope.visibility.as_str()
            )));
        };

        let in_scope = self
            .identity
            .has_org_access(user_id, scope_id, scope.visibility)
            .await
            .map_err(|e| AdmissionError::PermissionDenied(format!("identity unavailable: {e:#}")))?;
        if !in_scope {
            return Err(AdmissionError::PermissionDenied(format!(
                "user '{user_id}' is outside {} scope '{scope_id}'",
                scope.visibility.as_str()
            )));
        }
        Ok(())
    }

    async fn check_data_sources(
        &self,
        ctx: &ExecutionContext,
        manifest: &Manifest,
    ) -> Result<(), AdmissionError> {
        let org_id = ctx.caller_identity.org_id.as_deref();
        for source in &manifest.data_sources {
            let allowed = self
                .identity
                .has_data_source_access(ctx.user_id(), org_id, source)
                .await
                .map_err(|e| {
                    AdmissionError::DataSourceDenied(format!("identity unavailable: {e:#}"))
                })?;
            if !allowed {
                return Err(AdmissionError::DataSourceDenied(format!(
                    "{} access to '{}' not granted",
                    source.access.as_str(),
                    source.id
                )));
            }
        }
        Ok(())
    }

    fn check_schema(&self, ctx: &ExecutionContext, manifest: &Manifest) -> Result<(), AdmissionError> {
        let missing: Vec<&str> = manifest
            .input_schema
            .required
            .iter()
            .filter(|key| ctx.inputs.get(key.as_str()).map_or(true, |v| v.is_null()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(AdmissionError::SchemaViolation(format!(
                "missing required inputs: {}",
                missing.join(", ")
            )));
        }

        let size = serde_json::to_vec(&ctx.inputs)
            .map(|b| b.len())
            .map_err(|e| AdmissionError::SchemaViolation(format!("inputs not serializable: {e}")))?;
        if size > self.max_input_bytes {
            return Err(AdmissionError::SchemaViolation(format!(
                "inputs are {size} bytes, limit is {}",
                self.max_input_bytes
            )));
        }
        Ok(())
    }

    /// Atomically takes one slot in every bounded window.
    pub async fn reserve(&self, manifest: &Manifest) -> Result<(), AdmissionError> {
        let reserved = self
            .telemetry
            .reserve_slot(&manifest.agent_id, &manifest.rate_limit)
            .await
            .map_err(|e| {
                AdmissionError::RateLimitExceeded(format!("rate window unavailable: {e:#}"))
            })?;
        if reserved {
            Ok(())
        } else {
            Err(AdmissionError::RateLimitExceeded(
                "rate budget consumed by concurrent invocations".into(),
            ))
        }
    }
}
