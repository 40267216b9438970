use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExecutionError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "memoryMB")]
    pub memory_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<f64>,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionAudit {
    pub data_sources_accessed: Vec<String>,
    pub operations_performed: Vec<String>,
    pub external_calls_made: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceFlags {
    pub retention_applied: bool,
    pub encryption_used: bool,
    pub pii_handled: bool,
    pub audit_logged: bool,
}

/// Uniform envelope returned for every invocation, successful or not.
///
/// `success` is true exactly when `error` is `None`; the engine only builds
/// results through [`ExecutionResult::succeeded`] and [`ExecutionResult::failed`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub execution_id: String,
    pub success: bool,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    pub metrics: ExecutionMetrics,
    pub audit: ExecutionAudit,
    pub compliance: ComplianceFlags,
}

impl ExecutionResult {
    pub fn succeeded(
        execution_id: String,
        output: Value,
        metrics: ExecutionMetrics,
        audit: ExecutionAudit,
        compliance: ComplianceFlags,
    ) -> Self {
        Self {
            execution_id,
            success: true,
            output,
            error: None,
            metrics,
            audit,
            compliance,
        }
    }

    pub fn failed(
        execution_id: String,
        error: ExecutionError,
        metrics: ExecutionMetrics,
        audit: ExecutionAudit,
        compliance: ComplianceFlags,
    ) -> Self {
        Self {
            execution_id,
            success: false,
            output: Value::Null,
            error: Some(error),
            metrics,
            audit,
            compliance,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.success == self.error.is_none()
    }
}
