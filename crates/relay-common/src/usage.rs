use serde::{Deserialize, Serialize};

/// Resource usage reported by a strategy for one invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<f64>,
    pub duration_ms: u64,
    /// Explicit billable units reported by webhook/plugin backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chargeable_units: Option<f64>,
}

impl Usage {
    pub fn duration_only(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            ..Self::default()
        }
    }
}

/// What the backend touched while executing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackendAudit {
    #[serde(default)]
    pub data_sources_accessed: Vec<String>,
    #[serde(default)]
    pub external_apis_called: Vec<String>,
}

impl BackendAudit {
    pub fn merge(&mut self, other: BackendAudit) {
        for ds in other.data_sources_accessed {
            if !self.data_sources_accessed.contains(&ds) {
                self.data_sources_accessed.push(ds);
            }
        }
        self.external_apis_called.extend(other.external_apis_called);
    }
}
