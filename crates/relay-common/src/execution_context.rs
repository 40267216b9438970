use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeOverrides {
    /// Overrides the manifest timeout for this call only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
}

impl RuntimeOverrides {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Execution request as accepted from an entry point (HTTP, CLI, queue).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub agent_id: String,
    pub caller_identity: CallerIdentity,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub runtime_overrides: RuntimeOverrides,
}

/// Per-call bundle. Created once per request and never persisted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub execution_id: String,
    pub agent_id: String,
    pub caller_identity: CallerIdentity,
    pub inputs: Map<String, Value>,
    pub runtime_overrides: RuntimeOverrides,
}

impl ExecutionContext {
    pub fn new(req: ExecutionRequest) -> Self {
        Self {
            execution_id: format!("exec_{}", Uuid::new_v4()),
            agent_id: req.agent_id,
            caller_identity: req.caller_identity,
            inputs: req.inputs,
            runtime_overrides: req.runtime_overrides,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.caller_identity.user_id
    }
}

impl From<ExecutionRequest> for ExecutionContext {
    fn from(req: ExecutionRequest) -> Self {
        Self::new(req)
    }
}
