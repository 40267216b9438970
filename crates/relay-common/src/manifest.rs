use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend family an agent executes on.
///
/// The manifest keeps the raw string so that versions carrying an execution
/// type this build does not know about can still be loaded and rejected at
/// routing time rather than at deserialization time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionType {
    Prompt,
    Webhook,
    Container,
    Plugin,
}

impl ExecutionType {
    pub const ALL: [ExecutionType; 4] = [
        ExecutionType::Prompt,
        ExecutionType::Webhook,
        ExecutionType::Container,
        ExecutionType::Plugin,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "prompt" => Some(Self::Prompt),
            "webhook" => Some(Self::Webhook),
            "container" => Some(Self::Container),
            "plugin" => Some(Self::Plugin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Webhook => "webhook",
            Self::Container => "container",
            Self::Plugin => "plugin",
        }
    }
}

impl fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Model provider, e.g. "openai". The literal "none" disables prompt execution.
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Provider-specific sampling parameters passed through to the backend.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ModelConfig {
    pub fn has_provider(&self) -> bool {
        let p = self.provider.trim();
        !p.is_empty() && !p.eq_ignore_ascii_case("none")
    }
}

/// Per-agent call budget. A zero bound means the window is unbounded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    #[serde(default)]
    pub calls_per_minute: u32,
    #[serde(default)]
    pub calls_per_hour: u32,
}

impl RateLimit {
    pub const MINUTE_SECS: u64 = 60;
    pub const HOUR_SECS: u64 = 3600;

    pub fn is_unbounded(&self) -> bool {
        self.calls_per_minute == 0 && self.calls_per_hour == 0
    }

    /// `(window_seconds, bound)` pairs for every bounded window.
    pub fn windows(&self) -> Vec<(u64, u32)> {
        let mut out = Vec::with_capacity(2);
        if self.calls_per_minute > 0 {
            out.push((Self::MINUTE_SECS, self.calls_per_minute));
        }
        if self.calls_per_hour > 0 {
            out.push((Self::HOUR_SECS, self.calls_per_hour));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum DataAccess {
    #[default]
    Read,
    Write,
    ReadWrite,
}

impl DataAccess {
    /// Whether a grant of `self` satisfies a requirement of `required`.
    pub fn covers(self, required: DataAccess) -> bool {
        matches!(
            (self, required),
            (Self::ReadWrite, _) | (Self::Read, Self::Read) | (Self::Write, Self::Write)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::ReadWrite => "readWrite",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub access: DataAccess,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PiiHandling {
    #[default]
    None,
    Mask,
    Redact,
    Encrypt,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicy {
    #[serde(default)]
    pub pii_handling: PiiHandling,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
    Organization,
    Network,
}

impl Visibility {
    pub fn is_scoped(self) -> bool {
        matches!(self, Self::Organization | Self::Network)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Organization => "organization",
            Self::Network => "network",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessScope {
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InputSchema {
    #[serde(default)]
    pub required: Vec<String>,
}

/// Credentials attached to outbound webhook calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WebhookAuth {
    #[default]
    None,
    Bearer {
        token: String,
    },
    ApiKey {
        header: String,
        key: String,
    },
    Basic {
        username: String,
        password: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<WebhookAuth>,
}

/// Container deployment backing a `container` agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<f64>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalApi {
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "POST".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Dependencies {
    #[serde(default)]
    pub external_apis: Vec<ExternalApi>,
}

/// Immutable per-version descriptor of an agent.
///
/// Supplied by the registry. Changing `execution_type` requires publishing a
/// new version; the engine never mutates a manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub agent_id: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub execution_type: String,
    #[serde(default)]
    pub entrypoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_config: Option<ModelConfig>,
    #[serde(default)]
    pub rate_limit: RateLimit,
    #[serde(default)]
    pub data_sources: Vec<DataSourceRef>,
    #[serde(default)]
    pub security: SecurityPolicy,
    #[serde(default)]
    pub access_scope: AccessScope,
    #[serde(default)]
    pub input_schema: InputSchema,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<Deployment>,
    #[serde(default)]
    pub dependencies: Dependencies,
}

fn default_version() -> String {
    "1".to_string()
}

impl Manifest {
    pub fn kind(&self) -> Option<ExecutionType> {
        ExecutionType::parse(&self.execution_type)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.execution.timeout_secs.map(Duration::from_secs)
    }

    pub fn provider(&self) -> Option<&str> {
        self.model_config.as_ref().map(|m| m.provider.as_str())
    }
}
