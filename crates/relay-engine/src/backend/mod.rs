//! Transports the strategies talk through. Each seam is a trait so that
//! strategies can be exercised against the stubs in [`stub`].

pub mod docker;
pub mod http;
pub mod openai;
pub mod stub;

use async_trait::async_trait;
use relay_common::{BackendError, Deployment, WebhookAuth};
use serde_json::{Map, Value};

pub use docker::DockerCliRuntime;
pub use http::ReqwestInvoker;
pub use openai::OpenAiCompatBackend;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub token_count: Option<u64>,
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn complete(&self, req: ModelRequest) -> Result<ModelResponse, BackendError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpCall {
    pub method: String,
    pub url: String,
    pub auth: WebhookAuth,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Value,
    /// Billable units the upstream reported for this call, if any.
    pub chargeable_units: Option<f64>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Header upstreams use to report billable units.
pub const CHARGEABLE_UNITS_HEADER: &str = "x-relay-chargeable-units";

#[async_trait]
pub trait HttpInvoker: Send + Sync {
    async fn call(&self, call: HttpCall) -> Result<HttpReply, BackendError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRun {
    pub output: Value,
    pub memory_mb: Option<u64>,
    pub cpu_cores: Option<f64>,
}

/// Runs one invocation inside a container. Dropping the returned future must
/// stop the container.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn run(
        &self,
        execution_id: &str,
        deployment: &Deployment,
        payload: &Value,
    ) -> Result<ContainerRun, BackendError>;
}

/// Parses backend text output as JSON, falling back to a JSON string.
pub(crate) fn parse_output(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output() {
        assert_eq!(parse_output(""), Value::Null);
        assert_eq!(parse_output(" {\"a\":1}\n"), serde_json::json!({"a": 1}));
        assert_eq!(parse_output("plain text\n"), Value::String("plain text".into()));
    }
}
