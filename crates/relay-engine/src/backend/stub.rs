//! Deterministic backends for tests and local runs without real upstreams.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use relay_common::{BackendError, Deployment};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{
    ContainerRun, ContainerRuntime, HttpCall, HttpInvoker, HttpReply, ModelBackend, ModelRequest,
    ModelResponse,
};

/// Echoes the prompt back and counts one token per whitespace-separated word.
#[derive(Debug, Default)]
pub struct StubModelBackend {
    delay: Option<Duration>,
    prompts: Mutex<Vec<ModelRequest>>,
}

impl StubModelBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl ModelBackend for StubModelBackend {
    async fn complete(&self, req: ModelRequest) -> Result<ModelResponse, BackendError> {
        self.prompts.lock().await.push(req.clone());
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        Ok(ModelResponse {
            token_count: Some(req.prompt.split_whitespace().count() as u64),
            text: req.prompt,
        })
    }
}

/// Returns a fixed reply (or error) for every call and records what it saw.
#[derive(Debug)]
pub struct StubHttpInvoker {
    reply: Result<HttpReply, BackendError>,
    delay: Option<Duration>,
    calls: Mutex<Vec<HttpCall>>,
}

impl StubHttpInvoker {
    pub fn replying(reply: HttpReply) -> Self {
        Self {
            reply: Ok(reply),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::replying(HttpReply {
            status: 200,
            body,
            chargeable_units: None,
        })
    }

    pub fn failing(err: BackendError) -> Self {
        Self {
            reply: Err(err),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn calls(&self) -> Vec<HttpCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl HttpInvoker for StubHttpInvoker {
    async fn call(&self, call: HttpCall) -> Result<HttpReply, BackendError> {
        self.calls.lock().await.push(call);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.reply.clone()
    }
}

/// Reports the deployment's declared limits as usage and sleeps for `runtime`.
#[derive(Debug, Default)]
pub struct StubContainerRuntime {
    runtime: Duration,
    output: Value,
    runs: AtomicU64,
}

impl StubContainerRuntime {
    pub fn new(runtime: Duration, output: Value) -> Self {
        Self {
            runtime,
            output,
            runs: AtomicU64::new(0),
        }
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ContainerRuntime for StubContainerRuntime {
    async fn run(
        &self,
        _execution_id: &str,
        deployment: &Deployment,
        _payload: &Value,
    ) -> Result<ContainerRun, BackendError> {
        self.runs.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.runtime).await;
        Ok(ContainerRun {
            output: self.output.clone(),
            memory_mb: deployment.memory_mb,
            cpu_cores: deployment.cpu_cores,
        })
    }
}
