use std::time::Duration;

use async_trait::async_trait;
use relay_common::{BackendError, WebhookAuth};
use reqwest::Method;

use super::{parse_output, HttpCall, HttpInvoker, HttpReply, CHARGEABLE_UNITS_HEADER};

/// Outbound HTTP for webhook and plugin agents.
///
/// No request timeout is set on the client: the engine bounds every call and
/// cancels it by dropping the future.
#[derive(Debug, Clone)]
pub struct ReqwestInvoker {
    http: reqwest::Client,
}

impl ReqwestInvoker {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpInvoker for ReqwestInvoker {
    async fn call(&self, call: HttpCall) -> Result<HttpReply, BackendError> {
        let method = Method::from_bytes(call.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| BackendError::Misconfigured(format!("invalid HTTP method '{}'", call.method)))?;

        let mut rb = self.http.request(method.clone(), &call.url);
        if method != Method::GET && method != Method::HEAD {
            rb = rb.json(&call.body);
        }
        rb = match &call.auth {
            WebhookAuth::None => rb,
            WebhookAuth::Bearer { token } => rb.bearer_auth(token),
            WebhookAuth::ApiKey { header, key } => rb.header(header.as_str(), key.as_str()),
            WebhookAuth::Basic { username, password } => rb.basic_auth(username, Some(password)),
        };

        let resp = rb.send().await.map_err(|e| {
            if e.is_builder() {
                BackendError::Misconfigured(e.to_string())
            } else {
                BackendError::Transport(e.to_string())
            }
        })?;

        let status = resp.status().as_u16();
        let chargeable_units = resp
            .headers()
            .get(CHARGEABLE_UNITS_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok());

        let text = resp
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(HttpReply {
            status,
            body: parse_output(&text),
            chargeable_units,
        })
    }
}
