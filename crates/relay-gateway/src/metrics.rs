use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use relay_common::{ErrorKind, ExecutionResult};

use crate::state::AppState;

#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub requests_inflight: AtomicU64,
    pub status_2xx: AtomicU64,
    pub status_4xx: AtomicU64,
    pub status_5xx: AtomicU64,
    pub executions_total: AtomicU64,
    pub executions_succeeded: AtomicU64,
    /// Indexed like `ErrorKind::ALL`.
    failures: [AtomicU64; ErrorKind::ALL.len()],
}

impl Metrics {
    pub fn observe(&self, result: &ExecutionResult) {
        self.executions_total.fetch_add(1, Ordering::Relaxed);
        match &result.error {
            None => {
                self.executions_succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Some(err) => {
                if let Some(idx) = ErrorKind::ALL.iter().position(|k| *k == err.kind) {
                    self.failures[idx].fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub fn failures(&self, kind: ErrorKind) -> u64 {
        ErrorKind::ALL
            .iter()
            .position(|k| *k == kind)
            .map(|idx| self.failures[idx].load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

fn counter(body: &mut String, name: &str, help: &str, value: u64) {
    let _ = write!(
        body,
        "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
    );
}

pub fn render_metrics(metrics: &Metrics) -> String {
    let mut body = String::new();

    counter(
        &mut body,
        "relay_gateway_requests_total",
        "Total requests handled by gateway.",
        metrics.requests_total.load(Ordering::Relaxed),
    );
    let _ = write!(
        body,
        "# HELP relay_gateway_requests_inflight Currently in-flight requests.\n\
         # TYPE relay_gateway_requests_inflight gauge\n\
         relay_gateway_requests_inflight {}\n",
        metrics.requests_inflight.load(Ordering::Relaxed),
    );
    counter(
        &mut body,
        "relay_gateway_responses_2xx",
        "Total 2xx responses.",
        metrics.status_2xx.load(Ordering::Relaxed),
    );
    counter(
        &mut body,
        "relay_gateway_responses_4xx",
        "Total 4xx responses.",
        metrics.status_4xx.load(Ordering::Relaxed),
    );
    counter(
        &mut body,
        "relay_gateway_responses_5xx",
        "Total 5xx responses.",
        metrics.status_5xx.load(Ordering::Relaxed),
    );
    counter(
        &mut body,
        "relay_executions_total",
        "Agent invocations processed.",
        metrics.executions_total.load(Ordering::Relaxed),
    );
    counter(
        &mut body,
        "relay_executions_succeeded_total",
        "Agent invocations that completed successfully.",
        metrics.executions_succeeded.load(Ordering::Relaxed),
    );

    body.push_str(
        "# HELP relay_executions_failed_total Failed agent invocations by error kind.\n\
         # TYPE relay_executions_failed_total counter\n",
    );
    for kind in ErrorKind::ALL {
        let _ = writeln!(
            body,
            "relay_executions_failed_total{{kind=\"{}\"}} {}",
            kind.as_str(),
            metrics.failures(kind),
        );
    }

    body
}

pub async fn metrics_handler(State(st): State<AppState>) -> impl IntoResponse {
    let body = render_metrics(&st.metrics);
    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

pub async fn track_requests(
    State(st): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, std::convert::Infallible> {
    st.metrics.requests_inflight.fetch_add(1, Ordering::Relaxed);
    let resp = next.run(req).await;
    st.metrics.requests_inflight.fetch_sub(1, Ordering::Relaxed);
    st.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

    let status = resp.status().as_u16();
    if status >= 500 {
        st.metrics.status_5xx.fetch_add(1, Ordering::Relaxed);
    } else if status >= 400 {
        st.metrics.status_4xx.fetch_add(1, Ordering::Relaxed);
    } else if status >= 200 {
        st.metrics.status_2xx.fetch_add(1, Ordering::Relaxed);
    }

    Ok(resp)
}
