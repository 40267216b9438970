pub mod error;
pub mod execution_context;
pub mod execution_result;
pub mod manifest;
pub mod usage;

pub use error::{AdmissionError, BackendError, EngineError, ErrorKind, ExecutionError, RoutingError};
pub use execution_context::{CallerIdentity, ExecutionContext, ExecutionRequest, RuntimeOverrides};
pub use execution_result::{ComplianceFlags, ExecutionAudit, ExecutionMetrics, ExecutionResult};
pub use manifest::{
    AccessScope, DataAccess, DataSourceRef, Dependencies, Deployment, ExecutionSettings,
    ExecutionType, ExternalApi, InputSchema, Manifest, ModelConfig, PiiHandling, RateLimit,
    SecurityPolicy, Visibility, WebhookAuth,
};
pub use usage::{BackendAudit, Usage};

pub mod telemetry;
