//! Agent execution dispatch and admission.
//!
//! [`Engine`] takes an [`ExecutionRequest`](relay_common::ExecutionRequest),
//! checks it against the agent's manifest, runs it through the matching
//! [`strategy::ExecutionStrategy`] and returns a uniform
//! [`ExecutionResult`](relay_common::ExecutionResult) with cost, audit and
//! compliance metadata.

pub mod admission;
pub mod assembler;
pub mod backend;
pub mod collaborators;
pub mod config;
pub mod cost;
pub mod engine;
pub mod memory;
pub mod router;
pub mod strategy;

pub use admission::AdmissionValidator;
pub use collaborators::{
    AuditEvent, AuditOutcome, Identity, InvocationRecord, PerformanceSummary, Registry,
    RetentionScheduler, Telemetry,
};
pub use config::EngineConfig;
pub use cost::{BackendKind, CostEstimator, CostRates};
pub use engine::{Engine, EngineBuilder};
pub use router::ExecutionRouter;
pub use strategy::{ExecutionStrategy, StrategyOutput};
