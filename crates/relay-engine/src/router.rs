use std::collections::HashMap;
use std::sync::Arc;

use relay_common::{ExecutionType, Manifest, RoutingError};

use crate::backend::{ContainerRuntime, HttpInvoker, ModelBackend};
use crate::strategy::{
    ContainerStrategy, ExecutionStrategy, PluginStrategy, PromptStrategy, WebhookStrategy,
};

/// Maps each execution type to the single strategy that serves it.
#[derive(Default, Clone)]
pub struct ExecutionRouter {
    strategies: HashMap<ExecutionType, Arc<dyn ExecutionStrategy>>,
}

impl ExecutionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with all four built-in strategies wired to the given backends.
    pub fn with_backends(
        model: Arc<dyn ModelBackend>,
        http: Arc<dyn HttpInvoker>,
        containers: Arc<dyn ContainerRuntime>,
    ) -> Self {
        let mut router = Self::new();
        router
            .register(Arc::new(PromptStrategy::new(model)))
            .register(Arc::new(WebhookStrategy::new(http.clone())))
            .register(Arc::new(ContainerStrategy::new(containers)))
            .register(Arc::new(PluginStrategy::new(http)));
        router
    }

    /// Registers `strategy` under its own kind, replacing any previous one.
    pub fn register(&mut self, strategy: Arc<dyn ExecutionStrategy>) -> &mut Self {
        self.strategies.insert(strategy.kind(), strategy);
        self
    }

    pub fn registered(&self) -> Vec<ExecutionType> {
        let mut kinds: Vec<_> = self.strategies.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    pub fn route(&self, manifest: &Manifest) -> Result<Arc<dyn ExecutionStrategy>, RoutingError> {
        ExecutionType::parse(&manifest.execution_type)
            .and_then(|kind| self.strategies.get(&kind).cloned())
            .ok_or_else(|| RoutingError::UnsupportedExecutionType(manifest.execution_type.clone()))
    }
}

impl std::fmt::Debug for ExecutionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRouter")
            .field("strategies", &self.registered())
            .finish()
    }
}
