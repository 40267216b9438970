use std::collections::HashMap;

use relay_common::{ExecutionType, Manifest, Usage};
use serde::{Deserialize, Serialize};

const MS_PER_HOUR: f64 = 3_600_000.0;
const MB_PER_GB: f64 = 1024.0;

/// Price sheet used by [`CostEstimator`]. All rates are in the same currency unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostRates {
    /// Price per token keyed by lower-case provider name.
    #[serde(default = "default_per_token")]
    pub per_token: HashMap<String, f64>,
    /// Price per token for providers missing from `per_token`.
    #[serde(default = "default_token_rate")]
    pub default_token_rate: f64,
    /// Price per GB of memory held for one hour.
    #[serde(default = "default_memory_rate")]
    pub memory_gb_hour: f64,
    /// Price per CPU core held for one hour.
    #[serde(default = "default_cpu_rate")]
    pub cpu_core_hour: f64,
    /// Price per chargeable unit reported by webhook/plugin backends.
    #[serde(default)]
    pub chargeable_unit_rate: f64,
}

fn default_per_token() -> HashMap<String, f64> {
    HashMap::from([
        ("openai".to_string(), 0.000_002),
        ("anthropic".to_string(), 0.000_003),
        ("google".to_string(), 0.000_001_25),
    ])
}

fn default_token_rate() -> f64 {
    0.000_002
}

fn default_memory_rate() -> f64 {
    0.01
}

fn default_cpu_rate() -> f64 {
    0.04
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            per_token: default_per_token(),
            default_token_rate: default_token_rate(),
            memory_gb_hour: default_memory_rate(),
            cpu_core_hour: default_cpu_rate(),
            chargeable_unit_rate: 0.0,
        }
    }
}

impl CostRates {
    pub fn token_rate(&self, provider: &str) -> f64 {
        self.per_token
            .get(&provider.trim().to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_token_rate)
    }
}

/// Billing family of a backend, carrying what the price lookup needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind<'a> {
    Prompt { provider: &'a str },
    Webhook,
    Container,
    Plugin,
}

impl<'a> BackendKind<'a> {
    pub fn for_manifest(kind: ExecutionType, manifest: &'a Manifest) -> Self {
        match kind {
            ExecutionType::Prompt => BackendKind::Prompt {
                provider: manifest.provider().unwrap_or_default(),
            },
            ExecutionType::Webhook => BackendKind::Webhook,
            ExecutionType::Container => BackendKind::Container,
            ExecutionType::Plugin => BackendKind::Plugin,
        }
    }
}

/// Maps resource usage to monetary cost. Pure: no I/O, no clocks.
#[derive(Debug, Clone, Default)]
pub struct CostEstimator {
    rates: CostRates,
}

impl CostEstimator {
    pub fn new(rates: CostRates) -> Self {
        Self { rates }
    }

    pub fn rates(&self) -> &CostRates {
        &self.rates
    }

    pub fn estimate(&self, usage: &Usage, kind: BackendKind<'_>) -> f64 {
        let cost = match kind {
            BackendKind::Prompt { provider } => {
                usage.token_count.unwrap_or(0) as f64 * self.rates.token_rate(provider)
            }
            BackendKind::Container => {
                let hours = usage.duration_ms as f64 / MS_PER_HOUR;
                let memory_gb = usage.memory_mb.unwrap_or(0) as f64 / MB_PER_GB;
                let cpu = non_negative(usage.cpu_cores.unwrap_or(0.0));
                memory_gb * hours * self.rates.memory_gb_hour + cpu * hours * self.rates.cpu_core_hour
            }
            BackendKind::Webhook | BackendKind::Plugin => {
                non_negative(usage.chargeable_units.unwrap_or(0.0)) * self.rates.chargeable_unit_rate
            }
        };
        non_negative(cost)
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}
