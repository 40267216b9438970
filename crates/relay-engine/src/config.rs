use std::time::Duration;

use anyhow::Context;

use crate::cost::CostRates;

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_INPUT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on the serialized size of `inputs`.
    pub max_input_bytes: usize,
    /// Applied when neither the caller nor the manifest sets a timeout.
    pub default_timeout: Duration,
    pub cost_rates: CostRates,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cost_rates: CostRates::default(),
        }
    }
}

impl EngineConfig {
    /// Reads `RELAY_MAX_INPUT_BYTES`, `RELAY_DEFAULT_TIMEOUT_SECS` and
    /// `RELAY_COST_RATES_PATH` (a JSON `CostRates` document).
    pub fn from_env() -> anyhow::Result<Self> {
        let mut cfg = Self::default();

        if let Some(v) = env_parse::<usize>("RELAY_MAX_INPUT_BYTES") {
            cfg.max_input_bytes = v;
        }
        if let Some(v) = env_parse::<u64>("RELAY_DEFAULT_TIMEOUT_SECS") {
            cfg.default_timeout = Duration::from_secs(v.max(1));
        }
        if let Ok(path) = std::env::var("RELAY_COST_RATES_PATH") {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading cost rates from {path}"))?;
            cfg.cost_rates = serde_json::from_str(&raw)
                .with_context(|| format!("parsing cost rates in {path}"))?;
        }

        Ok(cfg)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable engine setting");
            None
        }
    }
}
