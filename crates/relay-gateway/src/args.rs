use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    #[arg(long, env = "RELAY_GATEWAY_ADDR", default_value = "0.0.0.0:8090")]
    pub listen_addr: String,

    /// JSON array of agent manifests served by the in-memory registry.
    #[arg(long, env = "RELAY_MANIFESTS")]
    pub manifests: Option<PathBuf>,

    /// JSON grants document (agents, orgs, networks, dataSources per user).
    #[arg(long, env = "RELAY_GRANTS")]
    pub grants: Option<PathBuf>,

    /// Base URL of an OpenAI-compatible model server. Prompt agents echo
    /// their rendered prompt when unset.
    #[arg(long, env = "RELAY_MODEL_BASE_URL")]
    pub model_base_url: Option<String>,

    #[arg(long, env = "RELAY_MODEL_API_KEY")]
    pub model_api_key: Option<String>,

    #[arg(long, env = "RELAY_DOCKER_BIN", default_value = "docker")]
    pub docker_bin: String,

    /// How often due retention cleanups are applied.
    #[arg(long, env = "RELAY_RETENTION_SWEEP_SECS", default_value_t = 60)]
    pub retention_sweep_secs: u64,

    /// Invocation records and audit events kept in memory, oldest evicted first.
    #[arg(long, env = "RELAY_TELEMETRY_HISTORY", default_value_t = 10_000)]
    pub telemetry_history: usize,

    /// OTLP endpoint for exporting traces.
    #[arg(long, env = "RELAY_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "RELAY_OTLP_TOKEN")]
    pub otlp_token: Option<String>,

    /// Collector that receives audit events in batches.
    #[arg(long, env = "RELAY_AUDIT_EXPORT_URL")]
    pub audit_export_url: Option<String>,

    #[arg(long, env = "RELAY_AUDIT_EXPORT_TOKEN")]
    pub audit_export_token: Option<String>,
}
