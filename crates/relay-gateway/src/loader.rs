use std::path::Path;

use anyhow::Context;
use relay_common::Manifest;
use relay_engine::memory::Grants;

pub async fn load_manifests(path: &Path) -> anyhow::Result<Vec<Manifest>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading manifests from {}", path.display()))?;
    parse_manifests(&raw).with_context(|| format!("parsing manifests in {}", path.display()))
}

/// Accepts either a JSON array of manifests or a single manifest object.
pub fn parse_manifests(raw: &str) -> anyhow::Result<Vec<Manifest>> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let manifests = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(manifests)
}

pub async fn load_grants(path: &Path) -> anyhow::Result<Grants> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading grants from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing grants in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_array_and_single() {
        let many = parse_manifests(
            r#"[{"agentId":"a","executionType":"prompt"},{"agentId":"b","executionType":"webhook","entrypoint":"https://h/x"}]"#,
        )
        .unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[1].entrypoint, "https://h/x");

        let one = parse_manifests(r#"{"agentId":"c","executionType":"plugin"}"#).unwrap();
        assert_eq!(one[0].agent_id, "c");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_manifests("not json").is_err());
        assert!(parse_manifests(r#"[{"executionType":"prompt"}]"#).is_err());
    }
}
