//! Wraps the `helm` CLI for release listing/uninstall. The ecosystem has no
//! native client for the Helm release API; shelling out is the only real
//! option, done here with `tokio::process::Command` instead of blocking
//! `std::process::Command` so it composes with the rest of the async runtime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::process::Command;

use super::{Release, ReleaseClient};
use crate::error::{Error, Result};

pub struct HelmReleaseClient {
    helm_bin: String,
}

impl HelmReleaseClient {
    pub fn new() -> Self {
        Self {
            helm_bin: std::env::var("HELM_BIN").unwrap_or_else(|_| "helm".to_string()),
        }
    }
}

impl Default for HelmReleaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct HelmListEntry {
    name: String,
    updated: String,
}

#[async_trait]
impl ReleaseClient for HelmReleaseClient {
    async fn list_releases(&self, namespace: &str) -> Result<Vec<Release>> {
        let output = Command::new(&self.helm_bin)
            .args(["list", "-n", namespace, "-o", "json"])
            .output()
            .await
            .map_err(|e| Error::Helm(format!("spawning `helm list`: {e}")))?;
        if !output.status.success() {
            return Err(Error::Helm(format!(
                "helm list -n {namespace}: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        let entries: Vec<HelmListEntry> = serde_json::from_slice(&output.stdout)?;
        entries
            .into_iter()
            .map(|entry| {
                let last_deployed = parse_helm_timestamp(&entry.updated)?;
                Ok(Release {
                    name: entry.name,
                    last_deployed,
                })
            })
            .collect()
    }

    async fn uninstall(&self, namespace: &str, release: &str) -> Result<()> {
        let output = Command::new(&self.helm_bin)
            .args(["uninstall", release, "-n", namespace])
            .output()
            .await
            .map_err(|e| Error::Helm(format!("spawning `helm uninstall`: {e}")))?;
        if !output.status.success() {
            return Err(Error::Helm(format!(
                "helm uninstall {release} -n {namespace}: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}

/// Helm prints `updated` as e.g. `2025-01-03 00:00:00.123456789 +0000 UTC`.
/// The trailing zone abbreviation isn't a `chrono` format specifier we can
/// parse directly, so it's trimmed before parsing the numeric offset.
fn parse_helm_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();
    let without_zone_name = trimmed.rsplit_once(' ').map(|(rest, _)| rest).unwrap_or(trimmed);
    DateTime::parse_from_str(without_zone_name, "%Y-%m-%d %H:%M:%S%.f %z")
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| Error::Chrono { source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_helm_timestamp_format() {
        let dt = parse_helm_timestamp("2025-01-03 00:00:00.123456789 +0000 UTC").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-01-03T00:00:00.123456789+00:00");
    }
}
