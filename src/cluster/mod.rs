pub mod helm;
pub mod kube_client;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// A namespace as observed from the local watch cache. Annotations are a
/// plain snapshot copy — callers never mutate the cache through this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceView {
    pub name: String,
    pub creation_timestamp: DateTime<Utc>,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub name: String,
    pub last_deployed: DateTime<Utc>,
}

/// Read side of the watcher's local cache. Synchronous: reading the cache is
/// never a blocking cluster call.
pub trait NamespaceStore: Send + Sync {
    fn list(&self) -> Vec<NamespaceView>;
}

/// Mutating namespace operations the reaper and watcher both need.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Merge-patch the given keys into `metadata.annotations`, leaving every
    /// other annotation on the object untouched.
    async fn patch_annotations(
        &self,
        namespace: &str,
        annotations: BTreeMap<String, String>,
    ) -> Result<()>;

    /// Delete the namespace. Treats "already gone" as success.
    async fn delete_namespace(&self, namespace: &str) -> Result<()>;
}

/// Packaged-release operations, scoped to a namespace.
#[async_trait]
pub trait ReleaseClient: Send + Sync {
    async fn list_releases(&self, namespace: &str) -> Result<Vec<Release>>;
    async fn uninstall(&self, namespace: &str, release: &str) -> Result<()>;
}
