use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::runtime::reflector::Store;
use kube::{Client, ResourceExt};
use serde_json::json;

use super::{ClusterClient, NamespaceStore, NamespaceView};
use crate::config::PRESERVE_ANNOTATION_KEY;
use crate::error::{Error, Result};

pub struct KubeClusterClient {
    namespaces: Api<Namespace>,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self {
            namespaces: Api::all(client),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn patch_annotations(
        &self,
        namespace: &str,
        annotations: BTreeMap<String, String>,
    ) -> Result<()> {
        let patch = json!({ "metadata": { "annotations": annotations } });
        self.namespaces
            .patch(namespace, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        match self
            .namespaces
            .delete(namespace, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(source) => Err(Error::Kube { source }),
        }
    }
}

/// Local read-only view over the reflector cache the watcher keeps warm.
/// Candidate filtering (pattern match, `preserve` annotation) happens here so
/// every consumer of `list()` sees an already-scoped-down snapshot.
pub struct ReflectorNamespaceStore {
    store: Store<Namespace>,
    name_pattern: regex::Regex,
}

impl ReflectorNamespaceStore {
    pub fn new(store: Store<Namespace>, name_pattern: regex::Regex) -> Self {
        Self { store, name_pattern }
    }
}

impl NamespaceStore for ReflectorNamespaceStore {
    fn list(&self) -> Vec<NamespaceView> {
        self.store
            .state()
            .iter()
            .filter_map(|ns| {
                let name = ns.name_any();
                if name.is_empty() || !self.name_pattern.is_match(&name) {
                    return None;
                }
                let annotations: BTreeMap<String, String> =
                    ns.metadata.annotations.clone().unwrap_or_default();
                if annotations.contains_key(PRESERVE_ANNOTATION_KEY) {
                    return None;
                }
                let jiff_timestamp = ns.metadata.creation_timestamp.clone()?.0;
                let creation_timestamp = chrono::DateTime::from_timestamp(
                    jiff_timestamp.as_second(),
                    jiff_timestamp.subsec_nanosecond() as u32,
                )?;
                Some(NamespaceView {
                    name,
                    creation_timestamp,
                    annotations,
                })
            })
            .collect()
    }
}
