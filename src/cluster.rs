//! Read access to cluster DaemonSets.
//!
//! The mutator never talks to `kube` directly; it is handed a [`DaemonSetLister`]
//! at construction time so tests can substitute a fixed snapshot.

use std::future::Future;

use k8s_openapi::api::apps::v1::DaemonSet;
use kube::api::ListParams;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::Result;

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Source of the current DaemonSet set.
///
/// `namespace = None` lists every namespace. Implementations must return the
/// live state on every call; no caching.
pub trait DaemonSetLister: Send + Sync {
    fn list_daemon_sets(
        &self,
        namespace: Option<&str>,
    ) -> impl Future<Output = Result<Vec<DaemonSet>>> + Send;
}

/// [`DaemonSetLister`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeDaemonSetLister {
    client: Client,
}

impl KubeDaemonSetLister {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl DaemonSetLister for KubeDaemonSetLister {
    async fn list_daemon_sets(&self, namespace: Option<&str>) -> Result<Vec<DaemonSet>> {
        let api: Api<DaemonSet> = scoped_api(self.client.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;
        debug!(
            scope = namespace.unwrap_or("cluster-wide"),
            count = list.items.len(),
            "Listed DaemonSets"
        );
        Ok(list.items)
    }
}
