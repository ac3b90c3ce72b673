//! Keeps [`PoolRegistry`] in sync with RunnerPool create/update/delete
//! events using `kube_runtime::watcher`. This is the one place in the
//! engine that watches instead of polls — it exists only to maintain
//! the registry, never to drive reconciliation itself.

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client, ResourceExt};
use kube_runtime::watcher::{watcher, Config, Event};
use tracing::{info, warn};

use std::sync::Arc;

use crate::crd::RunnerPool;
use crate::http::ReadinessState;
use crate::registry::PoolRegistry;

pub async fn run(client: Client, registry: PoolRegistry, readiness: Arc<ReadinessState>, namespace: Option<String>) {
    let pools: Api<RunnerPool> = match &namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    let mut stream = watcher(pools, Config::default()).boxed();

    while let Some(event) = stream.next().await {
        match event {
            Ok(Event::Applied(pool)) => {
                apply_pool(&client, &registry, pool).await;
            }
            Ok(Event::Deleted(pool)) => {
                let ns = pool.namespace().unwrap_or_default();
                let name = pool.name_any();
                registry.remove(&ns, &name).await;
                info!(namespace = %ns, pool = %name, "runnerpool_removed_from_registry");
            }
            Ok(Event::Restarted(pools)) => {
                for pool in pools {
                    apply_pool(&client, &registry, pool).await;
                }
                readiness.mark_synced().await;
            }
            Err(e) => {
                warn!(error = %e, "runnerpool_watch_error");
            }
        }
    }
}

async fn apply_pool(client: &Client, registry: &PoolRegistry, pool: RunnerPool) {
    let ns = pool.namespace().unwrap_or_default();
    let name = pool.name_any();

    match resolve_pat(client, &ns, &pool.spec.pat_secret_name).await {
        Ok(pat) => {
            registry.upsert(&ns, &name, pool.spec.clone(), pat).await;
            info!(namespace = %ns, pool = %name, "runnerpool_registered");
        }
        Err(e) => {
            warn!(namespace = %ns, pool = %name, error = %e, "runnerpool_pat_resolution_failed_skipping");
        }
    }
}

async fn resolve_pat(client: &Client, namespace: &str, secret_name: &str) -> anyhow::Result<String> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = secrets.get(secret_name).await?;
    let data = secret
        .data
        .ok_or_else(|| anyhow::anyhow!("secret {secret_name} has no data"))?;
    let token = data
        .get("token")
        .ok_or_else(|| anyhow::anyhow!("secret {secret_name} has no 'token' key"))?;
    Ok(String::from_utf8(token.0.clone())?)
}
