use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use common::{ProjectionName, StreamId};
use event_store::{EventStore, EventStoreExt};
use futures_util::future::join_all;
use tokio::sync::{RwLock, broadcast};
use tracing::{info, instrument};

use crate::events::Registry;
use crate::managed::{ManagedProjectionHandle, Startup};
use crate::retry::retry_transient;
use crate::runtime::ProjectionRuntime;
use crate::{
    ManagementSettings, ProjectionDefinition, ProjectionError, ProjectionStatus, Result,
    StateTransition,
};

#[derive(Default)]
struct Projections {
    live: HashMap<ProjectionName, ManagedProjectionHandle>,
    deleted: HashSet<ProjectionName>,
    /// Names with a delete in flight. They stay in `live` until it lands.
    deleting: HashSet<ProjectionName>,
}

/// Owns every managed projection of a node and routes commands to them.
pub struct ProjectionCoordinator {
    store: Arc<dyn EventStore>,
    runtime: Arc<dyn ProjectionRuntime>,
    settings: Arc<ManagementSettings>,
    projections: RwLock<Projections>,
}

impl ProjectionCoordinator {
    pub fn new(
        store: Arc<dyn EventStore>,
        runtime: Arc<dyn ProjectionRuntime>,
        settings: ManagementSettings,
    ) -> Self {
        Self {
            store,
            runtime,
            settings: Arc::new(settings),
            projections: RwLock::new(Projections::default()),
        }
    }

    /// Rebuilds every live projection from the registry stream and waits
    /// until each one has settled in a resting state.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<Vec<ProjectionStatus>> {
        let registry_stream = StreamId::projection_registry();
        let events = retry_transient(&self.settings, "read_registry", || {
            self.store.read_stream_to_end(&registry_stream)
        })
        .await?;
        let registry = Registry::from_events(&events)?;

        let handles = {
            let mut projections = self.projections.write().await;
            projections.deleted.extend(registry.deleted);
            let mut handles = Vec::new();
            for (name, registered) in registry.definitions {
                if projections.live.contains_key(&name) {
                    continue;
                }
                let handle = self.spawn(
                    registered.definition,
                    Startup::Recover {
                        event_number: registered.event_number,
                    },
                );
                projections.live.insert(name, handle.clone());
                handles.push(handle);
            }
            handles
        };

        info!(count = handles.len(), "recovering projections");
        let settled = join_all(
            handles
                .iter()
                .map(|h| h.wait_until(|status| status.state.is_resting())),
        )
        .await;
        settled.into_iter().collect()
    }

    /// Creates a projection. Repeating an identical create returns the
    /// existing projection; a different definition under a taken or
    /// tombstoned name is rejected.
    #[instrument(skip(self, definition), fields(name = %definition.name))]
    pub async fn create(
        &self,
        definition: ProjectionDefinition,
        enabled: bool,
    ) -> Result<ProjectionStatus> {
        let mut projections = self.projections.write().await;
        let name = definition.name.clone();
        if projections.deleted.contains(&name) || projections.deleting.contains(&name) {
            return Err(ProjectionError::AlreadyExists(name));
        }
        if let Some(existing) = projections.live.get(&name) {
            let status = existing.status();
            return if status.definition.same_as(&definition) {
                Ok(status)
            } else {
                Err(ProjectionError::AlreadyExists(name))
            };
        }

        let handle = self.spawn(definition, Startup::Create { enabled });
        let status = handle.status();
        projections.live.insert(name, handle);
        info!(enabled, "projection created");
        Ok(status)
    }

    pub async fn enable(&self, name: &ProjectionName) -> Result<ProjectionStatus> {
        self.get(name).await?.enable().await
    }

    pub async fn disable(&self, name: &ProjectionName) -> Result<ProjectionStatus> {
        self.get(name).await?.disable().await
    }

    pub async fn abort(&self, name: &ProjectionName) -> Result<ProjectionStatus> {
        self.get(name).await?.abort().await
    }

    pub async fn reset(&self, name: &ProjectionName) -> Result<ProjectionStatus> {
        self.get(name).await?.reset().await
    }

    /// Deletes a projection. Deleting an already deleted name is a no-op.
    ///
    /// The registry lock is released while the projection writes its
    /// tombstone, so other projections stay reachable during the delete.
    #[instrument(skip(self), fields(name = %name))]
    pub async fn delete(&self, name: &ProjectionName) -> Result<()> {
        let (handle, owner) = {
            let mut projections = self.projections.write().await;
            if projections.deleted.contains(name) {
                return Ok(());
            }
            let handle = projections
                .live
                .get(name)
                .cloned()
                .ok_or_else(|| ProjectionError::NotFound(name.clone()))?;
            let owner = projections.deleting.insert(name.clone());
            (handle, owner)
        };

        let result = handle.delete().await;

        let mut projections = self.projections.write().await;
        if owner {
            projections.deleting.remove(name);
        }
        match result {
            Ok(()) => {
                projections.live.remove(name);
                projections.deleted.insert(name.clone());
                Ok(())
            }
            // A concurrent delete got there first and the actor has exited.
            Err(ProjectionError::ActorUnavailable(_)) if !owner => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub async fn status(&self, name: &ProjectionName) -> Result<ProjectionStatus> {
        Ok(self.get(name).await?.status())
    }

    /// Statuses of every live projection, ordered by name.
    pub async fn list(&self) -> Vec<ProjectionStatus> {
        let projections = self.projections.read().await;
        let mut statuses: Vec<_> = projections.live.values().map(|h| h.status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    pub async fn subscribe(
        &self,
        name: &ProjectionName,
    ) -> Result<broadcast::Receiver<StateTransition>> {
        Ok(self.get(name).await?.subscribe())
    }

    /// Returns the handle of a live projection.
    pub async fn get(&self, name: &ProjectionName) -> Result<ManagedProjectionHandle> {
        self.projections
            .read()
            .await
            .live
            .get(name)
            .cloned()
            .ok_or_else(|| ProjectionError::NotFound(name.clone()))
    }

    /// Stops every projection, checkpointing running ones. Persisted
    /// enabled flags are kept so a later `recover` resumes them.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = {
            let mut projections = self.projections.write().await;
            projections.live.drain().map(|(_, h)| h).collect()
        };
        info!(count = handles.len(), "shutting down projections");
        join_all(handles.iter().map(|h| h.shutdown())).await;
    }

    fn spawn(&self, definition: ProjectionDefinition, startup: Startup) -> ManagedProjectionHandle {
        ManagedProjectionHandle::spawn(
            definition,
            startup,
            Arc::clone(&self.store),
            Arc::clone(&self.runtime),
            Arc::clone(&self.settings),
        )
    }
}
