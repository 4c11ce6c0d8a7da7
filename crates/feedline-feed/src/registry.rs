use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use feedline_core::SubscriberId;
use tracing::{debug, info};

use crate::handle::SubscriberHandle;

/// The set of subscribers that currently receive broadcasts.
///
/// Connections add and remove themselves while the broadcaster works from
/// [`snapshot`](Self::snapshot)s, so the lock is only ever held for a map
/// operation and never across a send.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    members: RwLock<HashMap<SubscriberId, Arc<SubscriberHandle>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle. Returns `false` if it was already present.
    pub fn add(&self, handle: Arc<SubscriberHandle>) -> bool {
        let id = handle.id();
        let mut members = self.write();
        let inserted = members.insert(id, handle).is_none();
        debug!(subscriber = %id, total = members.len(), "subscriber added");
        inserted
    }

    /// Remove a handle by id. Removing an absent id is a no-op and returns
    /// `false`; both the broadcaster and the connection may race here.
    pub fn remove(&self, id: SubscriberId) -> bool {
        let mut members = self.write();
        let removed = members.remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, total = members.len(), "subscriber removed");
        }
        removed
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.read().contains_key(&id)
    }

    /// Point-in-time copy of the membership.
    pub fn snapshot(&self) -> Vec<Arc<SubscriberHandle>> {
        self.read().values().cloned().collect()
    }

    pub fn current_subscriber_count(&self) -> usize {
        self.read().len()
    }

    /// Add `handle` and return a guard that removes and closes it when
    /// dropped, on every exit path of the owning task.
    pub fn register(self: &Arc<Self>, handle: Arc<SubscriberHandle>) -> Registration {
        self.add(Arc::clone(&handle));
        Registration {
            registry: Arc::clone(self),
            handle,
        }
    }

    /// Empty the registry and close every handle. Used at shutdown.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.write().drain().map(|(_, h)| h).collect();
        for handle in &drained {
            handle.close();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "closed all subscribers");
        }
        drained.len()
    }

    // A panic elsewhere cannot leave the map half-updated, so poisoning is
    // ignored rather than propagated into every connection.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<SubscriberId, Arc<SubscriberHandle>>> {
        self.members.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SubscriberId, Arc<SubscriberHandle>>> {
        self.members.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Membership held by one connection. Dropping it deregisters and closes
/// the handle exactly once.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<SubscriberRegistry>,
    handle: Arc<SubscriberHandle>,
}

impl Registration {
    pub fn handle(&self) -> &Arc<SubscriberHandle> {
        &self.handle
    }

    pub fn id(&self) -> SubscriberId {
        self.handle.id()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.handle.id());
        self.handle.close();
    }
}
