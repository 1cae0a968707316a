// src/dispatch/dispatcher.rs

//! Routes events to entities and serializes delivery per entity.
//!
//! Each registered entity gets its own mailbox (a bounded mpsc channel) and a
//! worker task that applies envelopes strictly in arrival order. Different
//! entities have different workers, so they proceed in parallel.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::errors::{ClustertrackError, Result};
use crate::fsm::{Machine, MachineEvent, TrackedEntity};
use crate::types::EntityId;

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

struct Envelope<M: Machine> {
    event: M::Event,
    reply: oneshot::Sender<Result<M::State>>,
}

struct Mailbox<M: Machine> {
    entity: Arc<TrackedEntity<M>>,
    tx: mpsc::Sender<Envelope<M>>,
    worker: JoinHandle<()>,
}

/// Per-entity ordered event delivery for one [`Machine`] kind.
///
/// Cloning is cheap and clones share the same registry.
pub struct Dispatcher<M: Machine> {
    mailboxes: Arc<Mutex<HashMap<EntityId, Mailbox<M>>>>,
    queue_capacity: usize,
}

impl<M: Machine> Clone for Dispatcher<M> {
    fn clone(&self) -> Self {
        Self {
            mailboxes: Arc::clone(&self.mailboxes),
            queue_capacity: self.queue_capacity,
        }
    }
}

impl<M: Machine> fmt::Debug for Dispatcher<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("machine", &M::NAME)
            .field("entities", &self.lock().len())
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

impl<M: Machine> Default for Dispatcher<M> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Pending result of a submitted event.
pub struct Delivery<M: Machine> {
    entity_id: EntityId,
    rx: oneshot::Receiver<Result<M::State>>,
}

impl<M: Machine> fmt::Debug for Delivery<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("machine", &M::NAME)
            .field("entity_id", &self.entity_id)
            .finish_non_exhaustive()
    }
}

impl<M: Machine> Delivery<M> {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Wait until the entity's worker has applied the event.
    pub async fn wait(self) -> Result<M::State> {
        self.rx
            .await
            .map_err(|_| ClustertrackError::DispatcherClosed(self.entity_id))?
    }
}

impl<M: Machine> Dispatcher<M> {
    /// `queue_capacity` bounds each entity's mailbox; it is clamped to 1.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            mailboxes: Arc::new(Mutex::new(HashMap::new())),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register an entity and start its worker. Must run inside a Tokio runtime.
    pub fn register(&self, entity: Arc<TrackedEntity<M>>) -> Result<()> {
        let mut mailboxes = self.lock();
        let id = entity.id().to_string();
        if mailboxes.contains_key(&id) {
            return Err(ClustertrackError::EntityExists(id));
        }

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let worker = tokio::spawn(run_worker(Arc::clone(&entity), rx));
        debug!(machine = M::NAME, entity = %id, "registered entity");
        mailboxes.insert(id, Mailbox { entity, tx, worker });
        Ok(())
    }

    /// Remove an entity; events already queued are still applied.
    pub fn deregister(&self, id: &str) -> Option<Arc<TrackedEntity<M>>> {
        let mailbox = self.lock().remove(id)?;
        debug!(machine = M::NAME, entity = %id, "deregistered entity");
        Some(mailbox.entity)
    }

    pub fn entity(&self, id: &str) -> Option<Arc<TrackedEntity<M>>> {
        self.lock().get(id).map(|m| Arc::clone(&m.entity))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn state_of(&self, id: &str) -> Result<M::State> {
        self.entity(id)
            .map(|e| e.state())
            .ok_or_else(|| ClustertrackError::EntityNotFound(id.to_string()))
    }

    /// Enqueue `event` for its target entity.
    ///
    /// Waits only for mailbox space, not for the event to be applied. Two
    /// submits awaited one after the other are applied in that order.
    pub async fn submit(&self, event: M::Event) -> Result<Delivery<M>> {
        let entity_id = event.entity_id().to_string();
        let tx = self
            .lock()
            .get(&entity_id)
            .map(|m| m.tx.clone())
            .ok_or_else(|| ClustertrackError::EntityNotFound(entity_id.clone()))?;

        let (reply, rx) = oneshot::channel();
        trace!(machine = M::NAME, entity = %entity_id, event = %event.kind(), "enqueue event");
        tx.send(Envelope { event, reply })
            .await
            .map_err(|_| ClustertrackError::DispatcherClosed(entity_id.clone()))?;

        Ok(Delivery { entity_id, rx })
    }

    /// Submit and wait for the resulting state.
    pub async fn dispatch(&self, event: M::Event) -> Result<M::State> {
        self.submit(event).await?.wait().await
    }

    /// Close every mailbox and wait for the workers to drain.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.lock().drain().map(|(_, m)| m).collect();
        let count = drained.len();

        for Mailbox { tx, worker, .. } in drained {
            drop(tx);
            let _ = worker.await;
        }
        info!(machine = M::NAME, entities = count, "dispatcher shut down");
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EntityId, Mailbox<M>>> {
        self.mailboxes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_worker<M: Machine>(entity: Arc<TrackedEntity<M>>, mut rx: mpsc::Receiver<Envelope<M>>) {
    while let Some(Envelope { event, reply }) = rx.recv().await {
        // Errors were already logged by the entity; the submitter decides.
        let result = entity.handle_event(&event);
        let _ = reply.send(result);
    }
    trace!(machine = M::NAME, entity = %entity.id(), "mailbox closed");
}
