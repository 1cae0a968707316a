// src/fsm/entity.rs

//! Entities whose lifecycle is driven by a shared [`TransitionTable`].

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, error};

use crate::errors::{ClustertrackError, Result};
use crate::fsm::table::{Machine, MachineEvent, TransitionTable};
use crate::types::{EntityId, Timestamp};

/// Lifecycle timestamps shared by most entity kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lifecycle {
    pub start_time: Option<Timestamp>,
    pub last_update: Option<Timestamp>,
    pub completion_time: Option<Timestamp>,
}

impl Lifecycle {
    /// Record activity at `at`, setting the start time on first use.
    pub fn touch(&mut self, at: Timestamp) {
        if self.start_time.is_none() {
            self.start_time = Some(at);
        }
        self.last_update = Some(at);
    }

    pub fn complete(&mut self, at: Timestamp) {
        self.touch(at);
        self.completion_time = Some(at);
    }
}

struct Cell<M: Machine> {
    state: M::State,
    data: M::Data,
}

/// A consistent copy of an entity's state and data.
pub struct Snapshot<M: Machine> {
    pub state: M::State,
    pub data: M::Data,
}

impl<M: Machine> Clone for Snapshot<M> {
    fn clone(&self) -> Self {
        Self {
            state: self.state,
            data: self.data.clone(),
        }
    }
}

impl<M: Machine> fmt::Debug for Snapshot<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("state", &self.state)
            .field("data", &self.data)
            .finish()
    }
}

/// One tracked unit of work.
///
/// `state()` takes a short read lock; `handle_event` holds the write lock
/// for the whole read-compute-apply-write sequence, so at most one
/// transition runs per entity. Entities never share a lock.
pub struct TrackedEntity<M: Machine> {
    id: EntityId,
    table: Arc<TransitionTable<M>>,
    cell: RwLock<Cell<M>>,
}

impl<M: Machine> fmt::Debug for TrackedEntity<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedEntity")
            .field("machine", &M::NAME)
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<M: Machine> TrackedEntity<M> {
    /// Create an entity in the table's initial state with default data.
    pub fn new(id: impl Into<EntityId>, table: Arc<TransitionTable<M>>) -> Self {
        Self::with_data(id, table, M::Data::default())
    }

    pub fn with_data(id: impl Into<EntityId>, table: Arc<TransitionTable<M>>, data: M::Data) -> Self {
        let state = table.initial();
        Self {
            id: id.into(),
            table,
            cell: RwLock::new(Cell { state, data }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn table(&self) -> &Arc<TransitionTable<M>> {
        &self.table
    }

    pub fn state(&self) -> M::State {
        self.read().state
    }

    pub fn snapshot(&self) -> Snapshot<M> {
        let cell = self.read();
        Snapshot {
            state: cell.state,
            data: cell.data.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.table.is_terminal(self.state())
    }

    /// Apply one event and return the resulting state.
    ///
    /// On failure the state is left as it was and the error is returned to
    /// the caller, who decides whether it is fatal.
    pub fn handle_event(&self, event: &M::Event) -> Result<M::State> {
        if event.entity_id() != self.id {
            return Err(ClustertrackError::EntityNotFound(event.entity_id().to_string()));
        }

        let kind = event.kind();
        let mut cell = self.write();
        let old_state = cell.state;

        let new_state = match self.table.do_transition(&mut cell.data, old_state, event) {
            Ok(next) => next,
            Err(err) => {
                error!(
                    machine = M::NAME,
                    entity = %self.id,
                    state = %old_state,
                    event = %kind,
                    error = %err,
                    "can't handle event at current state"
                );
                return Err(err);
            }
        };
        cell.state = new_state;
        drop(cell);

        if old_state != new_state {
            debug!(
                machine = M::NAME,
                entity = %self.id,
                old_state = %old_state,
                new_state = %new_state,
                event = %kind,
                "entity transitioned to a new state"
            );
        }

        Ok(new_state)
    }

    /// Return a terminal entity to the initial state with fresh data.
    pub fn reset(&self) -> Result<()> {
        let mut cell = self.write();
        if !self.table.is_terminal(cell.state) {
            return Err(ClustertrackError::ResetNotAllowed {
                entity: self.id.clone(),
                state: cell.state.to_string(),
            });
        }

        debug!(
            machine = M::NAME,
            entity = %self.id,
            from = %cell.state,
            "resetting entity for a new run"
        );
        cell.state = self.table.initial();
        cell.data = M::Data::default();
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Cell<M>> {
        self.cell.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Cell<M>> {
        self.cell.write().unwrap_or_else(PoisonError::into_inner)
    }
}
