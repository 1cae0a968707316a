// src/fsm/mod.rs

//! Generic event-driven state machine engine.
//!
//! - [`table`] holds the immutable transition tables and the [`Machine`]
//!   trait that ties a state, event kind, event and data type together.
//! - [`entity`] wraps one table in a lock-protected [`TrackedEntity`].

pub mod entity;
pub mod table;

pub use entity::{Lifecycle, Snapshot, TrackedEntity};
pub use table::{Machine, MachineEvent, TableBuilder, TransitionTable};
