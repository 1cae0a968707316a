// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClustertrackError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The event type is not registered for the entity's current state.
    #[error("Invalid event for entity '{entity}': {event} is not valid in state {state}")]
    InvalidTransition {
        entity: String,
        state: String,
        event: String,
    },

    /// A `(state, event)` pair was registered more than once in a table.
    #[error("Duplicate transition registered for ({state}, {event})")]
    DuplicateTransition { state: String, event: String },

    /// A multi-arc action chose a destination outside its declared set.
    #[error(
        "Transition action for entity '{entity}' on {event} chose {to} from {from}, which is not a declared destination"
    )]
    UndeclaredDestination {
        entity: String,
        from: String,
        to: String,
        event: String,
    },

    #[error("Cannot reset entity '{entity}' from non-terminal state {state}")]
    ResetNotAllowed { entity: String, state: String },

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Entity already registered: {0}")]
    EntityExists(String),

    #[error("Event delivery for entity '{0}' stopped before the event was applied")]
    DispatcherClosed(String),

    /// The watchdog fired before every host reported a final status.
    #[error("Run '{run_id}' timed out waiting for hosts: {}", pending.join(", "))]
    PollTimeout { run_id: String, pending: Vec<String> },

    /// The triggering process exited with a non-zero code.
    #[error("Run '{run_id}' failed: triggering process exited with code {code}")]
    ExternalProcessError { run_id: String, code: i32 },

    /// One or more hosts wrote a non-zero exit code.
    #[error("Run '{run_id}' failed on hosts: {}", hosts.join(", "))]
    HostsFailed { run_id: String, hosts: Vec<String> },

    #[error("Unreadable status markers for host '{host}': {reason}")]
    MarkerReadError { host: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ClustertrackError>;
