// src/config/mod.rs

//! Configuration for clustertrack.
//!
//! - `model.rs`: TOML-backed raw model and the validated `ConfigFile`.
//! - `loader.rs`: reading from disk.
//! - `validate.rs`: `TryFrom<RawConfigFile> for ConfigFile`.
//! - `duration.rs`: `"250ms" | "3s" | "1m" | "2h"` parsing.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{BootstrapSection, ConfigFile, DispatcherSection, RawConfigFile};
pub use validate::{validate_hosts, validate_run_id, validate_secret_name};
