// src/dispatch/mod.rs

//! Event routing from producers to tracked entities.

pub mod dispatcher;

pub use dispatcher::{Delivery, Dispatcher, DEFAULT_QUEUE_CAPACITY};
