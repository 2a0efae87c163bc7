//! Task dispatch.
//!
//! This module provides:
//!
//! - [`Task`]: the controller's action vocabulary
//! - [`TaskDispatcher`]: trait for enqueueing tasks (at-least-once, optional delay)
//! - [`TaskHandler`]: trait for executing a task
//! - [`LocalDispatcher`]/[`DispatchWorker`]: in-process queue with retry and backoff

mod local;
mod types;

pub use local::{create_local_dispatcher, DispatchWorker, LocalDispatcher};
pub use types::*;
