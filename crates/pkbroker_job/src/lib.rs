//! Job execution and event dispatch for the package broker.
//!
//! A [`JobList`] owns one [`Job`] per client transaction. Starting a job
//! hands a [`BackendJob`] to a backend entry point, usually on a dedicated
//! worker thread. Everything the backend reports goes through the checks
//! in [`emit`] and is then carried by the [`DispatchBridge`] to the single
//! [`Dispatcher`], which calls the handler registered for that event kind.
//!
//! ```no_run
//! use pkbroker_job::{Dispatcher, DummyBackend, EngineConfig, EventKind, JobList};
//! use pkbroker_protocol::Role;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let (mut dispatcher, bridge) = Dispatcher::new();
//! let mut jobs = JobList::new(bridge, Arc::new(EngineConfig::default()));
//!
//! let id = jobs.create();
//! let job = jobs.get(id).ok_or("job vanished")?;
//! job.set_vfunc(EventKind::Package, |view, event| println!("{}: {:?}", view.tid(), event));
//! job.set_role(Role::SearchName);
//! job.set_parameters(serde_json::json!({"args": ["bash"]}));
//! jobs.run(id, Arc::new(DummyBackend::new()))?;
//!
//! while !jobs.get(id).map_or(true, |j| j.view().is_finished()) {
//!     dispatcher.dispatch_next().await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cancel;
pub mod config;
pub mod dispatch;
pub mod dummy;
pub mod emit;
pub mod error;
pub mod event;
pub mod job;
pub mod list;
pub mod registry;
mod thread;

#[cfg(test)]
mod testing;

pub use backend::{Backend, EntryPoint};
pub use cancel::CancellationToken;
pub use config::{ConfigError, EngineConfig, ExitPolicy};
pub use dispatch::{DispatchBridge, Dispatcher};
pub use dummy::DummyBackend;
pub use emit::BackendJob;
pub use error::JobError;
pub use event::{EventKind, JobEvent};
pub use job::{Job, JobId, JobView, Parameters, ProxySettings};
pub use list::JobList;
pub use registry::{CallbackRegistry, Handler};
