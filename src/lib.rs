//! # capq
//!
//! A capability-matched, resource-bounded actor pool scheduler.
//!
//! Tasks arrive annotated with the [`Capability`] handles they require. Actor
//! roles are registered under [`CapabilitySet`] profiles together with a
//! factory for the actor implementation. The [`Scheduler`] keeps a pool of
//! live actors sized to the current backlog without ever exceeding the
//! configured per-axis resource limits, routes each queued task to a
//! compatible idle actor, and streams completed results (or propagated
//! failures) back to a caller-supplied consumer.
//!
//! ## Key pieces
//!
//! - **Capability model**: identity-compared cost descriptors declared once
//!   at configuration time and shared by reference everywhere.
//! - **Backends**: one coordinating loop drives actors running inline
//!   (`sync`), on dedicated worker threads behind bounded channels
//!   (`worker`), or on long-lived runtime tasks with error envelopes
//!   (`cluster`). Selected by a runtime key, swapped without touching
//!   scheduling logic.
//! - **Lock store**: a keyed mutual-exclusion registry injected into every
//!   actor at spawn time so workers can coordinate on shared external
//!   resources across isolation boundaries.
//!
//! ## Example
//!
//! ```rust,ignore
//! use capq::{ActorRegistry, Capability, CapabilitySet, FnFactory, Scheduler,
//!            SchedulerConfig, SchedulerTask};
//!
//! let upload = Capability::named([("cpu", 1), ("conn", 400)], "upload");
//! let mut registry = ActorRegistry::new();
//! registry.register(
//!     CapabilitySet::new([upload.clone()]),
//!     FnFactory::new(|_ctx| Ok(Box::new(Uploader::default()))),
//! );
//!
//! let mut scheduler = Scheduler::new(
//!     registry,
//!     [("cpu".into(), 4), ("conn".into(), 2000)].into(),
//!     SchedulerConfig::default(),
//! )?;
//! scheduler.process(producer, |batch| results.extend(batch)).await?;
//! scheduler.join().await?;
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

/// Core scheduling abstractions: capabilities, tasks, actors, the scheduler.
pub mod core;
/// Execution backends and the distributed actor abstraction.
pub mod backend;
/// Scheduler and backend configuration.
pub mod config;
/// Keyed lock registries shared across worker isolation boundaries.
pub mod locks;
/// Shared utilities.
pub mod util;

pub use crate::config::{BackendKind, SchedulerConfig};
pub use crate::core::actor::{Actor, ActorFactory, FnFactory, SpawnContext};
pub use crate::core::capability::{Capability, CapabilitySet, ResourceMap};
pub use crate::core::error::{SchedulerError, TaskError, TaskOutcome};
pub use crate::core::scheduler::{ActorRegistry, Scheduler};
pub use crate::core::task::SchedulerTask;
pub use crate::locks::{InProcessLocks, LockStore, PooledLocks, SharedLock};
