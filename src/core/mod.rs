//! Core scheduling abstractions: the capability model, task envelope, actor
//! contract, error taxonomy, and the pool-managing scheduler itself.

pub mod actor;
pub mod capability;
pub mod error;
pub mod scheduler;
pub mod task;

pub use actor::{Actor, ActorFactory, FnFactory, SpawnContext};
pub use capability::{Capability, CapabilitySet, ResourceMap};
pub use error::{SchedulerError, TaskError, TaskOutcome};
pub use scheduler::{ActorRegistry, Scheduler};
pub use task::SchedulerTask;
