//! The distributed actor abstraction: one contract, three execution
//! substrates.
//!
//! A backend spawns actors and hands the coordinator an [`ActorLink`] per
//! live actor. Calls through a link never block the coordinating loop; they
//! resolve to the actor's return value or a propagated [`TaskError`].
//! Backends are selected by a runtime key and swapped without touching the
//! scheduler.

pub mod cluster;
pub mod sync;
pub mod worker;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::config::{BackendKind, SchedulerConfig};
use crate::core::actor::{ActorFactory, SpawnContext};
use crate::core::error::{SchedulerError, TaskError, TaskOutcome};

pub use cluster::ClusterBackend;
pub use sync::SyncBackend;
pub use worker::WorkerBackend;

/// Asynchronous completion of a single actor call.
pub type CallFuture<R> = BoxFuture<'static, TaskOutcome<R>>;

/// Coordinator-side handle to one live actor.
///
/// The pool manager owns links exclusively and keeps at most one outstanding
/// call per link at any time.
pub trait ActorLink<P, R>: Send
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Issue a consume call; resolves off the coordinating loop.
    fn call(&mut self, argument: P) -> CallFuture<R>;

    /// Deterministic teardown of the actor behind this link. Only invoked
    /// while no call is outstanding.
    fn kill(&mut self);
}

/// Uniform backend contract over the three execution substrates.
#[async_trait]
pub trait DistBackend<P, R>: Send
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Spawn a running actor. Construction failures are surfaced here,
    /// synchronously to the caller, aborting that growth step.
    async fn spawn(
        &self,
        factory: Arc<dyn ActorFactory<P, R>>,
        ctx: SpawnContext,
    ) -> Result<Box<dyn ActorLink<P, R>>, SchedulerError>;

    /// Global backend teardown. Idempotent; a no-op where nothing global is
    /// held.
    async fn join(&mut self);

    /// Backend-specific unwrap/reclassify hook: translate backend error
    /// envelopes into locally meaningful failures before delivery.
    fn reclassify(&self, error: TaskError) -> TaskError {
        error
    }
}

/// Construct the backend selected by the configuration.
pub fn build_backend<P, R>(config: &SchedulerConfig) -> Box<dyn DistBackend<P, R>>
where
    P: Send + 'static,
    R: Send + 'static,
{
    match config.backend {
        BackendKind::Sync => Box::new(SyncBackend::new()),
        BackendKind::Worker => Box::new(WorkerBackend::new(config.channel_depth)),
        BackendKind::Cluster => Box::new(ClusterBackend::new()),
    }
}
