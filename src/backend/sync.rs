//! Inline backend: consume runs synchronously inside the coordinator.
//!
//! Calls return an already-resolved completion, which makes execution fully
//! deterministic. Used for tests and workloads where isolation buys nothing.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{self, FutureExt};
use tracing::debug;

use crate::core::actor::{Actor, ActorFactory, SpawnContext};
use crate::core::error::{SchedulerError, TaskError};

use super::{ActorLink, CallFuture, DistBackend};

/// Backend executing actors inline on the coordinating loop.
#[derive(Default)]
pub struct SyncBackend;

impl SyncBackend {
    /// Create the inline backend.
    pub fn new() -> Self {
        Self
    }
}

struct SyncLink<P, R> {
    actor: Option<Box<dyn Actor<P, R>>>,
}

impl<P, R> ActorLink<P, R> for SyncLink<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    fn call(&mut self, argument: P) -> CallFuture<R> {
        let outcome = match self.actor.as_mut() {
            // panics are contained here just like on the isolated backends
            Some(actor) => super::worker::run_consume(actor.as_mut(), argument),
            None => Err(TaskError::ActorLost("actor already stopped".into())),
        };
        future::ready(outcome).boxed()
    }

    fn kill(&mut self) {
        if let Some(mut actor) = self.actor.take() {
            actor.stop();
        }
    }
}

#[async_trait]
impl<P, R> DistBackend<P, R> for SyncBackend
where
    P: Send + 'static,
    R: Send + 'static,
{
    async fn spawn(
        &self,
        factory: Arc<dyn ActorFactory<P, R>>,
        ctx: SpawnContext,
    ) -> Result<Box<dyn ActorLink<P, R>>, SchedulerError> {
        let actor = factory
            .build(&ctx)
            .map_err(SchedulerError::ActorConstruction)?;
        debug!(worker = %ctx.worker_id(), "inline actor built");
        Ok(Box::new(SyncLink { actor: Some(actor) }))
    }

    async fn join(&mut self) {}
}
