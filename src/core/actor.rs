//! The user-supplied actor contract and spawn-time context.

use std::sync::Arc;

use uuid::Uuid;

use crate::locks::LockStore;

/// A unit of work execution. Implementations hold whatever connections or
/// buffers they need; the scheduler owns exactly one outstanding `consume`
/// per live actor.
pub trait Actor<P, R>: Send + 'static {
    /// Process one task argument. Errors are captured per task and delivered
    /// to the result consumer; they never abort the run or kill the actor.
    fn consume(&mut self, argument: P) -> anyhow::Result<R>;

    /// Cleanup hook invoked on teardown.
    fn stop(&mut self) {}
}

/// Context handed to every actor factory at build time.
///
/// The lock store is the one piece of state deliberately shared across all
/// workers of a scheduler; actors route external-resource coordination
/// through it instead of any global registry.
#[derive(Clone)]
pub struct SpawnContext {
    locks: Arc<dyn LockStore>,
    worker_id: Uuid,
}

impl SpawnContext {
    /// Create a context with a fresh worker identity.
    pub fn new(locks: Arc<dyn LockStore>) -> Self {
        Self {
            locks,
            worker_id: Uuid::new_v4(),
        }
    }

    /// The lock store shared across this scheduler's worker group.
    pub fn locks(&self) -> &Arc<dyn LockStore> {
        &self.locks
    }

    /// Identity of the worker this actor is being built for.
    pub fn worker_id(&self) -> Uuid {
        self.worker_id
    }
}

/// Builds actor instances for one registered capability profile.
///
/// Factories capture their own init arguments; construction failures surface
/// synchronously to the caller growing the pool.
pub trait ActorFactory<P, R>: Send + Sync + 'static {
    /// Build a fresh actor instance. Called on the worker side for isolated
    /// backends, so the factory itself crosses the isolation boundary.
    fn build(&self, ctx: &SpawnContext) -> anyhow::Result<Box<dyn Actor<P, R>>>;

    /// Proactively stop and replace each actor after this many consumes,
    /// bounding long-run resource drift in workers. `None` disables restarts.
    fn restart_after(&self) -> Option<u32> {
        None
    }
}

/// Adapts a closure into an [`ActorFactory`].
pub struct FnFactory<F> {
    build: F,
    restart_after: Option<u32>,
}

impl<F> FnFactory<F> {
    /// Wrap a build closure.
    pub fn new(build: F) -> Self {
        Self {
            build,
            restart_after: None,
        }
    }

    /// Restart actors built by this factory after `n` consumes.
    pub fn restart_every(mut self, n: u32) -> Self {
        self.restart_after = Some(n);
        self
    }
}

impl<P, R, F> ActorFactory<P, R> for FnFactory<F>
where
    F: Fn(&SpawnContext) -> anyhow::Result<Box<dyn Actor<P, R>>> + Send + Sync + 'static,
{
    fn build(&self, ctx: &SpawnContext) -> anyhow::Result<Box<dyn Actor<P, R>>> {
        (self.build)(ctx)
    }

    fn restart_after(&self) -> Option<u32> {
        self.restart_after
    }
}
