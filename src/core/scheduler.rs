//! The actor pool manager and its dispatch/completion loop.
//!
//! One coordinating loop owns the task queues, the live actor handles, and at
//! most one outstanding call per busy actor. Whenever an actor turns idle the
//! next queued task for its profile is dispatched; whenever any outstanding
//! call resolves the outcome is buffered for the result consumer and a fresh
//! reorganization/dispatch pass runs immediately. There is no fixed-interval
//! polling anywhere.
//!
//! Reorganization is a greedy water-filling allocation: committed (busy)
//! actors are charged to the per-axis budget first, then the profile with the
//! largest unserved backlog receives additional actor slots until no profile
//! fits the remaining budget. Profiles with zero backlog shrink first, since
//! they are never granted extra slots.

use std::collections::{HashMap, VecDeque};
use std::mem;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{build_backend, ActorLink, DistBackend};
use crate::config::{BackendKind, SchedulerConfig};
use crate::core::actor::{ActorFactory, SpawnContext};
use crate::core::capability::{Capability, CapabilitySet, ResourceMap};
use crate::core::error::{SchedulerError, TaskError, TaskOutcome};
use crate::core::task::SchedulerTask;
use crate::locks::{InProcessLocks, LockStore, PooledLocks};

/// Declaration-ordered mapping from capability profiles to actor factories.
pub struct ActorRegistry<P, R> {
    entries: Vec<(CapabilitySet, Arc<dyn ActorFactory<P, R>>)>,
}

impl<P, R> ActorRegistry<P, R> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register an actor factory under a capability profile. Declaration
    /// order breaks ties between equally cheap qualifying profiles.
    pub fn register<F>(&mut self, set: CapabilitySet, factory: F) -> &mut Self
    where
        F: ActorFactory<P, R>,
    {
        self.entries.push((set, Arc::new(factory)));
        self
    }

    /// Number of registered profiles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no profile has been registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<P, R> Default for ActorRegistry<P, R> {
    fn default() -> Self {
        Self::new()
    }
}

/// One registered profile plus its runtime state.
struct Profile<P, R> {
    set: CapabilitySet,
    factory: Arc<dyn ActorFactory<P, R>>,
    cost: ResourceMap,
    units: u64,
    restart_after: Option<u32>,
    queue: VecDeque<P>,
}

/// One live actor, exclusively owned by the pool manager.
struct ActorHandle<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    profile: usize,
    link: Box<dyn ActorLink<P, R>>,
    busy: bool,
    dead: bool,
    retiring: bool,
    consumed: u32,
}

/// Capability-matching, resource-bounded actor pool scheduler.
pub struct Scheduler<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    profiles: Vec<Profile<P, R>>,
    limits: ResourceMap,
    backend: Box<dyn DistBackend<P, R>>,
    locks: Arc<dyn LockStore>,
    handles: HashMap<Uuid, ActorHandle<P, R>>,
    inflight: FuturesUnordered<BoxFuture<'static, (Uuid, TaskOutcome<R>)>>,
    completed: Vec<TaskOutcome<R>>,
    reorganize_after_each_task: bool,
    verbose: bool,
    dirty: bool,
    ever_enqueued: bool,
    joined: bool,
}

impl<P, R> Scheduler<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Build a scheduler from registered profiles, per-axis resource limits,
    /// and configuration. An axis absent from the limits map is
    /// unconstrained.
    pub fn new(
        registry: ActorRegistry<P, R>,
        resource_limits: ResourceMap,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let locks: Arc<dyn LockStore> = match config.backend {
            BackendKind::Sync => Arc::new(InProcessLocks::new()),
            BackendKind::Worker | BackendKind::Cluster => Arc::new(
                PooledLocks::new(config.lock_pool_depth)
                    .map_err(|e| SchedulerError::Backend(format!("lock pool: {e}")))?,
            ),
        };
        let backend = build_backend(&config);

        let profiles = registry
            .entries
            .into_iter()
            .map(|(set, factory)| {
                let cost = set.total_cost();
                let units = set.total_units();
                let restart_after = factory.restart_after();
                Profile {
                    set,
                    factory,
                    cost,
                    units,
                    restart_after,
                    queue: VecDeque::new(),
                }
            })
            .collect();

        Ok(Self {
            profiles,
            limits: resource_limits,
            backend,
            locks,
            handles: HashMap::new(),
            inflight: FuturesUnordered::new(),
            completed: Vec::new(),
            reorganize_after_each_task: config.reorganize_after_each_task,
            verbose: config.verbose,
            dirty: false,
            ever_enqueued: false,
            joined: false,
        })
    }

    /// The lock store shared with every actor this scheduler spawns.
    pub fn lock_store(&self) -> Arc<dyn LockStore> {
        Arc::clone(&self.locks)
    }

    /// No outstanding calls and no queued work anywhere.
    pub fn is_idle(&self) -> bool {
        self.inflight.is_empty() && self.backlog() == 0
    }

    /// The queue has never held and does not currently hold any task.
    pub fn is_empty(&self) -> bool {
        !self.ever_enqueued && self.backlog() == 0
    }

    /// Current backlog size across all profiles.
    pub fn queued_task_count(&self) -> usize {
        self.backlog()
    }

    /// Enqueue one task, routing it to the cheapest qualifying profile.
    ///
    /// Fails with [`SchedulerError::UnroutableTask`] right here if no
    /// registered profile is a superset of the task's requirements; an
    /// unroutable task is never silently queued.
    pub fn submit(&mut self, task: SchedulerTask<P>) -> Result<(), SchedulerError> {
        let profile = self.route(&task.requirements)?;
        self.profiles[profile].queue.push_back(task.argument);
        self.ever_enqueued = true;
        self.dirty = true;
        if self.verbose {
            debug!(
                profile,
                backlog = self.profiles[profile].queue.len(),
                "task enqueued"
            );
        }
        Ok(())
    }

    /// Drive tasks from `producer` through the pool, flushing each wave of
    /// newly completed outcomes to `consumer`.
    ///
    /// The producer is invoked repeatedly until it returns an empty batch,
    /// which signals end-of-input; the loop then drains. Completion order
    /// follows whichever actor finishes first, so the consumer must tolerate
    /// reordering across tasks.
    pub async fn process<F, C>(
        &mut self,
        mut producer: F,
        mut consumer: C,
    ) -> Result<(), SchedulerError>
    where
        F: FnMut() -> Vec<SchedulerTask<P>>,
        C: FnMut(Vec<TaskOutcome<R>>),
    {
        loop {
            let batch = producer();
            if batch.is_empty() {
                break;
            }
            for task in batch {
                self.submit(task)?;
            }
        }
        self.drain(&mut consumer).await
    }

    /// Block until all outstanding calls resolve, then release every backend
    /// resource (actors, worker threads, the lock pool). Idempotent.
    pub async fn join(&mut self) -> Result<(), SchedulerError> {
        if self.joined {
            return Ok(());
        }
        while let Some((id, outcome)) = self.inflight.next().await {
            self.on_completion(id, outcome);
        }
        let ids: Vec<Uuid> = self.handles.keys().copied().collect();
        for id in ids {
            if let Some(mut handle) = self.handles.remove(&id) {
                handle.link.kill();
            }
        }
        self.backend.join().await;
        self.locks.shutdown();
        self.joined = true;
        info!("scheduler joined");
        Ok(())
    }

    fn backlog(&self) -> usize {
        self.profiles.iter().map(|p| p.queue.len()).sum()
    }

    /// Cheapest qualifying profile for the given requirements; declaration
    /// order wins ties.
    fn route(&self, requirements: &[Capability]) -> Result<usize, SchedulerError> {
        let mut best: Option<(usize, u64)> = None;
        for (idx, profile) in self.profiles.iter().enumerate() {
            if !profile.set.satisfies(requirements) {
                continue;
            }
            match best {
                Some((_, units)) if profile.units >= units => {}
                _ => best = Some((idx, profile.units)),
            }
        }
        best.map(|(idx, _)| idx).ok_or_else(|| {
            SchedulerError::UnroutableTask(format_requirements(requirements))
        })
    }

    /// Desired live actor count per profile under the per-axis limits.
    fn plan_desired(&self) -> Vec<usize> {
        let n = self.profiles.len();
        let mut busy = vec![0usize; n];
        for handle in self.handles.values() {
            if handle.busy && !handle.dead {
                busy[handle.profile] += 1;
            }
        }

        // committed actors cannot be shrunk mid-call; charge them first
        let mut budget = self.limits.clone();
        for (idx, count) in busy.iter().enumerate() {
            if *count > 0 {
                charge(&mut budget, &self.profiles[idx].cost, *count as u64);
            }
        }

        let mut desired = busy;
        let mut extra = vec![0usize; n];
        let mut open: Vec<usize> = (0..n).collect();
        loop {
            let mut pick: Option<usize> = None;
            let mut pick_gap = 0usize;
            for &idx in &open {
                let gap = self.profiles[idx].queue.len().saturating_sub(extra[idx]);
                if gap > pick_gap {
                    pick = Some(idx);
                    pick_gap = gap;
                }
            }
            let Some(idx) = pick else { break };
            if fits(&budget, &self.profiles[idx].cost) {
                charge(&mut budget, &self.profiles[idx].cost, 1);
                extra[idx] += 1;
                desired[idx] += 1;
            } else {
                open.retain(|&j| j != idx);
            }
        }
        desired
    }

    /// Recompute the pool: sweep dead handles, shrink idle excess, grow to
    /// the planned counts. Construction failures abort the growth step and
    /// propagate.
    async fn reorganize(&mut self) -> Result<(), SchedulerError> {
        self.dirty = false;

        let gone: Vec<Uuid> = self
            .handles
            .iter()
            .filter(|(_, h)| h.dead && !h.busy)
            .map(|(id, _)| *id)
            .collect();
        for id in gone {
            if let Some(mut handle) = self.handles.remove(&id) {
                handle.link.kill();
                if self.verbose {
                    debug!(worker = %id, "dead handle swept");
                }
            }
        }

        let desired = self.plan_desired();

        let mut alive = vec![0usize; self.profiles.len()];
        for handle in self.handles.values() {
            if !handle.dead {
                alive[handle.profile] += 1;
            }
        }

        let mut to_kill: Vec<Uuid> = Vec::new();
        for (id, handle) in &self.handles {
            if handle.dead || handle.busy {
                continue;
            }
            if handle.retiring || alive[handle.profile] > desired[handle.profile] {
                to_kill.push(*id);
                alive[handle.profile] -= 1;
            }
        }
        for id in to_kill {
            if let Some(mut handle) = self.handles.remove(&id) {
                handle.link.kill();
                if self.verbose {
                    debug!(worker = %id, profile = handle.profile, "actor shrunk");
                }
            }
        }

        for idx in 0..self.profiles.len() {
            while alive[idx] < desired[idx] {
                let ctx = SpawnContext::new(Arc::clone(&self.locks));
                let worker_id = ctx.worker_id();
                let factory = Arc::clone(&self.profiles[idx].factory);
                let link = self.backend.spawn(factory, ctx).await?;
                self.handles.insert(
                    worker_id,
                    ActorHandle {
                        profile: idx,
                        link,
                        busy: false,
                        dead: false,
                        retiring: false,
                        consumed: 0,
                    },
                );
                alive[idx] += 1;
                if self.verbose {
                    debug!(worker = %worker_id, profile = idx, "actor spawned");
                }
            }
        }
        Ok(())
    }

    /// Hand every idle compatible actor its next queued task.
    fn dispatch(&mut self) {
        for (id, handle) in self.handles.iter_mut() {
            if handle.busy || handle.dead || handle.retiring {
                continue;
            }
            let queue = &mut self.profiles[handle.profile].queue;
            let Some(argument) = queue.pop_front() else {
                continue;
            };
            if queue.is_empty() {
                // a drained profile is a shrink opportunity
                self.dirty = true;
            }
            handle.busy = true;
            let call = handle.link.call(argument);
            let worker_id = *id;
            self.inflight
                .push(async move { (worker_id, call.await) }.boxed());
            if self.verbose {
                debug!(worker = %worker_id, profile = handle.profile, "task dispatched");
            }
        }
    }

    fn on_completion(&mut self, id: Uuid, outcome: TaskOutcome<R>) {
        let outcome = match outcome {
            Err(error) => Err(self.backend.reclassify(error)),
            ok => ok,
        };

        let mut remove = false;
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.busy = false;
            match &outcome {
                Err(TaskError::ActorLost(reason)) => {
                    handle.dead = true;
                    self.dirty = true;
                    remove = true;
                    warn!(worker = %id, %reason, "actor lost, capacity will respawn");
                }
                _ => {
                    handle.consumed += 1;
                    let threshold = self.profiles[handle.profile].restart_after;
                    if threshold.is_some_and(|n| handle.consumed >= n) {
                        handle.retiring = true;
                        self.dirty = true;
                        remove = true;
                        if self.verbose {
                            debug!(
                                worker = %id,
                                consumed = handle.consumed,
                                "restart threshold reached"
                            );
                        }
                    }
                }
            }
        }
        if remove {
            if let Some(mut handle) = self.handles.remove(&id) {
                handle.link.kill();
            }
        }
        self.completed.push(outcome);
    }

    /// Run the completion loop until the queue and all outstanding calls are
    /// exhausted, flushing completed outcomes to the consumer per wave.
    async fn drain<C>(&mut self, consumer: &mut C) -> Result<(), SchedulerError>
    where
        C: FnMut(Vec<TaskOutcome<R>>),
    {
        loop {
            if self.reorganize_after_each_task || self.dirty {
                self.reorganize().await?;
            }
            self.dispatch();

            if self.inflight.is_empty() {
                if self.backlog() == 0 {
                    break;
                }
                // nothing running and nothing dispatched: force a pass in
                // case the opportunistic mode left the pool stale
                self.reorganize().await?;
                self.dispatch();
                if self.inflight.is_empty() {
                    return Err(SchedulerError::Backend(
                        "queued tasks cannot be scheduled within resource limits".into(),
                    ));
                }
            }

            if let Some((id, outcome)) = self.inflight.next().await {
                self.on_completion(id, outcome);
            }
            self.flush(consumer);
        }
        self.flush(consumer);
        Ok(())
    }

    fn flush<C>(&mut self, consumer: &mut C)
    where
        C: FnMut(Vec<TaskOutcome<R>>),
    {
        if !self.completed.is_empty() {
            consumer(mem::take(&mut self.completed));
        }
    }
}

fn format_requirements(requirements: &[Capability]) -> String {
    let names: Vec<String> = requirements.iter().map(|c| format!("{c:?}")).collect();
    format!("[{}]", names.join(", "))
}

/// Whether one more actor with this cost fits the remaining budget on every
/// constrained axis.
fn fits(budget: &ResourceMap, cost: &ResourceMap) -> bool {
    cost.iter()
        .all(|(axis, units)| budget.get(axis).is_none_or(|left| left >= units))
}

fn charge(budget: &mut ResourceMap, cost: &ResourceMap, count: u64) {
    for (axis, units) in cost {
        if let Some(left) = budget.get_mut(axis) {
            *left = left.saturating_sub(units * count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::actor::{Actor, FnFactory};

    struct Tagger {
        tag: &'static str,
    }

    impl Actor<String, String> for Tagger {
        fn consume(&mut self, argument: String) -> anyhow::Result<String> {
            Ok(format!("{}:{}", self.tag, argument))
        }
    }

    fn tag_factory(tag: &'static str) -> FnFactory<impl Fn(&SpawnContext) -> anyhow::Result<Box<dyn Actor<String, String>>> + Send + Sync>
    {
        FnFactory::new(move |_ctx: &SpawnContext| {
            Ok(Box::new(Tagger { tag }) as Box<dyn Actor<_, _>>)
        })
    }

    #[test]
    fn empty_scheduler_is_idle_and_empty() {
        let scheduler: Scheduler<String, String> = Scheduler::new(
            ActorRegistry::new(),
            ResourceMap::new(),
            SchedulerConfig::default(),
        )
        .unwrap();

        assert!(scheduler.is_idle());
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.queued_task_count(), 0);
    }

    #[test]
    fn routes_to_cheapest_qualifying_profile() {
        let shared = Capability::named([("cpu", 1)], "shared");
        let heavy = Capability::named([("cpu", 2), ("mem", 500)], "heavy");

        let mut registry = ActorRegistry::new();
        registry.register(
            CapabilitySet::new([shared.clone(), heavy.clone()]),
            tag_factory("broad"),
        );
        registry.register(CapabilitySet::new([shared.clone()]), tag_factory("narrow"));

        let scheduler = Scheduler::new(
            registry,
            [("cpu".to_string(), 4), ("mem".to_string(), 1000)].into(),
            SchedulerConfig::default(),
        )
        .unwrap();

        // the narrow profile is cheaper and qualifies
        assert_eq!(scheduler.route(&[shared.clone()]).unwrap(), 1);
        // only the broad profile carries the heavy capability
        assert_eq!(scheduler.route(&[heavy]).unwrap(), 0);
    }

    #[test]
    fn equal_cost_tie_breaks_by_declaration_order() {
        let a = Capability::named([("cpu", 1)], "a");
        let b = Capability::named([("cpu", 1)], "b");

        let mut registry = ActorRegistry::new();
        registry.register(CapabilitySet::new([a.clone()]), tag_factory("first"));
        registry.register(CapabilitySet::new([b.clone()]), tag_factory("second"));

        let scheduler = Scheduler::new(
            registry,
            [("cpu".to_string(), 2)].into(),
            SchedulerConfig::default(),
        )
        .unwrap();

        // both profiles qualify for the empty requirement at identical cost
        assert_eq!(scheduler.route(&[]).unwrap(), 0);
    }

    #[test]
    fn unroutable_task_is_rejected_at_submission() {
        let declared = Capability::named([("cpu", 1)], "declared");
        let undeclared = Capability::named([("cpu", 1)], "undeclared");

        let mut registry = ActorRegistry::new();
        registry.register(CapabilitySet::new([declared]), tag_factory("only"));

        let mut scheduler = Scheduler::new(
            registry,
            [("cpu".to_string(), 2)].into(),
            SchedulerConfig::default(),
        )
        .unwrap();

        let err = scheduler
            .submit(SchedulerTask::new("x".to_string(), vec![undeclared]))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::UnroutableTask(_)));
        assert_eq!(scheduler.queued_task_count(), 0);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn water_filling_respects_every_axis() {
        let cheap = Capability::named([("cpu", 1)], "cheap");
        let wide = Capability::named([("cpu", 1), ("conn", 4)], "wide");

        let mut registry = ActorRegistry::new();
        registry.register(CapabilitySet::new([cheap.clone()]), tag_factory("cheap"));
        registry.register(CapabilitySet::new([wide.clone()]), tag_factory("wide"));

        let mut scheduler = Scheduler::new(
            registry,
            [("cpu".to_string(), 3), ("conn".to_string(), 4)].into(),
            SchedulerConfig::default(),
        )
        .unwrap();

        for _ in 0..2 {
            scheduler
                .submit(SchedulerTask::new("t".to_string(), vec![cheap.clone()]))
                .unwrap();
        }
        for _ in 0..5 {
            scheduler
                .submit(SchedulerTask::new("t".to_string(), vec![wide.clone()]))
                .unwrap();
        }

        let desired = scheduler.plan_desired();
        // wide has the larger backlog and fills first, but conn caps it at
        // one slot; cheap then takes the leftover cpu, capped by its backlog
        assert_eq!(desired[0], 2);
        assert_eq!(desired[1], 1);

        // per-axis totals stay within limits
        let cpu = desired[0] + desired[1];
        let conn = desired[1] * 4;
        assert!(cpu as u64 <= 3);
        assert!(conn as u64 <= 4);
    }

    #[test]
    fn unconstrained_axis_does_not_block_growth() {
        let cap = Capability::named([("gpu", 1)], "gpu");
        let mut registry = ActorRegistry::new();
        registry.register(CapabilitySet::new([cap.clone()]), tag_factory("gpu"));

        let mut scheduler = Scheduler::new(
            registry,
            ResourceMap::new(),
            SchedulerConfig::default(),
        )
        .unwrap();

        for _ in 0..4 {
            scheduler
                .submit(SchedulerTask::new("t".to_string(), vec![cap.clone()]))
                .unwrap();
        }
        assert_eq!(scheduler.plan_desired()[0], 4);
    }
}
