//! Dedicated worker-thread backend.
//!
//! Each actor lives on its own OS thread and talks to the coordinator over
//! two bounded channels (request, response; depth 1 by default), so a busy
//! actor naturally stalls new submissions until its response drains. A
//! separate setup channel confirms successful construction before the link
//! is usable; construction failures are re-raised synchronously to the
//! spawner. Channel I/O is bridged off the coordinating loop through the
//! runtime's blocking thread pool, so the coordinator never waits on a
//! worker directly.
//!
//! Failures inside the worker loop travel back over the response channel as
//! data: an error or panic in `consume` never terminates the loop. Only a
//! disconnected channel, meaning the thread itself is gone, surfaces as
//! [`TaskError::ActorLost`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use crossbeam_channel::{bounded, Receiver, Sender};
use futures::future::{self, FutureExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::actor::{Actor, ActorFactory, SpawnContext};
use crate::core::error::{consume_error, SchedulerError, TaskError, TaskOutcome};

use super::{ActorLink, CallFuture, DistBackend};

/// Backend hosting one dedicated OS thread per actor.
pub struct WorkerBackend {
    channel_depth: usize,
}

impl WorkerBackend {
    /// Create a worker backend with the given request/response channel depth.
    pub fn new(channel_depth: usize) -> Self {
        Self { channel_depth }
    }
}

struct WorkerLink<P, R> {
    request_tx: Option<Sender<P>>,
    response_rx: Receiver<TaskOutcome<R>>,
    thread: Option<JoinHandle<()>>,
    worker_id: Uuid,
}

impl<P, R> ActorLink<P, R> for WorkerLink<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    fn call(&mut self, argument: P) -> CallFuture<R> {
        let Some(request_tx) = self.request_tx.clone() else {
            return future::ready(Err(TaskError::ActorLost("worker already killed".into())))
                .boxed();
        };
        let response_rx = self.response_rx.clone();
        let worker_id = self.worker_id;

        async move {
            let relayed = tokio::task::spawn_blocking(move || {
                request_tx.send(argument).map_err(|_| ())?;
                response_rx.recv().map_err(|_| ())
            })
            .await;

            match relayed {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(())) => Err(TaskError::ActorLost(format!(
                    "worker {worker_id} channel closed"
                ))),
                Err(join_err) => Err(TaskError::ActorLost(format!(
                    "worker {worker_id} relay failed: {join_err}"
                ))),
            }
        }
        .boxed()
    }

    fn kill(&mut self) {
        // closing the request channel ends the worker loop; the link is only
        // killed while idle, so the join is short
        self.request_tx = None;
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!(worker = %self.worker_id, "worker thread panicked outside consume");
            }
        }
        debug!(worker = %self.worker_id, "worker stopped");
    }
}

#[async_trait]
impl<P, R> DistBackend<P, R> for WorkerBackend
where
    P: Send + 'static,
    R: Send + 'static,
{
    async fn spawn(
        &self,
        factory: Arc<dyn ActorFactory<P, R>>,
        ctx: SpawnContext,
    ) -> Result<Box<dyn ActorLink<P, R>>, SchedulerError> {
        let (request_tx, request_rx) = bounded::<P>(self.channel_depth);
        let (response_tx, response_rx) = bounded::<TaskOutcome<R>>(self.channel_depth);
        let (setup_tx, setup_rx) = bounded::<anyhow::Result<()>>(1);
        let worker_id = ctx.worker_id();

        let thread = thread::Builder::new()
            .name(format!("capq-worker-{worker_id}"))
            .spawn(move || worker_loop(factory, ctx, request_rx, response_tx, setup_tx))
            .map_err(|e| SchedulerError::Backend(format!("worker thread spawn: {e}")))?;

        // construction is confirmed before the link is usable
        let setup = tokio::task::spawn_blocking(move || setup_rx.recv()).await;
        match setup {
            Ok(Ok(Ok(()))) => {
                debug!(worker = %worker_id, "worker actor built");
                Ok(Box::new(WorkerLink {
                    request_tx: Some(request_tx),
                    response_rx,
                    thread: Some(thread),
                    worker_id,
                }))
            }
            Ok(Ok(Err(build_err))) => {
                let _ = thread.join();
                Err(SchedulerError::ActorConstruction(build_err))
            }
            Ok(Err(_recv_err)) => {
                let _ = thread.join();
                Err(SchedulerError::Backend(format!(
                    "worker {worker_id} exited before reporting construction"
                )))
            }
            Err(join_err) => Err(SchedulerError::Backend(format!(
                "worker {worker_id} setup relay failed: {join_err}"
            ))),
        }
    }

    async fn join(&mut self) {
        // worker threads are owned by their links; nothing global to release
        debug!("worker backend joined");
    }
}

/// The worker side: build the actor, report setup, then serve requests until
/// the request channel closes.
fn worker_loop<P, R>(
    factory: Arc<dyn ActorFactory<P, R>>,
    ctx: SpawnContext,
    request_rx: Receiver<P>,
    response_tx: Sender<TaskOutcome<R>>,
    setup_tx: Sender<anyhow::Result<()>>,
) where
    P: Send + 'static,
    R: Send + 'static,
{
    let mut actor = match factory.build(&ctx) {
        Ok(actor) => {
            let _ = setup_tx.send(Ok(()));
            actor
        }
        Err(build_err) => {
            let _ = setup_tx.send(Err(build_err));
            return;
        }
    };

    while let Ok(argument) = request_rx.recv() {
        let outcome = run_consume(actor.as_mut(), argument);
        if response_tx.send(outcome).is_err() {
            break;
        }
    }
    actor.stop();
}

/// Run one consume, converting error returns and panics into data.
pub(crate) fn run_consume<P, R>(actor: &mut dyn Actor<P, R>, argument: P) -> TaskOutcome<R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    match panic::catch_unwind(AssertUnwindSafe(|| actor.consume(argument))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(consume_error(error)),
        Err(payload) => Err(TaskError::Consume {
            message: panic_message(payload.as_ref()),
            trace: std::backtrace::Backtrace::force_capture().to_string(),
        }),
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "actor panicked".to_owned()
    }
}
