//! Cluster backend: long-lived runtime tasks standing in for remote workers.
//!
//! Each actor runs inside a spawned task and is driven over a capacity-one
//! request channel; completions wrap the runtime's native oneshot primitive.
//! Failures leave the worker as [`TaskError::Remote`] envelopes, and the
//! backend's reclassify hook translates them back into locally meaningful
//! consume failures before they reach the result consumer, the same way a
//! real cluster framework's error wrappers are unwrapped at the coordinator.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{self, FutureExt};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use crate::core::actor::{Actor, ActorFactory, SpawnContext};
use crate::core::error::{SchedulerError, TaskError, TaskOutcome};

use super::{ActorLink, CallFuture, DistBackend};

/// Backend hosting actors on long-lived runtime tasks.
#[derive(Default)]
pub struct ClusterBackend;

impl ClusterBackend {
    /// Create the cluster backend.
    pub fn new() -> Self {
        Self
    }
}

struct ClusterRequest<P, R> {
    argument: P,
    reply: oneshot::Sender<TaskOutcome<R>>,
}

struct ClusterLink<P, R> {
    request_tx: Option<mpsc::Sender<ClusterRequest<P, R>>>,
    task: Option<tokio::task::JoinHandle<()>>,
    worker_id: Uuid,
}

impl<P, R> ActorLink<P, R> for ClusterLink<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    fn call(&mut self, argument: P) -> CallFuture<R> {
        let Some(request_tx) = self.request_tx.clone() else {
            return future::ready(Err(TaskError::ActorLost(
                "remote worker already killed".into(),
            )))
            .boxed();
        };
        let worker_id = self.worker_id;

        async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            let request = ClusterRequest {
                argument,
                reply: reply_tx,
            };
            if request_tx.send(request).await.is_err() {
                return Err(TaskError::ActorLost(format!(
                    "remote worker {worker_id} is gone"
                )));
            }
            match reply_rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(TaskError::ActorLost(format!(
                    "remote worker {worker_id} dropped the reply"
                ))),
            }
        }
        .boxed()
    }

    fn kill(&mut self) {
        self.request_tx = None;
        if let Some(task) = self.task.take() {
            // forceful termination; in-flight work is not cancelled
            // cooperatively and its result is lost
            task.abort();
        }
        debug!(worker = %self.worker_id, "remote worker killed");
    }
}

#[async_trait]
impl<P, R> DistBackend<P, R> for ClusterBackend
where
    P: Send + 'static,
    R: Send + 'static,
{
    async fn spawn(
        &self,
        factory: Arc<dyn ActorFactory<P, R>>,
        ctx: SpawnContext,
    ) -> Result<Box<dyn ActorLink<P, R>>, SchedulerError> {
        let (request_tx, request_rx) = mpsc::channel::<ClusterRequest<P, R>>(1);
        let (ready_tx, ready_rx) = oneshot::channel::<anyhow::Result<()>>();
        let worker_id = ctx.worker_id();

        let task = tokio::spawn(remote_worker(factory, ctx, request_rx, ready_tx));

        match ready_rx.await {
            Ok(Ok(())) => {
                debug!(worker = %worker_id, "remote worker ready");
                Ok(Box::new(ClusterLink {
                    request_tx: Some(request_tx),
                    task: Some(task),
                    worker_id,
                }))
            }
            Ok(Err(build_err)) => Err(SchedulerError::ActorConstruction(build_err)),
            Err(_) => Err(SchedulerError::Backend(format!(
                "remote worker {worker_id} exited before reporting readiness"
            ))),
        }
    }

    async fn join(&mut self) {
        // remote workers are owned by their links; nothing global to release
        debug!("cluster backend joined");
    }

    fn reclassify(&self, error: TaskError) -> TaskError {
        match error {
            TaskError::Remote { message, trace } => TaskError::Consume { message, trace },
            other => other,
        }
    }
}

async fn remote_worker<P, R>(
    factory: Arc<dyn ActorFactory<P, R>>,
    ctx: SpawnContext,
    mut request_rx: mpsc::Receiver<ClusterRequest<P, R>>,
    ready_tx: oneshot::Sender<anyhow::Result<()>>,
) where
    P: Send + 'static,
    R: Send + 'static,
{
    let mut actor = match factory.build(&ctx) {
        Ok(actor) => {
            let _ = ready_tx.send(Ok(()));
            actor
        }
        Err(build_err) => {
            let _ = ready_tx.send(Err(build_err));
            return;
        }
    };

    while let Some(request) = request_rx.recv().await {
        let outcome = run_remote(actor.as_mut(), request.argument);
        let _ = request.reply.send(outcome);
    }
    actor.stop();
}

/// Run one consume on the remote side, wrapping any failure in the remote
/// error envelope.
fn run_remote<P, R>(actor: &mut dyn Actor<P, R>, argument: P) -> TaskOutcome<R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    match panic::catch_unwind(AssertUnwindSafe(|| actor.consume(argument))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(TaskError::Remote {
            message: error.to_string(),
            trace: format!("{error:?}"),
        }),
        Err(payload) => Err(TaskError::Remote {
            message: super::worker::panic_message(payload.as_ref()),
            trace: std::backtrace::Backtrace::force_capture().to_string(),
        }),
    }
}
