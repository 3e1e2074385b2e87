//! Error types for scheduler and backend operations.

use thiserror::Error;

/// Systemic errors surfaced to the caller of `submit`/`process`/`join`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No registered capability set is a superset of a task's requirements.
    /// Raised at submission time, never after silent queueing.
    #[error("no registered capability set satisfies task requirements: {0}")]
    UnroutableTask(String),
    /// An actor factory failed while the pool was growing. Aborts that growth
    /// step; the original failure is preserved as the source.
    #[error("actor construction failed")]
    ActorConstruction(#[source] anyhow::Error),
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Backend infrastructure failure with context.
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Per-task failure delivered to the result consumer as an error value.
///
/// A `TaskError` never aborts the coordinating loop; it is buffered and
/// flushed alongside successful results.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The actor's `consume` failed (error return or panic). Carries the
    /// original message and the captured diagnostic context, not a collapsed
    /// summary.
    #[error("consume failed: {message}")]
    Consume {
        /// Top-level message of the original failure.
        message: String,
        /// Error chain and stack context captured at the failure site.
        trace: String,
    },
    /// The worker holding the actor is gone (thread or task died, channel
    /// closed). The owning handle is marked dead and respawned on the next
    /// reorganization.
    #[error("actor lost: {0}")]
    ActorLost(String),
    /// Failure envelope produced by the cluster backend; translated into a
    /// [`TaskError::Consume`] by the backend's reclassify hook before
    /// delivery.
    #[error("remote failure: {message}")]
    Remote {
        /// Top-level message carried in the envelope.
        message: String,
        /// Diagnostic context carried in the envelope.
        trace: String,
    },
}

impl TaskError {
    /// Top-level message of the failure.
    pub fn message(&self) -> &str {
        match self {
            Self::Consume { message, .. } | Self::Remote { message, .. } => message,
            Self::ActorLost(reason) => reason,
        }
    }

    /// Captured diagnostic context, if the failure carries one.
    pub fn trace(&self) -> Option<&str> {
        match self {
            Self::Consume { trace, .. } | Self::Remote { trace, .. } => Some(trace),
            Self::ActorLost(_) => None,
        }
    }
}

/// Outcome of a single task: the actor's return value or a propagated failure.
pub type TaskOutcome<R> = Result<R, TaskError>;

/// Wrap a user-actor failure, keeping its chain and any captured backtrace.
pub(crate) fn consume_error(error: anyhow::Error) -> TaskError {
    TaskError::Consume {
        message: error.to_string(),
        trace: format!("{error:?}"),
    }
}
