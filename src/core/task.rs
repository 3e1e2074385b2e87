//! The task envelope submitted to the scheduler.

use crate::core::capability::Capability;

/// One unit of work: an opaque argument plus the capability handles the
/// executing actor must provide. Consumed exactly once.
#[derive(Debug, Clone)]
pub struct SchedulerTask<P> {
    /// Payload handed to the actor's `consume`.
    pub argument: P,
    /// Capabilities the executing actor's profile must be a superset of.
    pub requirements: Vec<Capability>,
}

impl<P> SchedulerTask<P> {
    /// Create a task from an argument and its capability requirements.
    pub fn new(argument: P, requirements: Vec<Capability>) -> Self {
        Self {
            argument,
            requirements,
        }
    }
}
