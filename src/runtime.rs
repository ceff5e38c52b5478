use crate::hook::{self, ObserverSlot};
use crate::{Scheduler, Task, TurnQueue};
use std::sync::Arc;

/// The collaborators every promise is created with: the scheduler that runs
/// deferred work and the observer slot settlements are reported to.
///
/// Cloning is cheap and clones share both collaborators.
#[derive(Clone)]
pub struct Runtime {
    scheduler: Arc<dyn Scheduler>,
    observers: ObserverSlot,
    name: Arc<str>,
}

impl Runtime {
    /// A runtime on `scheduler` that reports to the process-wide observer.
    pub fn new<S: Scheduler + 'static>(scheduler: S) -> Self {
        Builder::default().scheduler(scheduler).build()
    }

    pub fn builder() -> Builder {
        Builder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn observers(&self) -> &ObserverSlot {
        &self.observers
    }

    pub(crate) fn defer(&self, task: Task) {
        if let Err(err) = self.scheduler.defer(task) {
            tracing::error!(
                event = "runtime.defer_failed",
                runtime = %self.name,
                error = %err,
                "Scheduler refused a task, notification dropped"
            );
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("name", &self.name)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

/// Configures a [`Runtime`].
///
/// # Examples
///
/// ```
/// use q_promise::{ObserverSlot, Runtime, TurnQueue};
///
/// let rt = Runtime::builder()
///     .name("io")
///     .scheduler(TurnQueue::new())
///     .observers(ObserverSlot::new())
///     .build();
/// assert_eq!(rt.name(), "io");
/// ```
#[derive(Default)]
pub struct Builder {
    scheduler: Option<Arc<dyn Scheduler>>,
    observers: Option<ObserverSlot>,
    name: Option<String>,
}

impl Builder {
    pub fn scheduler<S: Scheduler + 'static>(mut self, scheduler: S) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Report settlements to `slot` instead of the process-wide one.
    pub fn observers(mut self, slot: ObserverSlot) -> Self {
        self.observers = Some(slot);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// Without a scheduler the runtime gets a private [`TurnQueue`] that
    /// nothing drives, so handlers never run. Useful only for inspecting
    /// synchronous settlement.
    pub fn build(self) -> Runtime {
        Runtime {
            scheduler: self
                .scheduler
                .unwrap_or_else(|| Arc::new(TurnQueue::new())),
            observers: self.observers.unwrap_or_else(hook::global),
            name: self.name.unwrap_or_else(|| "default".to_owned()).into(),
        }
    }
}

/// A scheduler that refuses everything, for exercising the failure path.
#[cfg(test)]
pub(crate) struct Closed;

#[cfg(test)]
impl Scheduler for Closed {
    fn defer(&self, _task: Task) -> Result<(), crate::Error> {
        Err(crate::Error::SchedulerClosed)
    }
}
