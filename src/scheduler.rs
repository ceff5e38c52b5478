//! The "next turn" capability the engine defers all listener work to.
//!
//! A [`Scheduler`] must run each task later than the call that deferred it,
//! on a fresh call stack, and in the order tasks were deferred.
use crate::Error;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync {
    /// Queue `task` for a later turn. A scheduler that can no longer run
    /// tasks returns [`Error::SchedulerClosed`] and drops the task.
    ///
    /// Called with a promise lock held; it must never run `task` inline.
    fn defer(&self, task: Task) -> Result<(), Error>;
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn defer(&self, task: Task) -> Result<(), Error> {
        (**self).defer(task)
    }
}

/// A manually driven FIFO of turns.
///
/// Nothing runs until the owner calls [`TurnQueue::run_next`] or
/// [`TurnQueue::run_until_idle`], which makes ordering fully deterministic.
/// Clones share the same queue.
///
/// # Examples
///
/// ```
/// use q_promise::{Scheduler, TurnQueue};
/// use std::sync::{Arc, Mutex};
///
/// let queue = TurnQueue::new();
/// let seen = Arc::new(Mutex::new(vec![]));
/// for i in 0..3 {
///     let seen = seen.clone();
///     queue.defer(Box::new(move || seen.lock().unwrap().push(i))).unwrap();
/// }
/// assert_eq!(queue.run_until_idle(), 3);
/// assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
/// ```
#[derive(Clone, Default)]
pub struct TurnQueue {
    tasks: Arc<Mutex<VecDeque<Task>>>,
}

impl TurnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run the oldest queued task. Returns `false` if the queue was empty.
    pub fn run_next(&self) -> bool {
        // the guard must be gone before the task runs, tasks defer more tasks
        let task = self.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks, including ones queued while running, until none are left.
    /// Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for TurnQueue {
    fn defer(&self, task: Task) -> Result<(), Error> {
        self.lock().push_back(task);
        Ok(())
    }
}

impl std::fmt::Debug for TurnQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnQueue").field("queued", &self.len()).finish()
    }
}
