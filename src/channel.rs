//! A scheduler backed by a multi-producer, single-consumer channel. Every
//! clone of the [`Worker`] feeds the same dedicated thread, which runs the
//! tasks one at a time in the order they were sent.
//!
use crate::{Error, Scheduler, Task};
use std::{
    io,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::mpsc::{channel, Receiver, Sender},
    thread,
};

/// # Examples
///
/// ```
/// use q_promise::{channel::Worker, Promise, Resolution, Runtime};
/// use futures::executor::block_on;
/// use std::{thread, time::Duration};
///
/// let rt = Runtime::new(Worker::spawn("promises").unwrap());
/// let p = Promise::<i32, q_promise::Error>::new(&rt, |resolve, _reject| {
///     thread::spawn(move || {
///         thread::sleep(Duration::from_millis(5));
///         resolve.resolve(42);
///     });
///     Ok(())
/// });
/// assert_eq!(block_on(p), Ok(42));
/// ```
#[derive(Debug, Clone)]
pub struct Worker {
    sender: Sender<Task>,
}

impl Worker {
    /// Start the worker thread. It exits once every clone of the returned
    /// handle has been dropped and the queue is drained.
    pub fn spawn(name: &str) -> io::Result<Self> {
        let (tx, rx) = channel();
        thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || drain(rx))?;
        Ok(Worker { sender: tx })
    }
}

fn drain(receiver: Receiver<Task>) {
    for task in receiver {
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::warn!(event = "worker.task_panicked", "Scheduled task panicked");
        }
    }
    tracing::trace!(event = "worker.exit", "All worker handles dropped");
}

impl Scheduler for Worker {
    fn defer(&self, task: Task) -> Result<(), Error> {
        self.sender.send(task).map_err(|_| Error::SchedulerClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::Worker;
    use crate::Scheduler;
    use std::sync::mpsc::channel;
    use std::thread;

    #[test]
    fn test_worker_runs_tasks_in_order() {
        let worker = Worker::spawn("test-worker").unwrap();
        let (tx, rx) = channel();
        for i in 0..5 {
            let tx = tx.clone();
            worker.defer(Box::new(move || tx.send(i).unwrap())).unwrap();
        }
        let seen: Vec<i32> = rx.iter().take(5).collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_worker_runs_off_the_calling_thread() {
        let worker = Worker::spawn("test-worker").unwrap();
        let caller = thread::current().id();
        let (tx, rx) = channel();
        worker
            .defer(Box::new(move || tx.send(thread::current().id()).unwrap()))
            .unwrap();
        assert_ne!(rx.recv().unwrap(), caller);
    }

    #[test]
    fn test_worker_survives_a_panicking_task() {
        let worker = Worker::spawn("test-worker").unwrap();
        let (tx, rx) = channel();
        worker.defer(Box::new(|| panic!("boom"))).unwrap();
        worker.defer(Box::new(move || tx.send("still alive").unwrap())).unwrap();
        assert_eq!(rx.recv().unwrap(), "still alive");
    }
}
