//! A settle-once promise.
//!
//! A [`Promise`] represents the eventual outcome of an operation. It starts
//! [`State::Pending`] and settles exactly once, either fulfilled with a value
//! or rejected with a cause. Every settlement goes through one engine that
//! adopts inner promises and [`Thenable`]s, reports to the installed observer
//! and hands listener notification to the runtime's [`Scheduler`].
//!
//! # Examples
//!
//! ```
//! use q_promise::{Handler, Promise, Resolution, Runtime, State, TurnQueue};
//!
//! let queue = TurnQueue::new();
//! let rt = Runtime::new(queue.clone());
//!
//! let p = Promise::<i32, q_promise::Error>::pending(&rt);
//! let doubled = p.then(Handler::value(|v| Ok(v * 2)), Handler::Absent);
//! p.resolve_with(Resolution::Value(21));
//!
//! // handlers never run on the settling call
//! assert_eq!(doubled.state(), State::Pending);
//! queue.run_until_idle();
//! assert_eq!(doubled.value(), Some(Ok(42)));
//! ```
use thiserror::Error;

mod engine;
mod future;

pub mod channel;
pub mod handler;
pub mod hook;
pub mod promise;
pub mod runtime;
pub mod scheduler;
pub mod state;

pub use engine::{Rejecter, Resolver};
pub use handler::{Handler, Resolution, Thenable};
pub use hook::{clear_on_resolve, on_resolve, Observer, ObserverSlot, Settlement};
pub use promise::Promise;
pub use runtime::{Builder, Runtime};
pub use scheduler::{Scheduler, Task, TurnQueue};
pub use state::{PromiseId, State};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("a promise cannot be resolved with itself")]
    SelfResolution,
    #[error("callback panicked: {message}")]
    Panicked { message: String },
    #[error("the scheduler no longer accepts tasks")]
    SchedulerClosed,
}
