//! The values that flow into the resolution engine.
use crate::{Promise, Rejecter, Resolver};
use std::fmt;

/// What a promise is being resolved with.
///
/// Only `Value` settles a promise directly. A `Promise` or `Thenable` is
/// followed until it produces a plain value or a rejection.
pub enum Resolution<T, E> {
    Value(T),
    Promise(Promise<T, E>),
    Thenable(Box<dyn Thenable<T, E>>),
}

impl<T, E> Resolution<T, E> {
    pub fn thenable<Th: Thenable<T, E> + 'static>(thenable: Th) -> Self {
        Resolution::Thenable(Box::new(thenable))
    }
}

impl<T, E> From<Promise<T, E>> for Resolution<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Resolution::Promise(promise)
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Promise(promise) => f.debug_tuple("Promise").field(&promise.id()).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

/// A foreign deferred value the engine knows how to follow.
///
/// `then` is called once, on a scheduled turn, with a resolving pair for the
/// promise that adopts it. Only the first call made through the pair counts.
/// Returning `Err` rejects the adopting promise unless the pair was already
/// used.
///
/// # Examples
///
/// ```
/// use q_promise::{Promise, Rejecter, Resolution, Resolver, Runtime, Thenable, TurnQueue};
///
/// struct Ready(i32);
///
/// impl Thenable<i32, q_promise::Error> for Ready {
///     fn then(
///         self: Box<Self>,
///         resolve: Resolver<i32, q_promise::Error>,
///         _reject: Rejecter<i32, q_promise::Error>,
///     ) -> Result<(), q_promise::Error> {
///         resolve.resolve(self.0);
///         Ok(())
///     }
/// }
///
/// let queue = TurnQueue::new();
/// let rt = Runtime::new(queue.clone());
/// let p = Promise::<i32, q_promise::Error>::resolve(&rt, Resolution::thenable(Ready(5)));
/// assert_eq!(p.value(), None);
/// queue.run_until_idle();
/// assert_eq!(p.value(), Some(Ok(5)));
/// ```
pub trait Thenable<T, E>: Send {
    fn then(self: Box<Self>, resolve: Resolver<T, E>, reject: Rejecter<T, E>) -> Result<(), E>;
}

/// An optional `then` callback.
///
/// A present handler receives the value (or cause) and produces the
/// resolution of the derived promise; `Err` rejects it. An absent handler
/// forwards the source outcome unchanged.
pub enum Handler<A, T, E> {
    Absent,
    Present(Box<dyn FnOnce(A) -> Result<Resolution<T, E>, E> + Send>),
}

impl<A, T, E> Handler<A, T, E> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(A) -> Result<Resolution<T, E>, E> + Send + 'static,
    {
        Handler::Present(Box::new(f))
    }

    /// A handler that always produces a plain value.
    pub fn value<F>(f: F) -> Self
    where
        F: FnOnce(A) -> Result<T, E> + Send + 'static,
        A: 'static,
        T: 'static,
        E: 'static,
    {
        Handler::new(move |arg| f(arg).map(Resolution::Value))
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Handler::Present(_))
    }
}

impl<A, T, E> Default for Handler<A, T, E> {
    fn default() -> Self {
        Handler::Absent
    }
}

impl<A, T, E> fmt::Debug for Handler<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Handler::Absent => "Absent",
            Handler::Present(_) => "Present(..)",
        })
    }
}
