use crate::engine::{self, Inner, Listener, Origin, Outcome};
use crate::{Error, Handler, PromiseId, Rejecter, Resolution, Resolver, Runtime, State};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A value that will be fulfilled or rejected exactly once.
///
/// `Promise` is a handle: clones refer to the same promise, and two handles
/// compare equal only when they do. The cause type needs `From<Error>` so the
/// engine can reject with its own failures (a panicking callback, a promise
/// resolved with itself).
///
/// # Examples
///
/// ```
/// use q_promise::{Handler, Promise, Runtime, State, TurnQueue};
///
/// let queue = TurnQueue::new();
/// let rt = Runtime::new(queue.clone());
///
/// let p = Promise::<i32, q_promise::Error>::new(&rt, |_resolve, _reject| {
///     Err(q_promise::Error::SelfResolution)
/// });
/// assert_eq!(p.state(), State::Rejected);
///
/// let recovered = p.catch(Handler::value(|_cause| Ok(0)));
/// queue.run_until_idle();
/// assert_eq!(recovered.value(), Some(Ok(0)));
/// ```
pub struct Promise<T, E> {
    shared: Arc<Shared<T, E>>,
}

struct Shared<T, E> {
    id: PromiseId,
    runtime: Runtime,
    inner: Mutex<Inner<T, E>>,
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + From<Error> + Send + 'static,
{
    /// An unsettled promise with no executor.
    pub fn pending(runtime: &Runtime) -> Self {
        Promise {
            shared: Arc::new(Shared {
                id: PromiseId::next(),
                runtime: runtime.clone(),
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    /// Create a promise and run `executor` with its resolving pair before
    /// returning.
    ///
    /// An executor that returns `Err` or panics rejects the promise, unless it
    /// already used the pair. The failure never escapes this call.
    pub fn new<F>(runtime: &Runtime, executor: F) -> Self
    where
        F: FnOnce(Resolver<T, E>, Rejecter<T, E>) -> Result<(), E>,
    {
        let promise = Self::pending(runtime);
        let (resolve, reject) = engine::resolving_pair(&promise, Origin::Caller);
        let fallback = reject.clone();
        if let Err(cause) = engine::guarded(move || executor(resolve, reject)) {
            fallback.reject(cause);
        }
        promise
    }

    /// A promise settled through the fulfillment path with `resolution`.
    pub fn resolve(runtime: &Runtime, resolution: Resolution<T, E>) -> Self {
        let promise = Self::pending(runtime);
        promise.resolve_with(resolution);
        promise
    }

    /// Like [`Promise::resolve`], with the resolution produced by `f`.
    pub fn resolve_fn<F>(runtime: &Runtime, f: F) -> Self
    where
        F: FnOnce() -> Resolution<T, E>,
    {
        let promise = Self::pending(runtime);
        match engine::guarded(move || Ok(f())) {
            Ok(resolution) => promise.resolve_with(resolution),
            Err(cause) => promise.reject_with(cause),
        }
        promise
    }

    /// A promise rejected with `cause`. The cause is stored as given even if
    /// it holds another promise.
    pub fn reject(runtime: &Runtime, cause: E) -> Self {
        let promise = Self::pending(runtime);
        promise.reject_with(cause);
        promise
    }

    /// Like [`Promise::reject`], with the cause produced by `f`.
    pub fn reject_fn<F>(runtime: &Runtime, f: F) -> Self
    where
        F: FnOnce() -> E,
    {
        let promise = Self::pending(runtime);
        let cause = engine::guarded(move || Ok::<E, E>(f())).unwrap_or_else(|cause| cause);
        promise.reject_with(cause);
        promise
    }

    /// Settle this promise through the fulfillment path. Ignored once the
    /// promise is settled.
    ///
    /// Also ignored while the promise is still pending but following another
    /// promise or a thenable: only that value can settle it then, so a
    /// following promise cannot be overridden by a later direct call.
    pub fn resolve_with(&self, resolution: Resolution<T, E>) {
        self.settle(Outcome::Fulfill(resolution), Origin::Caller)
    }

    /// Reject this promise with `cause`. Ignored once the promise is settled,
    /// and while it is pending but following another value (see
    /// [`Promise::resolve_with`]).
    pub fn reject_with(&self, cause: E) {
        self.settle(Outcome::Reject(cause), Origin::Caller)
    }

    /// Register callbacks and return the promise they settle.
    ///
    /// Present handlers always run on a later turn, in registration order
    /// relative to other `then` calls on this promise. An absent handler
    /// forwards the outcome to the returned promise; if this promise is
    /// already settled that happens before `then` returns.
    pub fn then(&self, on_fulfilled: Handler<T, T, E>, on_rejected: Handler<E, T, E>) -> Self {
        let derived = Self::pending(self.runtime());
        self.subscribe(Listener {
            on_fulfilled,
            on_rejected,
            derived: derived.clone(),
        });
        derived
    }

    pub fn catch(&self, on_rejected: Handler<E, T, E>) -> Self {
        self.then(Handler::Absent, on_rejected)
    }

    /// The fulfillment value or rejection cause, `None` while pending.
    pub fn value(&self) -> Option<Result<T, E>> {
        self.lock().outcome()
    }
}

impl<T, E> Promise<T, E> {
    pub fn id(&self) -> PromiseId {
        self.shared.id
    }

    pub fn state(&self) -> State {
        self.lock().state()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.shared.runtime
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Promise {
            shared: self.shared.clone(),
        }
    }
}

impl<T, E> PartialEq for Promise<T, E> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T, E> Eq for Promise<T, E> {}

impl<T, E> Hash for Promise<T, E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shared.id.hash(state)
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ObserverSlot, TurnQueue};

    fn runtime() -> (TurnQueue, Runtime) {
        let queue = TurnQueue::new();
        let rt = Runtime::builder()
            .scheduler(queue.clone())
            .observers(ObserverSlot::new())
            .build();
        (queue, rt)
    }

    #[test]
    fn test_pending_has_no_value() {
        let (_, rt) = runtime();
        let p = Promise::<i32, Error>::pending(&rt);
        assert_eq!(p.state(), State::Pending);
        assert_eq!(p.value(), None);
    }

    #[test]
    fn test_clones_share_identity() {
        let (_, rt) = runtime();
        let p = Promise::<i32, Error>::pending(&rt);
        let q = p.clone();
        assert_eq!(p, q);
        assert_eq!(p.id(), q.id());
        q.resolve_with(Resolution::Value(1));
        assert_eq!(p.value(), Some(Ok(1)));
    }

    #[test]
    fn test_distinct_promises_are_never_equal() {
        let (_, rt) = runtime();
        let a = Promise::<i32, Error>::resolve(&rt, Resolution::Value(1));
        let b = Promise::<i32, Error>::resolve(&rt, Resolution::Value(1));
        assert_ne!(a, b);
        assert_eq!(a.value(), b.value());
    }

    #[test]
    fn test_then_always_returns_a_new_promise() {
        let (_, rt) = runtime();
        let p = Promise::<i32, Error>::pending(&rt);
        let d1 = p.then(Handler::Absent, Handler::Absent);
        let d2 = p.then(Handler::Absent, Handler::Absent);
        assert_ne!(p, d1);
        assert_ne!(d1, d2);
    }

    #[test]
    fn test_executor_runs_before_new_returns() {
        let (_, rt) = runtime();
        let mut ran = false;
        let p = Promise::<i32, Error>::new(&rt, |resolve, _| {
            ran = true;
            resolve.resolve(3);
            Ok(())
        });
        assert!(ran);
        assert_eq!(p.value(), Some(Ok(3)));
    }

    #[test]
    fn test_executor_failure_after_resolving_is_ignored() {
        let (_, rt) = runtime();
        let p = Promise::<i32, Error>::new(&rt, |resolve, _| {
            resolve.resolve(3);
            Err(Error::SelfResolution)
        });
        assert_eq!(p.value(), Some(Ok(3)));
    }

    #[test]
    fn test_executor_panic_becomes_the_cause() {
        let (_, rt) = runtime();
        let p = Promise::<i32, Error>::new(&rt, |_, _| panic!("executor error"));
        assert_eq!(
            p.value(),
            Some(Err(Error::Panicked {
                message: "executor error".into()
            }))
        );
    }

    #[test]
    fn test_resolve_fn_uses_the_produced_value() {
        let (_, rt) = runtime();
        let p = Promise::<i32, Error>::resolve_fn(&rt, || Resolution::Value(123));
        assert_eq!(p.value(), Some(Ok(123)));
    }

    #[test]
    fn test_reject_fn_uses_the_produced_cause() {
        let (_, rt) = runtime();
        let p = Promise::<i32, Error>::reject_fn(&rt, || Error::SchedulerClosed);
        assert_eq!(p.value(), Some(Err(Error::SchedulerClosed)));
    }

    #[test]
    fn test_debug_shows_identity_and_state() {
        let (_, rt) = runtime();
        let p = Promise::<i32, Error>::resolve(&rt, Resolution::Value(1));
        let shown = format!("{:?}", p);
        assert!(shown.contains("Fulfilled"));
        assert!(shown.contains(&format!("{:?}", p.id())));
    }
}
