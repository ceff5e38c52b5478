//! The resolution engine.
//!
//! [`Promise::settle`] is the only code that moves a promise out of
//! `Pending`. Every entry point funnels into it: executors and their
//! resolving pairs, the static factories, the in-place helpers and the
//! outcome of `then` handlers.
//!
//! The promise lock is never held while user code runs. Settlement takes the
//! listeners out and hands them to the scheduler under the lock (deferring
//! runs no user code), so batches reach the queue in the order their
//! listeners registered, whichever threads they came from. Wakers and the
//! observer run after the lock is released.
use crate::hook::Settlement;
use crate::{Error, Handler, Promise, Resolution, State, Thenable};
use std::any::Any;
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard};
use std::task::Waker;

pub(crate) struct Inner<T, E> {
    slot: Slot<T, E>,
    /// Set once the promise adopts another promise or a thenable. From then on
    /// only the adoption may settle it.
    following: bool,
    listeners: Vec<Listener<T, E>>,
    pub(crate) wakers: Vec<Waker>,
}

enum Slot<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Default for Inner<T, E> {
    fn default() -> Self {
        Inner {
            slot: Slot::Pending,
            following: false,
            listeners: Vec::new(),
            wakers: Vec::new(),
        }
    }
}

impl<T, E> Inner<T, E> {
    pub(crate) fn state(&self) -> State {
        match self.slot {
            Slot::Pending => State::Pending,
            Slot::Fulfilled(_) => State::Fulfilled,
            Slot::Rejected(_) => State::Rejected,
        }
    }

    fn accepts(&self, origin: Origin) -> bool {
        matches!(self.slot, Slot::Pending) && !(self.following && origin == Origin::Caller)
    }
}

impl<T: Clone, E: Clone> Inner<T, E> {
    pub(crate) fn outcome(&self) -> Option<Result<T, E>> {
        match &self.slot {
            Slot::Pending => None,
            Slot::Fulfilled(value) => Some(Ok(value.clone())),
            Slot::Rejected(cause) => Some(Err(cause.clone())),
        }
    }
}

pub(crate) enum Outcome<T, E> {
    Fulfill(Resolution<T, E>),
    Reject(E),
}

/// Who is asking to settle a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Executors, factories and the in-place helpers.
    Caller,
    /// The value a promise is following, or the source of a derived promise.
    Adoption,
}

/// One `then` registration.
pub(crate) struct Listener<T, E> {
    pub(crate) on_fulfilled: Handler<T, T, E>,
    pub(crate) on_rejected: Handler<E, T, E>,
    pub(crate) derived: Promise<T, E>,
}

impl<T, E> Listener<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + From<Error> + Send + 'static,
{
    fn forwarding(derived: Promise<T, E>) -> Self {
        Listener {
            on_fulfilled: Handler::Absent,
            on_rejected: Handler::Absent,
            derived,
        }
    }

    /// Whether a user callback runs for `outcome`.
    fn handles(&self, outcome: &Result<T, E>) -> bool {
        match outcome {
            Ok(_) => self.on_fulfilled.is_present(),
            Err(_) => self.on_rejected.is_present(),
        }
    }

    fn run(self, outcome: Result<T, E>) {
        let settlement = match (outcome, self.on_fulfilled, self.on_rejected) {
            (Ok(value), Handler::Present(f), _) => invoke(f, value),
            (Ok(value), Handler::Absent, _) => Outcome::Fulfill(Resolution::Value(value)),
            (Err(cause), _, Handler::Present(f)) => invoke(f, cause),
            (Err(cause), _, Handler::Absent) => Outcome::Reject(cause),
        };
        self.derived.settle(settlement, Origin::Adoption);
    }
}

fn invoke<A, T, E>(f: Box<dyn FnOnce(A) -> Result<Resolution<T, E>, E> + Send>, arg: A) -> Outcome<T, E>
where
    E: From<Error>,
{
    match guarded(move || f(arg)) {
        Ok(resolution) => Outcome::Fulfill(resolution),
        Err(cause) => Outcome::Reject(cause),
    }
}

/// Run user code, turning a panic into a rejection cause.
pub(crate) fn guarded<R, E, F>(f: F) -> Result<R, E>
where
    E: From<Error>,
    F: FnOnce() -> Result<R, E>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(
                event = "promise.callback_panicked",
                message = %message,
                "Callback panicked, rejecting"
            );
            Err(E::from(Error::Panicked { message }))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + From<Error> + Send + 'static,
{
    /// Settle this promise. A fulfillment with a promise or thenable makes
    /// it follow that value instead; anything else is final.
    pub(crate) fn settle(&self, outcome: Outcome<T, E>, origin: Origin) {
        let mut inner = self.lock();
        if !inner.accepts(origin) {
            drop(inner);
            tracing::debug!(
                event = "promise.settle_ignored",
                promise = %self.id(),
                ?origin,
                "Promise already settled or following another value"
            );
            return;
        }
        match outcome {
            Outcome::Reject(cause) => self.complete(inner, Slot::Rejected(cause)),
            Outcome::Fulfill(Resolution::Value(value)) => {
                self.complete(inner, Slot::Fulfilled(value))
            }
            Outcome::Fulfill(Resolution::Promise(other)) if other == *self => {
                self.complete(inner, Slot::Rejected(E::from(Error::SelfResolution)))
            }
            Outcome::Fulfill(Resolution::Promise(other)) => {
                inner.following = true;
                drop(inner);
                tracing::trace!(
                    event = "promise.follow",
                    promise = %self.id(),
                    inner = %other.id(),
                    "Following another promise"
                );
                other.subscribe(Listener::forwarding(self.clone()));
            }
            Outcome::Fulfill(Resolution::Thenable(thenable)) => {
                inner.following = true;
                drop(inner);
                self.follow_thenable(thenable);
            }
        }
    }

    /// Store `slot` and hand the listeners to the scheduler before the lock
    /// is released, so a `then` racing in from another thread queues behind
    /// them. The observer runs last and cannot stop notification.
    fn complete(&self, mut inner: MutexGuard<'_, Inner<T, E>>, slot: Slot<T, E>) {
        inner.slot = slot;
        let outcome = match inner.outcome() {
            Some(outcome) => outcome,
            None => return,
        };
        let listeners = mem::take(&mut inner.listeners);
        let wakers = mem::take(&mut inner.wakers);
        let state = inner.state();
        tracing::trace!(
            event = "promise.settled",
            promise = %self.id(),
            runtime = %self.runtime().name(),
            %state,
            listeners = listeners.len(),
            "Promise settled"
        );
        if !listeners.is_empty() {
            let id = self.id();
            let batch = outcome.clone();
            self.runtime().defer(Box::new(move || {
                tracing::trace!(
                    event = "promise.notify",
                    promise = %id,
                    listeners = listeners.len(),
                    "Notifying listeners"
                );
                for listener in listeners {
                    listener.run(batch.clone());
                }
            }));
        }
        drop(inner);

        for waker in wakers {
            waker.wake();
        }

        let value: &(dyn Any + Send) = match &outcome {
            Ok(value) => value,
            Err(cause) => cause,
        };
        let settlement = Settlement {
            value,
            promise: self.id(),
            instance: self,
            state,
        };
        let observers = self.runtime().observers();
        if catch_unwind(AssertUnwindSafe(|| observers.notify(&settlement))).is_err() {
            tracing::warn!(
                event = "promise.observer_panicked",
                promise = %self.id(),
                "Settlement observer panicked"
            );
        }
    }

    /// Call the thenable on its own turn so nested thenables unwind through
    /// the scheduler rather than the stack.
    fn follow_thenable(&self, thenable: Box<dyn Thenable<T, E>>) {
        tracing::trace!(
            event = "promise.follow_thenable",
            promise = %self.id(),
            "Following a thenable"
        );
        let target = self.clone();
        self.runtime().defer(Box::new(move || {
            let (resolve, reject) = resolving_pair(&target, Origin::Adoption);
            let fallback = reject.clone();
            if let Err(cause) = guarded(move || thenable.then(resolve, reject)) {
                fallback.reject(cause);
            }
        }));
    }

    /// Register `listener`. On a settled promise it runs right away when it
    /// only forwards, otherwise on the next turn.
    pub(crate) fn subscribe(&self, listener: Listener<T, E>) {
        let mut inner = self.lock();
        let outcome = match inner.outcome() {
            Some(outcome) => outcome,
            None => {
                inner.listeners.push(listener);
                return;
            }
        };
        if listener.handles(&outcome) {
            // deferred under the lock to keep registration order across threads
            self.runtime()
                .defer(Box::new(move || listener.run(outcome)));
        } else {
            drop(inner);
            listener.run(outcome);
        }
    }
}

/// Resolves the promise it was created for.
///
/// A `Resolver` and the [`Rejecter`] created with it share one flag: the
/// first call through either of them (or any of their clones) is the only
/// one that counts.
pub struct Resolver<T, E> {
    target: Promise<T, E>,
    called: Arc<AtomicBool>,
    origin: Origin,
}

/// Rejects the promise it was created for. See [`Resolver`].
pub struct Rejecter<T, E> {
    target: Promise<T, E>,
    called: Arc<AtomicBool>,
    origin: Origin,
}

pub(crate) fn resolving_pair<T, E>(
    target: &Promise<T, E>,
    origin: Origin,
) -> (Resolver<T, E>, Rejecter<T, E>) {
    let called = Arc::new(AtomicBool::new(false));
    (
        Resolver {
            target: target.clone(),
            called: called.clone(),
            origin,
        },
        Rejecter {
            target: target.clone(),
            called,
            origin,
        },
    )
}

impl<T, E> Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + From<Error> + Send + 'static,
{
    pub fn resolve(&self, value: T) {
        self.resolve_with(Resolution::Value(value))
    }

    pub fn resolve_with(&self, resolution: Resolution<T, E>) {
        if self.called.swap(true, Ordering::AcqRel) {
            tracing::debug!(
                event = "promise.resolver_reused",
                promise = %self.target.id(),
                "Resolving pair already used"
            );
            return;
        }
        self.target.settle(Outcome::Fulfill(resolution), self.origin)
    }

    pub fn promise(&self) -> &Promise<T, E> {
        &self.target
    }
}

impl<T, E> Rejecter<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + From<Error> + Send + 'static,
{
    pub fn reject(&self, cause: E) {
        if self.called.swap(true, Ordering::AcqRel) {
            tracing::debug!(
                event = "promise.rejecter_reused",
                promise = %self.target.id(),
                "Resolving pair already used"
            );
            return;
        }
        self.target.settle(Outcome::Reject(cause), self.origin)
    }

    pub fn promise(&self) -> &Promise<T, E> {
        &self.target
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Resolver {
            target: self.target.clone(),
            called: self.called.clone(),
            origin: self.origin,
        }
    }
}

impl<T, E> Clone for Rejecter<T, E> {
    fn clone(&self) -> Self {
        Rejecter {
            target: self.target.clone(),
            called: self.called.clone(),
            origin: self.origin,
        }
    }
}

impl<T, E> std::fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.target.id())
            .field("called", &self.called.load(Ordering::Acquire))
            .finish()
    }
}

impl<T, E> std::fmt::Debug for Rejecter<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rejecter")
            .field("promise", &self.target.id())
            .field("called", &self.called.load(Ordering::Acquire))
            .finish()
    }
}
