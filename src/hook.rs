//! Settlement observation.
//!
//! An [`ObserverSlot`] holds at most one [`Observer`]. Each [`Runtime`]
//! captures a slot when it is built and the engine reports every settlement of
//! a promise created on that runtime to whatever the slot holds at that
//! moment. Runtimes use the process-wide slot unless built with their own,
//! which is what [`on_resolve`] and [`clear_on_resolve`] manage.
//!
//! [`Runtime`]: crate::Runtime
use crate::{Promise, PromiseId, State};
use std::any::Any;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// One settlement, as seen by an observer.
#[derive(Debug, Clone, Copy)]
pub struct Settlement<'a> {
    /// The fulfillment value or rejection cause.
    pub value: &'a (dyn Any + Send),
    pub promise: PromiseId,
    /// The settled `Promise<T, E>` itself.
    pub instance: &'a (dyn Any + Send),
    pub state: State,
}

impl<'a> Settlement<'a> {
    pub fn downcast<V: Any>(&self) -> Option<&'a V> {
        self.value.downcast_ref::<V>()
    }

    /// The settled promise, if it is a `Promise<T, E>`.
    pub fn downcast_promise<T: 'static, E: 'static>(&self) -> Option<&'a Promise<T, E>> {
        self.instance.downcast_ref::<Promise<T, E>>()
    }
}

/// Called synchronously, once, on the settling thread.
pub trait Observer: Send + Sync {
    fn on_settle(&self, settlement: &Settlement<'_>);
}

impl<F> Observer for F
where
    F: Fn(&Settlement<'_>) + Send + Sync,
{
    fn on_settle(&self, settlement: &Settlement<'_>) {
        self(settlement)
    }
}

#[derive(Clone, Default)]
pub struct ObserverSlot {
    current: Arc<RwLock<Option<Arc<dyn Observer>>>>,
}

impl ObserverSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `observer`, replacing any previous one.
    pub fn install<O: Observer + 'static>(&self, observer: O) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(observer));
    }

    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_installed(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn notify(&self, settlement: &Settlement<'_>) {
        // clone out so the observer may install or clear without deadlocking
        let observer = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            observer.on_settle(settlement);
        }
    }
}

impl std::fmt::Debug for ObserverSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSlot")
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// The process-wide slot used by runtimes built without their own.
pub fn global() -> ObserverSlot {
    static GLOBAL: OnceLock<ObserverSlot> = OnceLock::new();
    GLOBAL.get_or_init(ObserverSlot::new).clone()
}

/// Install the process-wide settlement observer.
///
/// # Examples
///
/// ```
/// use q_promise::{clear_on_resolve, on_resolve, Promise, Resolution, Runtime, State, TurnQueue};
/// use std::sync::{Arc, Mutex};
///
/// let rt = Runtime::new(TurnQueue::new());
/// let seen = Arc::new(Mutex::new(vec![]));
/// let sink = seen.clone();
/// on_resolve(move |s: &q_promise::Settlement<'_>| {
///     if let Some(v) = s.downcast::<i32>() {
///         sink.lock().unwrap().push((*v, s.promise, s.state));
///     }
/// });
/// let p = Promise::<i32, q_promise::Error>::resolve(&rt, Resolution::Value(7));
/// clear_on_resolve();
///
/// assert!(seen.lock().unwrap().contains(&(7, p.id(), State::Fulfilled)));
/// ```
pub fn on_resolve<O: Observer + 'static>(observer: O) {
    global().install(observer)
}

/// Remove the process-wide settlement observer.
pub fn clear_on_resolve() {
    global().clear()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_slot_notifies_the_current_observer() {
        let slot = ObserverSlot::new();
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        slot.install(move |s: &Settlement<'_>| {
            sink.lock().unwrap().push((*s.downcast::<u8>().unwrap(), s.state));
        });
        assert!(slot.is_installed());

        let id = PromiseId::next();
        slot.notify(&Settlement {
            value: &3u8,
            promise: id,
            instance: &(),
            state: State::Rejected,
        });
        assert_eq!(*seen.lock().unwrap(), vec![(3, State::Rejected)]);
    }

    #[test]
    fn test_cleared_slot_is_silent() {
        let slot = ObserverSlot::new();
        let hits = Arc::new(Mutex::new(0));
        let sink = hits.clone();
        slot.install(move |_: &Settlement<'_>| *sink.lock().unwrap() += 1);
        slot.clear();
        slot.notify(&Settlement {
            value: &(),
            promise: PromiseId::next(),
            instance: &(),
            state: State::Fulfilled,
        });
        assert_eq!(*hits.lock().unwrap(), 0);
        assert!(!slot.is_installed());
    }

    #[test]
    fn test_observer_may_clear_itself() {
        let slot = ObserverSlot::new();
        let inner = slot.clone();
        slot.install(move |_: &Settlement<'_>| inner.clear());
        slot.notify(&Settlement {
            value: &(),
            promise: PromiseId::next(),
            instance: &(),
            state: State::Fulfilled,
        });
        assert!(!slot.is_installed());
    }

    #[test]
    fn test_downcast_to_the_wrong_type_is_none() {
        let s = Settlement {
            value: &"text",
            promise: PromiseId::next(),
            instance: &(),
            state: State::Fulfilled,
        };
        assert!(s.downcast::<i32>().is_none());
        assert_eq!(s.downcast::<&str>(), Some(&"text"));
    }

    #[test]
    fn test_observer_reads_the_settled_promise() {
        use crate::{Promise, Resolution, Runtime, TurnQueue};

        let slot = ObserverSlot::new();
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        slot.install(move |s: &Settlement<'_>| {
            let promise = s.downcast_promise::<i32, crate::Error>().unwrap();
            sink.lock().unwrap().push((promise.id(), promise.state(), promise.value()));
            assert!(s.downcast_promise::<u8, crate::Error>().is_none());
        });
        let rt = Runtime::builder()
            .scheduler(TurnQueue::new())
            .observers(slot)
            .build();
        let p = Promise::<i32, crate::Error>::resolve(&rt, Resolution::Value(5));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(p.id(), State::Fulfilled, Some(Ok(5)))]
        );
    }
}
