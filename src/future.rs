use crate::{Error, Promise};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

/// Awaiting a promise yields its outcome once it settles. Any number of
/// handles to the same promise may be awaited at once.
///
/// # Examples
///
/// ```
/// use q_promise::{Promise, Resolution, Runtime, TurnQueue};
/// use futures::executor::block_on;
///
/// let rt = Runtime::new(TurnQueue::new());
/// let p = Promise::<String, q_promise::Error>::resolve(&rt, Resolution::Value("🍓".into()));
/// assert_eq!(block_on(p), Ok("🍓".to_string()));
/// ```
impl<T, E> Future for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + From<Error> + Send + 'static,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.lock();
        match inner.outcome() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                // keep every distinct waker, each awaiting handle needs its own wakeup
                if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    inner.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
