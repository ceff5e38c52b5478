use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Settlement state of a promise.
///
/// `Pending` is the only non-terminal state. Once a promise leaves it the
/// state never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    #[default]
    Pending,
    Fulfilled,
    Rejected,
}

impl State {
    pub fn is_settled(self) -> bool {
        !matches!(self, State::Pending)
    }

    /// The short tag of the state: empty while pending, `y` or `n` once settled.
    pub fn tag(self) -> &'static str {
        match self {
            State::Pending => "",
            State::Fulfilled => "y",
            State::Rejected => "n",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Pending => "pending",
            State::Fulfilled => "fulfilled",
            State::Rejected => "rejected",
        })
    }
}

/// Process-unique identity of a promise. Handles cloned from the same
/// promise share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(u64);

impl PromiseId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        PromiseId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "promise#{}", self.0)
    }
}
