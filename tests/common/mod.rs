#![allow(dead_code)]

use q_promise::{
    Error, Handler, ObserverSlot, Promise, PromiseId, Runtime, Settlement, State, TurnQueue,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// A loosely typed payload standing in for arbitrary user values.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Date(SystemTime),
    Pattern(String),
    Map(Vec<(String, i64)>),
    List(Vec<i64>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cause {
    Code(i64),
    Message(&'static str),
    Engine(Error),
    /// A rejection carrying another promise, which must stay as given.
    Promise(Promise<Value, Cause>),
}

impl From<Error> for Cause {
    fn from(err: Error) -> Self {
        Cause::Engine(err)
    }
}

pub type P = Promise<Value, Cause>;

pub fn dataset() -> Vec<Value> {
    vec![
        Value::Int(0),
        Value::Bool(false),
        Value::Null,
        Value::Undefined,
        Value::Int(123),
        Value::Str("foo".into()),
        Value::Date(SystemTime::UNIX_EPOCH + Duration::from_secs(978_307_200)),
        Value::Pattern("/foobar/i".into()),
        Value::Map(vec![("a".into(), 1)]),
        Value::List(vec![1, 3, 5]),
        Value::Map(vec![("test".into(), 1)]),
    ]
}

/// A runtime on a manually driven queue with a private observer slot.
pub fn runtime() -> (TurnQueue, Runtime, ObserverSlot) {
    let queue = TurnQueue::new();
    let slot = ObserverSlot::new();
    let rt = Runtime::builder()
        .name("test")
        .scheduler(queue.clone())
        .observers(slot.clone())
        .build();
    (queue, rt, slot)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Fulfilled(Value, PromiseId),
    Rejected(Cause, PromiseId),
}

/// Install an observer on `slot` that records every settlement.
pub fn record(slot: &ObserverSlot) -> Arc<Mutex<Vec<Seen>>> {
    let seen = Arc::new(Mutex::new(vec![]));
    let sink = seen.clone();
    slot.install(move |s: &Settlement<'_>| {
        let entry = match s.state {
            State::Fulfilled => Seen::Fulfilled(s.downcast::<Value>().unwrap().clone(), s.promise),
            State::Rejected => Seen::Rejected(s.downcast::<Cause>().unwrap().clone(), s.promise),
            State::Pending => unreachable!("pending is never reported"),
        };
        sink.lock().unwrap().push(entry);
    });
    seen
}

/// A fulfillment handler that logs `tag` and fulfills with it.
pub fn push_value(calls: &Arc<Mutex<Vec<i64>>>, tag: i64) -> Handler<Value, Value, Cause> {
    let calls = calls.clone();
    Handler::value(move |_| {
        calls.lock().unwrap().push(tag);
        Ok(Value::Int(tag))
    })
}

/// A rejection handler that logs `tag` and recovers with it.
pub fn push_cause(calls: &Arc<Mutex<Vec<i64>>>, tag: i64) -> Handler<Cause, Value, Cause> {
    let calls = calls.clone();
    Handler::value(move |_| {
        calls.lock().unwrap().push(tag);
        Ok(Value::Int(tag))
    })
}
