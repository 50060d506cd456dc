//! Result container for asynchronous operations
//!
//! Until an asynchronous operation is over, its result simply does not exist.
//! After that, it is either a value or an error. `Try` captures these three
//! situations in a single type, which is what travels between producers,
//! continuations and consumers.
//!
//! For operations without a payload (`Try<()>`), an empty result is
//! meaningless once the operation is over: "done without error" is itself a
//! value, namely `Try::Value(())`. The engine never hands out an empty
//! `Try<()>` for a resolved operation.

use crate::error::{AsyncError, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};


/// Outcome of an asynchronous operation, which may not be known yet
#[derive(Clone, Debug)]
pub enum Try<T> {
    /// No result has been set yet
    Empty,

    /// The operation succeeded and produced this value
    Value(T),

    /// The operation failed
    Error(AsyncError),
}
//
impl<T> Default for Try<T> {
    fn default() -> Self {
        Try::Empty
    }
}
//
impl<T> Try<T> {
    /// Run a computation, capturing both its errors and its panics
    ///
    /// This is what allows continuations to fail in any way they like
    /// without ever unwinding through the thread which happens to run them.
    ///
    pub fn capture<F>(f: F) -> Self
        where F: FnOnce() -> Result<T>
    {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result.into(),
            Err(payload) => Try::Error(AsyncError::Panicked(
                panic_message(payload.as_ref())
            )),
        }
    }

    /// Check if a value is available
    pub fn has_value(&self) -> bool {
        matches!(self, Try::Value(_))
    }

    /// Check if an error is available
    pub fn has_error(&self) -> bool {
        matches!(self, Try::Error(_))
    }

    /// Check if nothing was set yet
    pub fn is_empty(&self) -> bool {
        matches!(self, Try::Empty)
    }

    /// Make sure that a value is available, or report why it isn't
    pub fn check(&self) -> Result<()> {
        match self {
            Try::Value(_) => Ok(()),
            Try::Error(e) => Err(e.clone()),
            Try::Empty => Err(AsyncError::EmptyResult),
        }
    }

    /// Extract the value, or the error which prevented it from existing
    pub fn get(self) -> Result<T> {
        match self {
            Try::Value(v) => Ok(v),
            Try::Error(e) => Err(e),
            Try::Empty => Err(AsyncError::EmptyResult),
        }
    }

    /// Borrow the value, or report why it isn't there
    pub fn value(&self) -> Result<&T> {
        match self {
            Try::Value(v) => Ok(v),
            Try::Error(e) => Err(e.clone()),
            Try::Empty => Err(AsyncError::EmptyResult),
        }
    }

    /// Borrow the error, if any
    pub fn error(&self) -> Option<&AsyncError> {
        match self {
            Try::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Transform the value, leaving errors and emptiness alone
    pub fn map<U, F>(self, f: F) -> Try<U>
        where F: FnOnce(T) -> U
    {
        match self {
            Try::Value(v) => Try::Value(f(v)),
            Try::Error(e) => Try::Error(e),
            Try::Empty => Try::Empty,
        }
    }
}
//
impl<T> From<Result<T>> for Try<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(v) => Try::Value(v),
            Err(e) => Try::Error(e),
        }
    }
}


/// Turn a panic payload into something printable
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_owned()
    }
}
