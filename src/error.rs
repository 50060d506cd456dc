//! Errors reported by asynchronous operations
//!
//! Two very different kinds of failure travel through this crate. Some of
//! them are expected outcomes of asynchronous work: a producer reports that
//! the operation failed, a blocking wait runs out of time, a result gets
//! abandoned after a timeout. Those are ordinary values, stored inside a
//! `Try` and handed to whoever observes the result.
//!
//! Others are programming mistakes, such as asking a promise for its future
//! twice. Those are defects and the corresponding APIs panic, but the same
//! error variants are used to describe them so that the `try_` flavours of
//! those APIs can report them as values.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;


/// Everything that can go wrong with an asynchronous result
#[derive(Clone, Debug, thiserror::Error)]
pub enum AsyncError {
    /// A result was read before anyone had set it
    #[error("result accessed before being set")]
    EmptyResult,

    /// A blocking wait gave up before the result became available
    #[error("wait timed out after {0:?}")]
    WaitTimeout(Duration),

    /// The future of a promise was requested more than once
    #[error("future already retrieved from this promise")]
    AlreadyRetrieved,

    /// A shared promise was resolved more than once
    #[error("shared promise resolved twice")]
    DoubleSet,

    /// Every input of a conditional combinator completed, none matched
    #[error("no input satisfied the predicate")]
    NoSatisfyingResult,

    /// Every input of a conditional combinator completed, too few matched
    #[error("only {found} of {needed} inputs satisfied the predicate")]
    InsufficientSatisfyingResults {
        /// Number of matching results which were requested
        needed: usize,

        /// Number of matching results which were actually observed
        found: usize,
    },

    /// The result was abandoned after a timeout
    #[error("operation abandoned after timeout")]
    TimedOut,

    /// The producer went away without resolving its promise
    #[error("promise dropped without being resolved")]
    BrokenPromise,

    /// The scheduler refused work because it has been shut down
    #[error("scheduler has been shut down")]
    SchedulerShutdown,

    /// A continuation or task panicked while computing the result
    #[error("continuation panicked: {0}")]
    Panicked(String),

    /// An application-specific failure
    #[error(transparent)]
    Failed(Arc<dyn Error + Send + Sync + 'static>),
}
//
impl AsyncError {
    /// Wrap an application error
    pub fn failed<E>(error: E) -> Self
        where E: Error + Send + Sync + 'static
    {
        AsyncError::Failed(Arc::new(error))
    }

    /// Build an application error out of a plain message
    pub fn msg(message: impl Into<String>) -> Self {
        Self::failed(Message(message.into()))
    }

    /// Check if this error reports an abandoned (timed out) result
    pub fn is_timeout(&self) -> bool {
        matches!(self, AsyncError::TimedOut | AsyncError::WaitTimeout(_))
    }

    /// Access the application error, if this is one
    pub fn application_error(&self)
        -> Option<&(dyn Error + Send + Sync + 'static)>
    {
        match self {
            AsyncError::Failed(inner) => Some(&**inner),
            _ => None,
        }
    }
}


/// Plain-text application error, see `AsyncError::msg`
#[derive(Debug)]
struct Message(String);
//
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
//
impl Error for Message {}


/// Result type used throughout the crate's public interface
pub type Result<T> = std::result::Result<T, AsyncError>;
