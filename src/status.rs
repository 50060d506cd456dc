//! Facilities to represent the progress of asynchronous results
//!
//! The model is the following: a result starts its life in a pending state,
//! on the producer side. It then either gets resolved by the producer, or
//! abandoned because the consumer stopped caring after some timeout. A
//! resolved result can finally be consumed by a blocking wait, after which
//! nothing remains to be observed.

/// Progress of the asynchronous result held by a shared state cell
///
/// Here are the possible state transitions:
///
/// - Pending -> TimedOut / Done
/// - TimedOut -> Done (only for cells created by chaining, whose upstream
///   step may still complete after a timeout request went nowhere)
/// - Done -> Consumed (only through a blocking wait)
///
/// Note that once the result is Done, only a blocking wait can still change
/// its progress, and that Consumed is a dead end.
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Progress {
    /// The result has not been set yet
    Pending,

    /// The consumer gave up waiting for the result
    TimedOut,

    /// The result (value or error) is available
    Done,

    /// The result was handed over to a blocking wait
    Consumed,
}
//
impl Progress {
    /// Check if a result may still arrive
    pub fn is_pending(self) -> bool {
        self == Progress::Pending
    }

    /// Check if the progress is final (i.e. won't change anymore)
    ///
    /// Done is not final because a blocking wait may consume it. TimedOut is
    /// not final either, since only root cells stay timed out forever.
    ///
    pub fn is_final(self) -> bool {
        self == Progress::Consumed
    }

    /// Check if a value or error was produced (consumed or not)
    pub fn is_resolved(self) -> bool {
        matches!(self, Progress::Done | Progress::Consumed)
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;

    /// Check the classification of every progress state
    #[test]
    fn classification() {
        // Pending results may still arrive
        assert!(Progress::Pending.is_pending());
        assert!(!Progress::Pending.is_resolved());
        assert!(!Progress::Pending.is_final());

        // Timed out results are not resolved
        assert!(!Progress::TimedOut.is_pending());
        assert!(!Progress::TimedOut.is_resolved());
        assert!(!Progress::TimedOut.is_final());

        // Done results are resolved, but may still be consumed
        assert!(Progress::Done.is_resolved());
        assert!(!Progress::Done.is_final());

        // Consumed results are a dead end
        assert!(Progress::Consumed.is_resolved());
        assert!(Progress::Consumed.is_final());
    }
}
