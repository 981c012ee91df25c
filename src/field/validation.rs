// Validation outcomes and the stale-result guard
//
// Every validation run is identified by a ticket. A field owns one counter
// and only the most recently issued ticket may commit a result; issuing a
// new ticket (trigger) or cancelling (change, reset) makes every older
// ticket stale.

use super::status::{FieldFocus, FieldValidation};
use crate::error::ValidationError;
use futures::future::BoxFuture;
use parking_lot::{Mutex, MutexGuard};
use std::future::Future;

/// Outcome of a validator: available now, or still being computed.
pub enum Validated {
    /// Result computed synchronously
    Ready(Result<(), ValidationError>),
    /// Result of an async validation that is still running
    Pending(BoxFuture<'static, Result<(), ValidationError>>),
}

impl Validated {
    /// Successful, synchronous outcome
    pub fn ok() -> Self {
        Validated::Ready(Ok(()))
    }

    /// Wrap a future producing the result
    pub fn pending<F, E>(future: F) -> Self
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<ValidationError>,
    {
        Validated::Pending(Box::pin(async move { future.await.map_err(Into::into) }))
    }

    /// True for [`Validated::Pending`]
    pub fn is_pending(&self) -> bool {
        matches!(self, Validated::Pending(_))
    }

    /// Wait for the result, whichever way it is delivered
    pub async fn settle(self) -> Result<(), ValidationError> {
        match self {
            Validated::Ready(result) => result,
            Validated::Pending(future) => future.await,
        }
    }
}

impl<E: Into<ValidationError>> From<Result<(), E>> for Validated {
    fn from(result: Result<(), E>) -> Self {
        Validated::Ready(result.map_err(Into::into))
    }
}

impl std::fmt::Debug for Validated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Validated::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Validated::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Snapshot handed to a field validator.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldContext<S, V = S> {
    /// Raw state being validated
    pub state: S,
    /// Value projected from `state`
    pub value: V,
    /// Focus record at trigger time
    pub focus: FieldFocus,
    /// Validation record before this run
    pub validation: FieldValidation,
}

/// Identity of one validation run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValidationTicket(u64);

impl ValidationTicket {
    /// Position of this run in the field's sequence of validations
    pub fn generation(self) -> u64 {
        self.0
    }
}

/// Issues tickets and remembers which one is current.
#[derive(Debug, Default)]
pub(crate) struct TicketCounter {
    current: Mutex<u64>,
}

impl TicketCounter {
    /// Supersede every outstanding ticket and return a fresh one
    pub fn issue(&self) -> ValidationTicket {
        let mut current = self.current.lock();
        *current += 1;
        ValidationTicket(*current)
    }

    /// Supersede every outstanding ticket without starting a new run
    pub fn cancel(&self) {
        *self.current.lock() += 1;
    }

    /// Lock the counter if `ticket` is still current
    ///
    /// The guard keeps cancellations out until the result is written.
    pub fn claim(&self, ticket: ValidationTicket) -> Option<MutexGuard<'_, u64>> {
        let current = self.current.lock();
        (*current == ticket.0).then_some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_latest_ticket_can_be_claimed() {
        let counter = TicketCounter::default();
        let first = counter.issue();
        let second = counter.issue();
        assert!(counter.claim(first).is_none());
        assert!(counter.claim(second).is_some());

        counter.cancel();
        assert!(counter.claim(second).is_none());
    }

    #[test]
    fn ready_outcome_from_result() {
        let outcome: Validated = Err::<(), _>("too short").into();
        assert!(!outcome.is_pending());
        let result = futures::executor::block_on(outcome.settle());
        assert_eq!(result, Err(ValidationError::from("too short")));
    }

    #[test]
    fn pending_outcome_maps_error() {
        let outcome = Validated::pending(async { Err::<(), _>(String::from("taken")) });
        assert!(outcome.is_pending());
        let result = futures::executor::block_on(outcome.settle());
        assert_eq!(result.unwrap_err().message(), "taken");
    }
}
