//! Error types for event submission and batch consumers.

use thiserror::Error;

/// Errors returned to the ingress layer by [`Coalescer::submit`].
///
/// Duplicates are not errors; they are reported as
/// [`AdmissionResult::Duplicate`](crate::event::AdmissionResult::Duplicate).
///
/// [`Coalescer::submit`]: crate::coalescer::Coalescer::submit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The grouping key was empty after normalization.
    #[error("event key cannot be empty (raw key: {raw:?})")]
    EmptyKey { raw: String },

    /// The event id was empty.
    #[error("event id cannot be empty")]
    EmptyId,
}

/// Result type for submission.
pub type SubmitResult<T> = Result<T, SubmitError>;

/// Errors raised by a [`BatchConsumer`](crate::dispatcher::BatchConsumer).
///
/// The dispatcher logs these and drops the batch; it never retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsumerError {
    /// The consumer refused or failed to process the batch.
    #[error("batch rejected: {message}")]
    Rejected { message: String },

    /// A collaborator the consumer depends on was unavailable.
    #[error("consumer dependency unavailable: {message}")]
    Unavailable { message: String },

    /// The consumer panicked while handling the batch.
    #[error("consumer panicked: {message}")]
    Panicked { message: String },
}

impl ConsumerError {
    /// Creates a `Rejected` error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Creates an `Unavailable` error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Builds a `Panicked` error from a caught panic payload.
    pub fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked { message }
    }
}

/// Result type for consumer callbacks.
pub type ConsumerResult<T> = Result<T, ConsumerError>;
