//! The cleanup capability and the outcome of invoking it.

use log::{debug, error};
use std::any::Any;
use std::error::Error as StdError;
use std::panic::{self, AssertUnwindSafe};
use std::slice;
use thiserror::Error;

///////////////////////////////////////////////////////////////////////////////
// Capability
///////////////////////////////////////////////////////////////////////////////

/// The error that a failing [`IDisposable::dispose`] returns.
pub type DisposeError = Box<dyn StdError + Send + Sync + 'static>;

/// An object that holds resources which must be released before it is
/// discarded.
///
/// Services opt into this capability through
/// [`IService::disposable`](crate::IService::disposable).
pub trait IDisposable: Send + Sync {
    /// Releases the resources of the object.
    fn dispose(&self) -> Result<(), DisposeError>;
}

///////////////////////////////////////////////////////////////////////////////
// Outcomes
///////////////////////////////////////////////////////////////////////////////

/// A cleanup operation that did not complete.
#[derive(Debug, Error)]
pub enum CleanupFailure {
    /// `dispose` returned an error.
    #[error("failed to dispose `{name}`: {source}")]
    Failed {
        name: String,
        #[source]
        source: DisposeError,
    },

    /// `dispose`, or the shutdown of a post-processor, panicked.
    #[error("`{name}` panicked during cleanup: {message}")]
    Panicked { name: String, message: String },
}

impl CleanupFailure {
    /// The name of the instance that failed to clean up.
    pub fn name(&self) -> &str {
        match self {
            Self::Failed { name, .. } => name,
            Self::Panicked { name, .. } => name,
        }
    }
}

/// What happened to a single instance during shutdown.
#[derive(Debug)]
pub enum CleanupOutcome {
    /// The instance was disposed successfully.
    Disposed,
    /// The instance does not expose a cleanup capability.
    NotDisposable,
    /// The owner already dropped the instance before shutdown.
    Dropped,
    /// The cleanup operation failed.
    Failed(CleanupFailure),
}

impl CleanupOutcome {
    /// Returns `true` if this is [`CleanupOutcome::Disposed`].
    pub const fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed)
    }

    /// Returns `true` if this is [`CleanupOutcome::Failed`].
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(..))
    }
}

///////////////////////////////////////////////////////////////////////////////
// Report
///////////////////////////////////////////////////////////////////////////////

/// The per-instance outcomes of a shutdown, in the order they were processed.
///
/// A report is informational: failures have already been logged when the
/// report is handed out, and nothing forces the caller to inspect it.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    entries: Vec<(String, CleanupOutcome)>,
}

impl ShutdownReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Creates an empty report with room for `capacity` outcomes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, name: String, outcome: CleanupOutcome) {
        self.entries.push((name, outcome));
    }

    /// Moves all outcomes of `other` to the end of this report.
    pub fn append(&mut self, mut other: ShutdownReport) {
        self.entries.append(&mut other.entries);
    }

    /// The number of processed instances.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no instance was processed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the `(name, outcome)` pairs.
    pub fn iter(&self) -> slice::Iter<'_, (String, CleanupOutcome)> {
        self.entries.iter()
    }

    /// The names of the successfully disposed instances, in order.
    pub fn disposed(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .iter()
            .filter(|(_, outcome)| outcome.is_disposed())
            .map(|(name, _)| name.as_str())
    }

    /// The failures that occurred, in order.
    pub fn failures(&self) -> impl Iterator<Item = &CleanupFailure> + '_ {
        self.entries.iter().filter_map(|(_, outcome)| match outcome {
            CleanupOutcome::Failed(failure) => Some(failure),
            _ => None,
        })
    }

    /// Returns `true` if no cleanup operation failed.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

impl IntoIterator for ShutdownReport {
    type Item = (String, CleanupOutcome);
    type IntoIter = std::vec::IntoIter<(String, CleanupOutcome)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a ShutdownReport {
    type Item = &'a (String, CleanupOutcome);
    type IntoIter = slice::Iter<'a, (String, CleanupOutcome)>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

///////////////////////////////////////////////////////////////////////////////
// Isolated Invocation
///////////////////////////////////////////////////////////////////////////////

/// Disposes `target`, turning an error or a panic into a logged failure.
pub(crate) fn dispose_isolated(name: &str, target: &dyn IDisposable) -> CleanupOutcome {
    let failure = match panic::catch_unwind(AssertUnwindSafe(|| target.dispose())) {
        Ok(Ok(())) => {
            debug!("Disposed {}", name);
            return CleanupOutcome::Disposed;
        }
        Ok(Err(source)) => CleanupFailure::Failed {
            name: name.to_owned(),
            source,
        },
        Err(payload) => CleanupFailure::Panicked {
            name: name.to_owned(),
            message: panic_message(payload.as_ref()),
        },
    };

    error!("{}", failure);
    CleanupOutcome::Failed(failure)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic payload")
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////
