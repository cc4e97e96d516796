//! Module containing the error type of this crate.

use thiserror::Error;

/// Catch-all error for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or out-of-range configuration, rejected at engine construction.
    #[error("invalid configuration: {reason}")]
    ConfigInvalid {
        /// Description of the offending key or value.
        reason: String,
    },
    /// Intensity sequences or ground-motion arrays of inconsistent shape were
    /// combined.
    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch {
        /// The shape the operation required.
        expected: String,
        /// The shape the operation was given.
        found: String,
    },
    /// A builder was driven incorrectly: `build` called with missing or
    /// duplicate inputs, or a frozen container was mutated.
    #[error("builder misuse: {reason}")]
    BuilderMisuse {
        /// Description of the misuse.
        reason: String,
    },
    /// A computed mean, sigma, curve value or deaggregation accumulator is
    /// NaN or infinite.
    #[error("non-finite value in {context}")]
    NumericFault {
        /// Where the non-finite value was detected, including the source-set
        /// and source names where known.
        context: String,
    },
    /// The calculation was cancelled between stages.
    #[error("calculation cancelled")]
    Cancelled,
    /// Error that does not originate from this crate.
    #[error("{context}: {cause}")]
    External {
        /// The stage that surfaced the collaborator failure.
        context: String,
        /// The underlying failure.
        cause: anyhow::Error,
    },
}

impl Error {
    /// Shorthand for a [`Error::ConfigInvalid`] with the given reason.
    #[must_use]
    pub fn config(reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`Error::BuilderMisuse`] with the given reason.
    #[must_use]
    pub fn misuse(reason: impl Into<String>) -> Self {
        Self::BuilderMisuse {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`Error::NumericFault`] detected in `context`.
    #[must_use]
    pub fn numeric(context: impl Into<String>) -> Self {
        Self::NumericFault {
            context: context.into(),
        }
    }
}

/// Result alias with the error type of this crate.
pub type Result<T> = std::result::Result<T, Error>;
