//! Error types and result definitions for the Garnet compiler tier.
//!
//! The tier distinguishes exactly three failure classes:
//! - Internal consistency violations (optimizer/generator bugs)
//! - Verification-shaped errors (static/instance accessor mismatches)
//! - Unsupported-feature signals (bytecode this tier declines to compile)
//!
//! No error is recovered internally: every error aborts the compilation of
//! exactly one method and propagates to the caller, which picks a fallback
//! strategy. Partial output for a failed method is never published.

use std::fmt;
use thiserror::Error;

/// The unified result type used throughout the compiler tier.
pub type JitResult<T> = Result<T, JitError>;

/// Compilation failure for a single method.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JitError {
    /// Internal consistency violation: an invariant the pipeline itself is
    /// responsible for was broken (unbound location at emission time,
    /// unfolded constants, a lowering hole). Never user-triggerable.
    #[error("internal compiler error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },

    /// Verification-shaped failure: the bytecode references a member in a
    /// way the resolved metadata contradicts (static accessor on an
    /// instance field or vice versa).
    #[error("incompatible class change: {message}")]
    IncompatibleClassChange {
        /// What was referenced and how it resolved.
        message: String,
    },

    /// The method uses a bytecode category this tier does not lower. This
    /// is the expected outcome for any method the compatibility pre-check
    /// rejects; reaching it later means the pre-check and the generator
    /// have drifted apart.
    #[error("not supported: {what}")]
    NotSupported {
        /// The unsupported construct.
        what: String,
    },
}

impl JitError {
    /// Create an internal consistency error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an incompatible class change error.
    #[must_use]
    pub fn incompatible_class_change(message: impl Into<String>) -> Self {
        Self::IncompatibleClassChange {
            message: message.into(),
        }
    }

    /// Create an unsupported-feature error.
    #[must_use]
    pub fn not_supported(what: impl Into<String>) -> Self {
        Self::NotSupported { what: what.into() }
    }

    /// Get the error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Internal { .. } => ErrorKind::Internal,
            Self::IncompatibleClassChange { .. } => ErrorKind::IncompatibleClassChange,
            Self::NotSupported { .. } => ErrorKind::NotSupported,
        }
    }

    /// Whether this failure is an expected decline (pre-checkable) rather
    /// than a compiler defect.
    #[must_use]
    pub fn is_decline(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }
}

/// Discriminant-only view of [`JitError`], for dispatching on failure
/// class without touching the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Internal consistency violation.
    Internal,
    /// Static/instance member mismatch.
    IncompatibleClassChange,
    /// Unimplemented bytecode category.
    NotSupported,
}

impl ErrorKind {
    /// Stable name for diagnostics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "Internal",
            Self::IncompatibleClassChange => "IncompatibleClassChange",
            Self::NotSupported => "NotSupported",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================
