//! Filter context error types

use thiserror::Error;

use crate::domain::{FilterKey, TypeDescriptor};

/// Errors raised by the filter context and its handles
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("Filter key must not be empty")]
    KeyEmpty,

    #[error("A filter value is already attached for key '{key}'")]
    DuplicateAttachment { key: FilterKey },

    #[error("No filter value is attached for key '{key}'; attach the value before its controllers")]
    MissingValue { key: FilterKey },

    #[error("Controller for key '{key}' expects {controller} but the attached value is {value}")]
    TypeMismatch {
        key: FilterKey,
        value: TypeDescriptor,
        controller: TypeDescriptor,
    },

    #[error(
        "Controller for key '{key}' expects {controller} but the attached value is {value} (types differ only by nullability)"
    )]
    NullabilityMismatch {
        key: FilterKey,
        value: TypeDescriptor,
        controller: TypeDescriptor,
    },

    #[error("Cannot {operation} while the context is {state}")]
    InvalidLifecycleState { operation: &'static str, state: String },

    #[error("Filter context faulted during initialisation: {reason}")]
    Faulted { reason: String },

    #[error("Handle for key '{key}' has been detached")]
    HandleDetached { key: FilterKey },
}

impl FilterError {
    /// Build an `InvalidLifecycleState` error for an operation
    pub(crate) fn lifecycle(operation: &'static str, state: impl std::fmt::Display) -> Self {
        Self::InvalidLifecycleState {
            operation,
            state: state.to_string(),
        }
    }

    /// True for both the plain and the nullability-only type mismatch
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. } | Self::NullabilityMismatch { .. })
    }

    /// True if this error reports an ordering or lifecycle mistake
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::InvalidLifecycleState { .. } | Self::MissingValue { .. })
    }
}
