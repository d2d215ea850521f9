//! Core error types used across the system

use thiserror::Error;

/// Core error type for the kernel
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Column `{column}` holds {found}, expected {expected}")]
    Mapping {
        column: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{entity} has no column `{column}`")]
    UnknownColumn {
        entity: &'static str,
        column: &'static str,
    },
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn mapping(column: &'static str, expected: &'static str, found: &'static str) -> Self {
        CoreError::Mapping {
            column,
            expected,
            found,
        }
    }

    pub fn unknown_column(entity: &'static str, column: &'static str) -> Self {
        CoreError::UnknownColumn { entity, column }
    }
}
