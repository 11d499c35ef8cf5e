// src/error.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Error Types ---

/// Coarse classification a response layer maps to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    StateConflict,
    Authorization,
    NotFound,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcademyError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
}

impl AcademyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AcademyError::Validation(_) => ErrorKind::Validation,
            AcademyError::StateConflict(_) => ErrorKind::StateConflict,
            AcademyError::Authorization(_) => ErrorKind::Authorization,
            AcademyError::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    pub(crate) fn class_not_found(id: u64) -> Self {
        AcademyError::NotFound { entity: "class", id }
    }

    pub(crate) fn request_not_found(id: u64) -> Self {
        AcademyError::NotFound {
            entity: "cancellation request",
            id,
        }
    }

    pub(crate) fn teacher_not_found(id: u64) -> Self {
        AcademyError::NotFound {
            entity: "teacher",
            id,
        }
    }
}

pub type Result<T> = std::result::Result<T, AcademyError>;
