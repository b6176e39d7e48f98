use thiserror::Error;

use crate::domain::{LedgerError, LessonStatus};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Student not found: {0}")]
    StudentNotFound(String),

    #[error("Student already exists: {0}")]
    StudentAlreadyExists(String),

    #[error("Invalid student name: {0:?}")]
    InvalidName(String),

    #[error("Lesson not found: {0}")]
    LessonNotFound(String),

    #[error("Cannot mark a {from} lesson as {to}")]
    InvalidLessonTransition {
        from: LessonStatus,
        to: LessonStatus,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid lesson duration: {0} minutes")]
    InvalidDuration(i64),

    #[error("Account of '{student}' was updated concurrently ({attempts} attempts)")]
    ConcurrentUpdate { student: String, attempts: u32 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    /// True for errors a caller may resolve by re-reading and trying again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrentUpdate { .. })
    }
}
