use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    ChargedTo, LedgerEvent, LedgerOutcome, LessonId, PackageId, StudentAccount, StudentId,
    StudentStatus,
};

pub type EntryId = Uuid;

/// Append-only record of one event applied to a student account.
/// Corrections are new entries (e.g. a deleted lesson), never edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    /// Monotonically increasing sequence number, assigned by the repository
    pub sequence: i64,
    pub student_id: StudentId,
    pub event: LedgerEvent,
    pub lesson_id: Option<LessonId>,
    pub package_id: Option<PackageId>,
    pub before: StudentAccount,
    pub after: StudentAccount,
    pub status_after: StudentStatus,
    pub charged_to: Option<ChargedTo>,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        student_id: StudentId,
        event: LedgerEvent,
        before: StudentAccount,
        outcome: &LedgerOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            student_id,
            event,
            lesson_id: None,
            package_id: None,
            before,
            after: outcome.account,
            status_after: outcome.status,
            charged_to: outcome.charged_to,
            note: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_lesson(mut self, lesson_id: LessonId) -> Self {
        self.lesson_id = Some(lesson_id);
        self
    }

    pub fn with_package(mut self, package_id: PackageId) -> Self {
        self.package_id = Some(package_id);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Net change to the wallet balance.
    pub fn wallet_delta(&self) -> i64 {
        self.after.wallet_balance - self.before.wallet_balance
    }

    /// Net change to the debt counter.
    pub fn debt_delta(&self) -> i64 {
        self.after.debt_lessons - self.before.debt_lessons
    }

    pub fn is_neutral(&self) -> bool {
        self.before == self.after
    }
}
