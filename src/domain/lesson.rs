use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ChargedTo, LedgerEvent, StudentId};

pub type LessonId = Uuid;

/// Default lesson length when none is given.
pub const DEFAULT_LESSON_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonStatus {
    Scheduled,
    Completed,
    Absent,
    Cancelled,
}

impl LessonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonStatus::Scheduled => "scheduled",
            LessonStatus::Completed => "completed",
            LessonStatus::Absent => "absent",
            LessonStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "scheduled" => Some(LessonStatus::Scheduled),
            "completed" => Some(LessonStatus::Completed),
            "absent" => Some(LessonStatus::Absent),
            "cancelled" | "canceled" => Some(LessonStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for LessonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for LessonStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LessonStatus::from_str(s).ok_or_else(|| format!("unknown lesson status '{}'", s))
    }
}

/// A single calendar slot booked for a student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub student_id: StudentId,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: LessonStatus,
    /// Side of the account the completion was charged to
    pub charged_to: Option<ChargedTo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lesson {
    pub fn new(student_id: StudentId, starts_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            student_id,
            starts_at,
            duration_minutes: DEFAULT_LESSON_MINUTES,
            status: LessonStatus::Scheduled,
            charged_to: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_duration(mut self, minutes: i64) -> Self {
        self.duration_minutes = minutes;
        self
    }

    /// Ledger event for marking this lesson with `target`.
    /// Only scheduled lessons can be marked, and only to a final state.
    pub fn mark_event(&self, target: LessonStatus) -> Option<LedgerEvent> {
        if self.status != LessonStatus::Scheduled {
            return None;
        }
        match target {
            LessonStatus::Completed => Some(LedgerEvent::LessonCompleted),
            LessonStatus::Absent => Some(LedgerEvent::LessonAbsent),
            LessonStatus::Cancelled => Some(LedgerEvent::LessonCancelled),
            LessonStatus::Scheduled => None,
        }
    }

    /// Ledger event for deleting this lesson in its current state.
    pub fn delete_event(&self) -> LedgerEvent {
        match self.status {
            LessonStatus::Scheduled => LedgerEvent::ScheduledLessonDeleted,
            LessonStatus::Completed => LedgerEvent::CompletedLessonDeleted(self.charged_to),
            LessonStatus::Absent | LessonStatus::Cancelled => {
                LedgerEvent::AbsentOrCancelledDeleted
            }
        }
    }
}
