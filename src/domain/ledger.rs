use serde::{Deserialize, Serialize};

use super::{StudentAccount, StudentStatus};

/// Which side of the account absorbed a consumed lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargedTo {
    /// A prepaid credit was spent
    Wallet,
    /// No credit was available, the lesson went on the debt counter
    Debt,
}

impl ChargedTo {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargedTo::Wallet => "wallet",
            ChargedTo::Debt => "debt",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "wallet" => Some(ChargedTo::Wallet),
            "debt" => Some(ChargedTo::Debt),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChargedTo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A billing-relevant event presented to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "detail", rename_all = "snake_case")]
pub enum LedgerEvent {
    LessonCompleted,
    LessonAbsent,
    LessonCancelled,
    /// A lesson still in the scheduled state was removed
    ScheduledLessonDeleted,
    /// A completed lesson was removed; carries the side its completion charged
    /// when known
    CompletedLessonDeleted(Option<ChargedTo>),
    AbsentOrCancelledDeleted,
    LessonRescheduled,
    PackageAdded(i64),
    FreeLessonsGranted(i64),
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::LessonCompleted => "lesson_completed",
            LedgerEvent::LessonAbsent => "lesson_absent",
            LedgerEvent::LessonCancelled => "lesson_cancelled",
            LedgerEvent::ScheduledLessonDeleted => "scheduled_lesson_deleted",
            LedgerEvent::CompletedLessonDeleted(_) => "completed_lesson_deleted",
            LedgerEvent::AbsentOrCancelledDeleted => "absent_or_cancelled_deleted",
            LedgerEvent::LessonRescheduled => "lesson_rescheduled",
            LedgerEvent::PackageAdded(_) => "package_added",
            LedgerEvent::FreeLessonsGranted(_) => "free_lessons_granted",
        }
    }

    /// Lesson count carried by grant events.
    pub fn lessons(&self) -> Option<i64> {
        match self {
            LedgerEvent::PackageAdded(n) | LedgerEvent::FreeLessonsGranted(n) => Some(*n),
            _ => None,
        }
    }

    /// Side reversed by a completed-lesson deletion.
    pub fn refunded_side(&self) -> Option<ChargedTo> {
        match self {
            LedgerEvent::CompletedLessonDeleted(side) => *side,
            _ => None,
        }
    }

    /// Rebuild an event from its persisted parts.
    pub fn from_parts(
        name: &str,
        lessons: Option<i64>,
        refunded: Option<ChargedTo>,
    ) -> Option<Self> {
        let event = match name {
            "lesson_completed" => LedgerEvent::LessonCompleted,
            "lesson_absent" => LedgerEvent::LessonAbsent,
            "lesson_cancelled" => LedgerEvent::LessonCancelled,
            "scheduled_lesson_deleted" => LedgerEvent::ScheduledLessonDeleted,
            "completed_lesson_deleted" => LedgerEvent::CompletedLessonDeleted(refunded),
            "absent_or_cancelled_deleted" => LedgerEvent::AbsentOrCancelledDeleted,
            "lesson_rescheduled" => LedgerEvent::LessonRescheduled,
            "package_added" => LedgerEvent::PackageAdded(lessons?),
            "free_lessons_granted" => LedgerEvent::FreeLessonsGranted(lessons?),
            _ => return None,
        };
        Some(event)
    }
}

impl std::fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.lessons() {
            Some(n) => write!(f, "{}({})", self.name(), n),
            None => write!(f, "{}", self.name()),
        }
    }
}

/// Result of applying one event to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerOutcome {
    pub account: StudentAccount,
    pub status: StudentStatus,
    /// Set for events that consume a lesson
    pub charged_to: Option<ChargedTo>,
    /// The input counters were negative and had to be clamped first
    pub repaired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    NegativeLessonCount(i64),
    Overflow,
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::NegativeLessonCount(n) => {
                write!(f, "Lesson count must not be negative (got {})", n)
            }
            LedgerError::Overflow => write!(f, "Lesson counter overflow"),
        }
    }
}

impl std::error::Error for LedgerError {}

/// Compute the account state after `event`.
///
/// Pure: callers persist the outcome. Negative inputs are clamped to zero
/// before the event applies and reported through `repaired`; negative lesson
/// counts on grant events are rejected.
pub fn apply_event(
    account: StudentAccount,
    event: &LedgerEvent,
) -> Result<LedgerOutcome, LedgerError> {
    if let Some(n) = event.lessons().filter(|n| *n < 0) {
        return Err(LedgerError::NegativeLessonCount(n));
    }

    let (current, repaired) = account.clamped();
    let StudentAccount {
        wallet_balance: wallet,
        debt_lessons: debt,
    } = current;

    let (next, charged_to) = match *event {
        LedgerEvent::LessonCompleted | LedgerEvent::ScheduledLessonDeleted => {
            let (next, side) = consume(current)?;
            (next, Some(side))
        }
        LedgerEvent::LessonAbsent
        | LedgerEvent::LessonCancelled
        | LedgerEvent::AbsentOrCancelledDeleted
        | LedgerEvent::LessonRescheduled => (current, None),
        LedgerEvent::CompletedLessonDeleted(Some(ChargedTo::Wallet)) => {
            (StudentAccount::new(checked_add(wallet, 1)?, debt), None)
        }
        LedgerEvent::CompletedLessonDeleted(_) => {
            // Debt may have been paid down since; refund to the wallet then.
            if debt > 0 {
                (StudentAccount::new(wallet, debt - 1), None)
            } else {
                (StudentAccount::new(checked_add(wallet, 1)?, debt), None)
            }
        }
        LedgerEvent::PackageAdded(n) => {
            let covered = debt.min(n);
            (
                StudentAccount::new(checked_add(wallet, n - covered)?, debt - covered),
                None,
            )
        }
        LedgerEvent::FreeLessonsGranted(n) => {
            (StudentAccount::new(checked_add(wallet, n)?, debt), None)
        }
    };

    Ok(LedgerOutcome {
        account: next,
        status: next.status(),
        charged_to,
        repaired,
    })
}

fn consume(account: StudentAccount) -> Result<(StudentAccount, ChargedTo), LedgerError> {
    if account.wallet_balance > 0 {
        Ok((
            StudentAccount::new(account.wallet_balance - 1, account.debt_lessons),
            ChargedTo::Wallet,
        ))
    } else {
        Ok((
            StudentAccount::new(
                account.wallet_balance,
                checked_add(account.debt_lessons, 1)?,
            ),
            ChargedTo::Debt,
        ))
    }
}

fn checked_add(value: i64, delta: i64) -> Result<i64, LedgerError> {
    value.checked_add(delta).ok_or(LedgerError::Overflow)
}
