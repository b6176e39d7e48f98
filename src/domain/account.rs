use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{StudentStatus, derive_status};

pub type StudentId = Uuid;

/// Lesson-credit counters of a single student.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentAccount {
    /// Prepaid lesson credits remaining
    pub wallet_balance: i64,
    /// Lessons delivered while no credit was available
    pub debt_lessons: i64,
}

impl StudentAccount {
    pub fn new(wallet_balance: i64, debt_lessons: i64) -> Self {
        Self {
            wallet_balance,
            debt_lessons,
        }
    }

    pub fn status(&self) -> StudentStatus {
        derive_status(self.wallet_balance, self.debt_lessons)
    }

    pub fn is_valid(&self) -> bool {
        self.wallet_balance >= 0 && self.debt_lessons >= 0
    }

    /// Clamp negative counters to zero. Returns the repaired account and
    /// whether anything had to change.
    pub fn clamped(self) -> (Self, bool) {
        let repaired = Self {
            wallet_balance: self.wallet_balance.max(0),
            debt_lessons: self.debt_lessons.max(0),
        };
        (repaired, repaired != self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub contact: Option<String>,
    pub account: StudentAccount,
    /// Persisted copy of `account.status()`, kept for filtering
    pub status: StudentStatus,
    /// Optimistic concurrency token, bumped on every account write
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Student {
    pub fn new(name: String) -> Self {
        let account = StudentAccount::default();
        Self {
            id: Uuid::new_v4(),
            name,
            contact: None,
            account,
            status: account.status(),
            version: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn wallet_balance(&self) -> i64 {
        self.account.wallet_balance
    }

    pub fn debt_lessons(&self) -> i64 {
        self.account.debt_lessons
    }

    /// True when the stored status disagrees with the counters.
    pub fn has_status_drift(&self) -> bool {
        self.status != self.account.status()
    }
}
