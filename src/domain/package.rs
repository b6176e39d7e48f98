use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, StudentId};

pub type PackageId = Uuid;

/// A purchased bundle of lesson credits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub student_id: StudentId,
    /// Number of lesson credits in the bundle (always positive)
    pub lessons: i64,
    pub fee_cents: Cents,
    pub description: Option<String>,
    pub purchased_at: DateTime<Utc>,
}

impl Package {
    pub fn new(
        student_id: StudentId,
        lessons: i64,
        fee_cents: Cents,
        purchased_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            lessons,
            fee_cents,
            description: None,
            purchased_at,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Fee per lesson, rounded down to the cent.
    pub fn price_per_lesson(&self) -> Cents {
        if self.lessons > 0 {
            self.fee_cents / self.lessons
        } else {
            0
        }
    }
}
