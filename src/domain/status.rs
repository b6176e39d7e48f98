use serde::{Deserialize, Serialize};

/// Wallet balance at or above which a student is considered fully funded.
pub const ACTIVE_WALLET_THRESHOLD: i64 = 3;

/// Debt at or above which a student is blocked from booking further lessons.
pub const BLOCKED_DEBT_THRESHOLD: i64 = 2;

/// Billing classification of a student.
///
/// The status is never stored on its own authority: it is recomputed from the
/// account counters with [`derive_status`] after every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    /// Comfortably funded
    Active,
    /// Low on credits or carrying a small debt
    Grace,
    /// Debt threshold reached
    Blocked,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::Grace => "grace",
            StudentStatus::Blocked => "blocked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(StudentStatus::Active),
            "grace" => Some(StudentStatus::Grace),
            "blocked" => Some(StudentStatus::Blocked),
            _ => None,
        }
    }

    pub fn all() -> [StudentStatus; 3] {
        [
            StudentStatus::Active,
            StudentStatus::Grace,
            StudentStatus::Blocked,
        ]
    }
}

impl std::fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for StudentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StudentStatus::from_str(s).ok_or_else(|| format!("unknown status '{}'", s))
    }
}

/// Classify an account by its counters. The wallet check comes first, so a
/// funded student stays Active even while carrying debt.
pub fn derive_status(wallet_balance: i64, debt_lessons: i64) -> StudentStatus {
    if wallet_balance >= ACTIVE_WALLET_THRESHOLD {
        StudentStatus::Active
    } else if debt_lessons >= BLOCKED_DEBT_THRESHOLD {
        StudentStatus::Blocked
    } else {
        StudentStatus::Grace
    }
}
