use std::collections::HashMap;

use super::{Student, StudentAccount, StudentId, StudentStatus};

/// Result of a ledger integrity check.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub student_count: i64,
    pub lesson_count: i64,
    pub package_count: i64,
    pub entry_count: i64,
    pub students_by_status: HashMap<StudentStatus, i64>,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check every student against the invariants of the account model and the
/// last journal entry recorded for them.
pub fn build_integrity_report(
    students: &[Student],
    last_entries: &HashMap<StudentId, StudentAccount>,
    lesson_count: i64,
    package_count: i64,
    entry_count: i64,
    has_sequence_gaps: bool,
) -> IntegrityReport {
    let mut report = IntegrityReport {
        student_count: students.len() as i64,
        lesson_count,
        package_count,
        entry_count,
        ..Default::default()
    };

    for student in students {
        *report.students_by_status.entry(student.status).or_insert(0) += 1;

        if !student.account.is_valid() {
            report.issues.push(format!(
                "Student '{}' has negative counters (wallet {}, debt {})",
                student.name,
                student.wallet_balance(),
                student.debt_lessons()
            ));
        }
        if student.has_status_drift() {
            report.issues.push(format!(
                "Student '{}' is stored as {} but counters say {}",
                student.name,
                student.status,
                student.account.status()
            ));
        }

        let journal = last_entries.get(&student.id).copied().unwrap_or_default();
        if journal != student.account {
            report.issues.push(format!(
                "Student '{}' counters (wallet {}, debt {}) disagree with journal (wallet {}, debt {})",
                student.name,
                student.wallet_balance(),
                student.debt_lessons(),
                journal.wallet_balance,
                journal.debt_lessons
            ));
        }
    }

    if has_sequence_gaps {
        report
            .issues
            .push("Journal sequence numbers have gaps".to_string());
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student_with(name: &str, wallet: i64, debt: i64) -> Student {
        let mut student = Student::new(name.into());
        student.account = StudentAccount::new(wallet, debt);
        student.status = student.account.status();
        student
    }

    #[test]
    fn test_consistent_ledger_is_healthy() {
        let alice = student_with("Alice", 4, 0);
        let fresh = Student::new("Fresh".into());
        let mut journal = HashMap::new();
        journal.insert(alice.id, alice.account);

        let report = build_integrity_report(&[alice, fresh], &journal, 3, 1, 2, false);

        assert!(report.is_healthy(), "{:?}", report.issues);
        assert_eq!(report.student_count, 2);
        assert_eq!(report.students_by_status.get(&StudentStatus::Active), Some(&1));
        assert_eq!(report.students_by_status.get(&StudentStatus::Grace), Some(&1));
    }

    #[test]
    fn test_detects_drift_negatives_and_journal_mismatch() {
        let mut drifted = student_with("Drift", 5, 0);
        drifted.status = StudentStatus::Blocked;
        let negative = student_with("Negative", -1, 0);

        let mut journal = HashMap::new();
        journal.insert(drifted.id, StudentAccount::new(4, 0));
        journal.insert(negative.id, negative.account);

        let report = build_integrity_report(&[drifted, negative], &journal, 0, 0, 2, true);

        assert!(!report.is_healthy());
        assert_eq!(report.issues.len(), 4);
        assert!(report.issues.iter().any(|i| i.contains("stored as blocked")));
        assert!(report.issues.iter().any(|i| i.contains("negative counters")));
        assert!(report.issues.iter().any(|i| i.contains("disagree with journal")));
        assert!(report.issues.iter().any(|i| i.contains("gaps")));
    }
}
