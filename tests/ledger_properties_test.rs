use proptest::prelude::*;
use tuition::domain::{
    ChargedTo, LedgerError, LedgerEvent, StudentAccount, StudentStatus, apply_event,
    derive_status,
};

fn arb_account() -> impl Strategy<Value = StudentAccount> {
    (0i64..50, 0i64..50).prop_map(|(wallet, debt)| StudentAccount::new(wallet, debt))
}

fn arb_event() -> impl Strategy<Value = LedgerEvent> {
    prop_oneof![
        Just(LedgerEvent::LessonCompleted),
        Just(LedgerEvent::LessonAbsent),
        Just(LedgerEvent::LessonCancelled),
        Just(LedgerEvent::ScheduledLessonDeleted),
        Just(LedgerEvent::CompletedLessonDeleted(None)),
        Just(LedgerEvent::CompletedLessonDeleted(Some(ChargedTo::Wallet))),
        Just(LedgerEvent::CompletedLessonDeleted(Some(ChargedTo::Debt))),
        Just(LedgerEvent::AbsentOrCancelledDeleted),
        Just(LedgerEvent::LessonRescheduled),
        (0i64..30).prop_map(LedgerEvent::PackageAdded),
        (0i64..30).prop_map(LedgerEvent::FreeLessonsGranted),
    ]
}

proptest! {
    /// Funded students are Active no matter how much debt they carry
    #[test]
    fn status_is_active_whenever_wallet_reaches_threshold(wallet in 3i64..1000, debt in 0i64..1000) {
        prop_assert_eq!(derive_status(wallet, debt), StudentStatus::Active);
    }

    /// Below the wallet threshold the debt alone decides
    #[test]
    fn status_below_threshold_follows_debt(wallet in 0i64..3, debt in 0i64..1000) {
        let expected = if debt >= 2 { StudentStatus::Blocked } else { StudentStatus::Grace };
        prop_assert_eq!(derive_status(wallet, debt), expected);
    }

    /// Any sequence of events keeps both counters non-negative and the
    /// status in step with them
    #[test]
    fn counters_stay_non_negative(start in arb_account(), events in prop::collection::vec(arb_event(), 0..40)) {
        let mut account = start;
        for event in events {
            let outcome = apply_event(account, &event).unwrap();
            prop_assert!(outcome.account.wallet_balance >= 0);
            prop_assert!(outcome.account.debt_lessons >= 0);
            prop_assert_eq!(outcome.status, outcome.account.status());
            prop_assert!(!outcome.repaired);
            account = outcome.account;
        }
    }

    /// Rescheduling is a pure calendar move
    #[test]
    fn reschedule_is_identity(account in arb_account()) {
        let outcome = apply_event(account, &LedgerEvent::LessonRescheduled).unwrap();
        prop_assert_eq!(outcome.account, account);
        prop_assert_eq!(outcome.status, account.status());
        prop_assert_eq!(outcome.charged_to, None);
    }

    /// Deleting a completed lesson undoes its completion exactly
    #[test]
    fn completion_then_deletion_round_trips(account in arb_account()) {
        let completed = apply_event(account, &LedgerEvent::LessonCompleted).unwrap();
        let reversed = apply_event(
            completed.account,
            &LedgerEvent::CompletedLessonDeleted(completed.charged_to),
        )
        .unwrap();
        prop_assert_eq!(reversed.account, account);
        prop_assert_eq!(reversed.status, account.status());
    }

    /// New package credits pay down debt one-for-one before reaching the wallet
    #[test]
    fn package_covers_debt_first(account in arb_account(), lessons in 0i64..100) {
        let outcome = apply_event(account, &LedgerEvent::PackageAdded(lessons)).unwrap();
        let covered = account.debt_lessons.min(lessons);
        prop_assert_eq!(outcome.account.debt_lessons, account.debt_lessons - covered);
        prop_assert_eq!(outcome.account.wallet_balance, account.wallet_balance + lessons - covered);
        // Credits are conserved: every lesson either cleared debt or landed in the wallet
        prop_assert_eq!(
            outcome.account.wallet_balance - outcome.account.debt_lessons,
            account.wallet_balance - account.debt_lessons + lessons
        );
    }

    /// Free lessons never touch debt
    #[test]
    fn free_grants_leave_debt_alone(account in arb_account(), lessons in 0i64..100) {
        let outcome = apply_event(account, &LedgerEvent::FreeLessonsGranted(lessons)).unwrap();
        prop_assert_eq!(outcome.account.debt_lessons, account.debt_lessons);
        prop_assert_eq!(outcome.account.wallet_balance, account.wallet_balance + lessons);
    }

    /// Negative grants are rejected before any arithmetic
    #[test]
    fn negative_grants_rejected(account in arb_account(), lessons in -100i64..0) {
        prop_assert_eq!(
            apply_event(account, &LedgerEvent::PackageAdded(lessons)),
            Err(LedgerError::NegativeLessonCount(lessons))
        );
        prop_assert_eq!(
            apply_event(account, &LedgerEvent::FreeLessonsGranted(lessons)),
            Err(LedgerError::NegativeLessonCount(lessons))
        );
    }

    /// Corrupt counters are clamped, never driven further negative
    #[test]
    fn corrupt_input_is_clamped(wallet in -50i64..0, debt in -50i64..50, event in arb_event()) {
        let outcome = apply_event(StudentAccount::new(wallet, debt), &event).unwrap();
        prop_assert!(outcome.repaired);
        prop_assert!(outcome.account.is_valid());
    }
}

#[test]
fn test_documented_scenarios() {
    let outcome = apply_event(StudentAccount::new(0, 3), &LedgerEvent::PackageAdded(8)).unwrap();
    assert_eq!(outcome.account, StudentAccount::new(5, 0));

    let outcome = apply_event(StudentAccount::new(0, 1), &LedgerEvent::LessonCompleted).unwrap();
    assert_eq!(outcome.account, StudentAccount::new(0, 2));
    assert_eq!(outcome.status, StudentStatus::Blocked);

    let outcome = apply_event(StudentAccount::new(5, 0), &LedgerEvent::LessonCompleted).unwrap();
    assert_eq!(outcome.account, StudentAccount::new(4, 0));
    assert_eq!(outcome.status, StudentStatus::Active);

    let outcome = apply_event(
        StudentAccount::new(2, 0),
        &LedgerEvent::AbsentOrCancelledDeleted,
    )
    .unwrap();
    assert_eq!(outcome.account, StudentAccount::new(2, 0));
}
