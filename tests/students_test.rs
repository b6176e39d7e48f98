mod common;

use anyhow::Result;
use chrono::Utc;
use common::{enroll, lesson_marked, test_service};
use tuition::application::AppError;
use tuition::domain::{LessonStatus, StudentAccount, StudentStatus};

#[tokio::test]
async fn test_new_student_starts_with_empty_account() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let student = service
        .create_student("Alice".to_string(), Some("555-0100".to_string()))
        .await?;

    assert_eq!(student.account, StudentAccount::new(0, 0));
    assert_eq!(student.status, StudentStatus::Grace);

    let stored = service.get_student("Alice").await?;
    assert_eq!(stored.id, student.id);
    assert_eq!(stored.contact.as_deref(), Some("555-0100"));
    assert_eq!(stored.version, 0);

    // A fresh student has no journal yet
    assert!(service.history("Alice", None).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_duplicate_and_blank_names_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.create_student("Alice".to_string(), None).await?;

    let result = service.create_student("Alice".to_string(), None).await;
    assert!(matches!(result, Err(AppError::StudentAlreadyExists(_))));

    let result = service.create_student("   ".to_string(), None).await;
    assert!(matches!(result, Err(AppError::InvalidName(_))));

    // Names are trimmed before the uniqueness check
    let result = service.create_student("  Alice ".to_string(), None).await;
    assert!(matches!(result, Err(AppError::StudentAlreadyExists(_))));

    // Lookups trim the same way
    let found = service.get_student(" Alice\t").await?;
    assert_eq!(found.name, "Alice");
    assert_eq!(service.history("  Alice", None).await?.len(), 0);

    Ok(())
}

#[tokio::test]
async fn test_unknown_student() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let result = service.get_student("Nobody").await;
    assert!(matches!(result, Err(AppError::StudentNotFound(_))));

    let result = service
        .purchase_package("Nobody", 5, 10000, None, Utc::now())
        .await;
    assert!(matches!(result, Err(AppError::StudentNotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_list_students_by_status() -> Result<()> {
    let (service, _temp) = test_service().await?;

    enroll(&service, "Funded", 10).await?;
    enroll(&service, "Low", 1).await?;
    enroll(&service, "Owing", 0).await?;
    lesson_marked(&service, "Owing", "2025-01-06 16:00", LessonStatus::Completed).await?;
    lesson_marked(&service, "Owing", "2025-01-13 16:00", LessonStatus::Completed).await?;

    let all = service.list_students(None).await?;
    let names: Vec<_> = all.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Funded", "Low", "Owing"]);

    let active = service.list_students(Some(StudentStatus::Active)).await?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].name, "Funded");

    let grace = service.list_students(Some(StudentStatus::Grace)).await?;
    assert_eq!(grace.len(), 1);
    assert_eq!(grace[0].name, "Low");

    let blocked = service.list_students(Some(StudentStatus::Blocked)).await?;
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].name, "Owing");
    assert_eq!(blocked[0].account, StudentAccount::new(0, 2));

    Ok(())
}

#[tokio::test]
async fn test_student_info_summarizes_activity() -> Result<()> {
    let (service, _temp) = test_service().await?;

    enroll(&service, "Alice", 8).await?;
    service
        .purchase_package("Alice", 4, 9000, Some("Top-up".into()), Utc::now())
        .await?;
    lesson_marked(&service, "Alice", "2025-02-03 10:00", LessonStatus::Completed).await?;
    lesson_marked(&service, "Alice", "2025-02-10 10:00", LessonStatus::Absent).await?;
    lesson_marked(&service, "Alice", "2025-02-17 10:00", LessonStatus::Scheduled).await?;

    let info = service.get_student_info("Alice").await?;

    assert_eq!(info.student.account, StudentAccount::new(11, 0));
    assert_eq!(info.packages.count, 2);
    assert_eq!(info.packages.lessons, 12);
    assert_eq!(info.packages.fee_cents, 8 * 2500 + 9000);
    assert_eq!(info.lessons_by_status.get(&LessonStatus::Completed), Some(&1));
    assert_eq!(info.lessons_by_status.get(&LessonStatus::Absent), Some(&1));
    assert_eq!(info.lessons_by_status.get(&LessonStatus::Scheduled), Some(&1));
    assert_eq!(info.lessons_by_status.get(&LessonStatus::Cancelled), None);
    assert!(info.last_activity.is_some());

    Ok(())
}
