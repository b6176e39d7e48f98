// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use tempfile::TempDir;
use tuition::Config;
use tuition::application::AcademyService;
use tuition::domain::{Lesson, LessonStatus};

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(AcademyService, TempDir)> {
    test_service_with_retries(3).await
}

/// Helper to create a test service with a custom retry budget
pub async fn test_service_with_retries(max_retries: u32) -> Result<(AcademyService, TempDir)> {
    let (config, temp_dir) = test_config(max_retries)?;
    let service = AcademyService::open(&config, true).await?;
    Ok((service, temp_dir))
}

/// Config pointing at a fresh database inside a temporary directory
pub fn test_config(max_retries: u32) -> Result<(Config, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let config = Config {
        database: db_path.to_str().unwrap().to_string(),
        max_retries,
        ..Config::default()
    };
    Ok((config, temp_dir))
}

/// Helper to parse "YYYY-MM-DD HH:MM" into DateTime<Utc>
pub fn at(datetime: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(datetime, "%Y-%m-%d %H:%M")
        .unwrap()
        .and_utc()
}

/// Create a student and, when `lessons > 0`, sell them a package of that size
pub async fn enroll(service: &AcademyService, name: &str, lessons: i64) -> Result<()> {
    service.create_student(name.to_string(), None).await?;
    if lessons > 0 {
        service
            .purchase_package(name, lessons, lessons * 2500, None, Utc::now())
            .await?;
    }
    Ok(())
}

/// Schedule a lesson and mark it in one go
pub async fn lesson_marked(
    service: &AcademyService,
    student: &str,
    starts_at: &str,
    status: LessonStatus,
) -> Result<Lesson> {
    let lesson = service.schedule_lesson(student, at(starts_at), None).await?;
    if status == LessonStatus::Scheduled {
        return Ok(lesson);
    }
    Ok(service.mark_lesson(lesson.id, status).await?.lesson)
}

/// (wallet, debt) of a student as currently stored
pub async fn counters(service: &AcademyService, student: &str) -> Result<(i64, i64)> {
    let student = service.get_student(student).await?;
    Ok((student.wallet_balance(), student.debt_lessons()))
}
