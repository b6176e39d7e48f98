use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{
    ChargedTo, Cents, IntegrityReport, LedgerEntry, LedgerEvent, Lesson, LessonId, LessonStatus,
    Package, Student, StudentAccount, StudentId, StudentStatus, apply_event,
    build_integrity_report,
};
use crate::storage::{AccountWrite, LessonChange, PackageTotals, Repository};

use super::AppError;

/// Application service providing the academy's billing operations.
/// Every account mutation goes through [`apply_event`] and is written
/// atomically together with its journal entry.
#[derive(Clone)]
pub struct AcademyService {
    repo: Repository,
    max_retries: u32,
}

/// Result of applying one event to a student account
#[derive(Debug, Clone)]
pub struct EventResult {
    pub student_name: String,
    pub entry: LedgerEntry,
    /// Stored counters were negative and had to be clamped
    pub repaired: bool,
}

impl EventResult {
    pub fn account(&self) -> StudentAccount {
        self.entry.after
    }

    pub fn status(&self) -> StudentStatus {
        self.entry.status_after
    }
}

/// Result of a package purchase
#[derive(Debug, Clone)]
pub struct PackageResult {
    pub package: Package,
    pub event: EventResult,
}

/// Result of an operation on an existing lesson
#[derive(Debug, Clone)]
pub struct LessonResult {
    /// The lesson as it is after the operation (as it was, for deletions)
    pub lesson: Lesson,
    pub event: EventResult,
}

/// Detailed student information
pub struct StudentInfo {
    pub student: Student,
    pub lessons_by_status: HashMap<LessonStatus, i64>,
    pub packages: PackageTotals,
    pub last_activity: Option<DateTime<Utc>>,
}

/// What a caller asked for; resolved against fresh reads on every attempt.
enum Request<'a> {
    Package(&'a Package),
    FreeLessons { lessons: i64, note: Option<String> },
    Mark { lesson_id: LessonId, to: LessonStatus },
    Reschedule {
        lesson_id: LessonId,
        starts_at: DateTime<Utc>,
    },
    Delete { lesson_id: LessonId },
}

/// A request resolved against the current lesson row.
struct Plan {
    student_id: StudentId,
    event: LedgerEvent,
    lesson: Option<Lesson>,
}

impl AcademyService {
    /// Create a new service with the given repository.
    pub fn new(repo: Repository, max_retries: u32) -> Self {
        Self { repo, max_retries }
    }

    /// Open the database described by `config`, creating it when `create` is set.
    pub async fn open(config: &Config, create: bool) -> Result<Self, AppError> {
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let repo = if create {
            Repository::init(&config.database, busy_timeout).await?
        } else {
            Repository::connect(&config.database, false, busy_timeout).await?
        };
        Ok(Self::new(repo, config.max_retries))
    }

    // ========================
    // Student operations
    // ========================

    /// Create a new student with an empty account.
    pub async fn create_student(
        &self,
        name: String,
        contact: Option<String>,
    ) -> Result<Student, AppError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidName(name));
        }
        if self.repo.get_student_by_name(&name).await?.is_some() {
            return Err(AppError::StudentAlreadyExists(name));
        }

        let mut student = Student::new(name);
        if let Some(contact) = contact {
            student = student.with_contact(contact);
        }

        self.repo.save_student(&student).await?;
        info!(student = %student.name, id = %student.id, "student created");
        Ok(student)
    }

    /// Get a student by name. Surrounding whitespace is ignored, as on creation.
    pub async fn get_student(&self, name: &str) -> Result<Student, AppError> {
        let name = name.trim();
        self.repo
            .get_student_by_name(name)
            .await?
            .ok_or_else(|| AppError::StudentNotFound(name.to_string()))
    }

    async fn get_student_by_id(&self, id: StudentId) -> Result<Student, AppError> {
        self.repo
            .get_student(id)
            .await?
            .ok_or_else(|| AppError::StudentNotFound(id.to_string()))
    }

    /// Get detailed student information.
    pub async fn get_student_info(&self, name: &str) -> Result<StudentInfo, AppError> {
        let student = self.get_student(name).await?;
        let lessons_by_status = self.repo.count_lessons_by_status(student.id).await?;
        let packages = self.repo.package_totals(student.id).await?;
        let last_activity = self.repo.get_last_activity(student.id).await?;

        Ok(StudentInfo {
            student,
            lessons_by_status,
            packages,
            last_activity,
        })
    }

    /// List students, optionally only those in `status`.
    pub async fn list_students(
        &self,
        status: Option<StudentStatus>,
    ) -> Result<Vec<Student>, AppError> {
        Ok(self.repo.list_students(status).await?)
    }

    // ========================
    // Credit operations
    // ========================

    /// Record a package purchase. New credits pay down existing debt first.
    pub async fn purchase_package(
        &self,
        student_name: &str,
        lessons: i64,
        fee_cents: Cents,
        description: Option<String>,
        purchased_at: DateTime<Utc>,
    ) -> Result<PackageResult, AppError> {
        if lessons <= 0 {
            return Err(AppError::InvalidAmount(
                "Package must contain at least one lesson".to_string(),
            ));
        }
        if fee_cents < 0 {
            return Err(AppError::InvalidAmount(
                "Package fee must not be negative".to_string(),
            ));
        }

        let student = self.get_student(student_name).await?;
        let mut package = Package::new(student.id, lessons, fee_cents, purchased_at);
        if let Some(desc) = description {
            package = package.with_description(desc);
        }

        let (event, _) = self
            .execute(Some(student.id), Request::Package(&package))
            .await?;
        Ok(PackageResult { package, event })
    }

    /// Grant free lesson credits. Free credits do not pay down debt.
    pub async fn grant_free_lessons(
        &self,
        student_name: &str,
        lessons: i64,
        note: Option<String>,
    ) -> Result<EventResult, AppError> {
        if lessons <= 0 {
            return Err(AppError::InvalidAmount(
                "Grant must contain at least one lesson".to_string(),
            ));
        }

        let student = self.get_student(student_name).await?;
        let (event, _) = self
            .execute(Some(student.id), Request::FreeLessons { lessons, note })
            .await?;
        Ok(event)
    }

    // ========================
    // Lesson operations
    // ========================

    /// Book a lesson. Booking alone has no effect on the account.
    pub async fn schedule_lesson(
        &self,
        student_name: &str,
        starts_at: DateTime<Utc>,
        duration_minutes: Option<i64>,
    ) -> Result<Lesson, AppError> {
        let student = self.get_student(student_name).await?;
        let mut lesson = Lesson::new(student.id, starts_at);
        if let Some(minutes) = duration_minutes {
            if minutes <= 0 {
                return Err(AppError::InvalidDuration(minutes));
            }
            lesson = lesson.with_duration(minutes);
        }

        self.repo.save_lesson(&lesson).await?;
        info!(student = %student.name, lesson = %lesson.id, starts_at = %lesson.starts_at, "lesson scheduled");
        Ok(lesson)
    }

    /// Get a lesson by ID.
    pub async fn get_lesson(&self, id: LessonId) -> Result<Lesson, AppError> {
        self.repo
            .get_lesson(id)
            .await?
            .ok_or_else(|| AppError::LessonNotFound(id.to_string()))
    }

    /// List a student's lessons, optionally filtered by status.
    pub async fn list_lessons(
        &self,
        student_name: &str,
        status: Option<LessonStatus>,
    ) -> Result<Vec<Lesson>, AppError> {
        let student = self.get_student(student_name).await?;
        Ok(self
            .repo
            .list_lessons_for_student(student.id, status)
            .await?)
    }

    /// Mark a scheduled lesson as completed, absent or cancelled.
    pub async fn mark_lesson(
        &self,
        lesson_id: LessonId,
        status: LessonStatus,
    ) -> Result<LessonResult, AppError> {
        let (event, lesson) = self
            .execute(None, Request::Mark {
                lesson_id,
                to: status,
            })
            .await?;
        Self::lesson_result(lesson, event, lesson_id)
    }

    /// Move a lesson in the calendar. Never touches the account.
    pub async fn reschedule_lesson(
        &self,
        lesson_id: LessonId,
        starts_at: DateTime<Utc>,
    ) -> Result<LessonResult, AppError> {
        let (event, lesson) = self
            .execute(None, Request::Reschedule {
                lesson_id,
                starts_at,
            })
            .await?;
        Self::lesson_result(lesson, event, lesson_id)
    }

    /// Delete a lesson, settling the account according to its status.
    pub async fn delete_lesson(&self, lesson_id: LessonId) -> Result<LessonResult, AppError> {
        let (event, lesson) = self.execute(None, Request::Delete { lesson_id }).await?;
        Self::lesson_result(lesson, event, lesson_id)
    }

    fn lesson_result(
        lesson: Option<Lesson>,
        event: EventResult,
        lesson_id: LessonId,
    ) -> Result<LessonResult, AppError> {
        let lesson = lesson.ok_or_else(|| AppError::LessonNotFound(lesson_id.to_string()))?;
        Ok(LessonResult { lesson, event })
    }

    // ========================
    // Event application
    // ========================

    /// Resolve a request, apply its event and write the result, retrying from
    /// fresh reads when another writer got to the same rows first.
    async fn execute(
        &self,
        student_id: Option<StudentId>,
        request: Request<'_>,
    ) -> Result<(EventResult, Option<Lesson>), AppError> {
        let attempts = self.max_retries + 1;
        let mut student_name = student_id.map(|id| id.to_string()).unwrap_or_default();

        for attempt in 1..=attempts {
            let plan = self.plan(student_id, &request).await?;
            let student = self.get_student_by_id(plan.student_id).await?;
            student_name = student.name.clone();

            let outcome = apply_event(student.account, &plan.event)?;
            if outcome.repaired {
                warn!(
                    student = %student.name,
                    wallet = student.wallet_balance(),
                    debt = student.debt_lessons(),
                    "negative account counters clamped to zero"
                );
            }

            let mut entry = LedgerEntry::new(student.id, plan.event, student.account, &outcome);
            let mut lesson_change = None;
            let mut lesson_after = plan.lesson.clone();
            let mut package = None;

            match &request {
                Request::Package(p) => {
                    entry = entry.with_package(p.id);
                    if let Some(desc) = &p.description {
                        entry = entry.with_note(desc.clone());
                    }
                    package = Some(*p);
                }
                Request::FreeLessons { note, .. } => {
                    if let Some(note) = note {
                        entry = entry.with_note(note.clone());
                    }
                }
                Request::Mark { to, .. } => {
                    if let Some(lesson) = lesson_after.as_mut() {
                        let charged_to: Option<ChargedTo> = match to {
                            LessonStatus::Completed => outcome.charged_to,
                            _ => None,
                        };
                        lesson_change = Some(LessonChange::Mark {
                            lesson_id: lesson.id,
                            from: lesson.status,
                            to: *to,
                            charged_to,
                        });
                        lesson.status = *to;
                        lesson.charged_to = charged_to;
                        lesson.updated_at = Utc::now();
                    }
                }
                Request::Reschedule { starts_at, .. } => {
                    if let Some(lesson) = lesson_after.as_mut() {
                        lesson_change = Some(LessonChange::Reschedule {
                            lesson_id: lesson.id,
                            status: lesson.status,
                            starts_at: *starts_at,
                        });
                        lesson.starts_at = *starts_at;
                        lesson.updated_at = Utc::now();
                    }
                }
                Request::Delete { .. } => {
                    if let Some(lesson) = &lesson_after {
                        lesson_change = Some(LessonChange::Delete {
                            lesson_id: lesson.id,
                            status: lesson.status,
                        });
                    }
                }
            }
            if let Some(lesson) = &plan.lesson {
                entry = entry.with_lesson(lesson.id);
            }

            let committed = self
                .repo
                .commit_account_write(AccountWrite {
                    student_id: student.id,
                    expected_version: student.version,
                    account: outcome.account,
                    status: outcome.status,
                    lesson: lesson_change,
                    package,
                    entry: &mut entry,
                })
                .await?;

            if committed {
                info!(
                    student = %student.name,
                    event = %entry.event,
                    wallet = entry.after.wallet_balance,
                    debt = entry.after.debt_lessons,
                    status = %entry.status_after,
                    sequence = entry.sequence,
                    "ledger event applied"
                );
                let result = EventResult {
                    student_name: student.name,
                    entry,
                    repaired: outcome.repaired,
                };
                return Ok((result, lesson_after));
            }

            warn!(
                student = %student.name,
                attempt,
                attempts,
                "concurrent account update, retrying from a fresh read"
            );
        }

        Err(AppError::ConcurrentUpdate {
            student: student_name,
            attempts,
        })
    }

    async fn plan(
        &self,
        student_id: Option<StudentId>,
        request: &Request<'_>,
    ) -> Result<Plan, AppError> {
        let lesson_id = match request {
            Request::Package(package) => {
                return Ok(Plan {
                    student_id: package.student_id,
                    event: LedgerEvent::PackageAdded(package.lessons),
                    lesson: None,
                });
            }
            Request::FreeLessons { lessons, .. } => {
                let student_id = student_id
                    .ok_or_else(|| AppError::StudentNotFound("(unspecified)".to_string()))?;
                return Ok(Plan {
                    student_id,
                    event: LedgerEvent::FreeLessonsGranted(*lessons),
                    lesson: None,
                });
            }
            Request::Mark { lesson_id, .. }
            | Request::Reschedule { lesson_id, .. }
            | Request::Delete { lesson_id } => *lesson_id,
        };

        let lesson = self.get_lesson(lesson_id).await?;
        let event = match request {
            Request::Mark { to, .. } => {
                lesson
                    .mark_event(*to)
                    .ok_or(AppError::InvalidLessonTransition {
                        from: lesson.status,
                        to: *to,
                    })?
            }
            Request::Reschedule { .. } => LedgerEvent::LessonRescheduled,
            _ => lesson.delete_event(),
        };

        Ok(Plan {
            student_id: lesson.student_id,
            event,
            lesson: Some(lesson),
        })
    }

    // ========================
    // Journal & integrity
    // ========================

    /// Journal entries for a student, oldest first.
    /// With `limit`, only the most recent entries.
    pub async fn history(
        &self,
        student_name: &str,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let student = self.get_student(student_name).await?;
        Ok(self
            .repo
            .list_entries_for_student(student.id, limit)
            .await?)
    }

    /// List a student's packages.
    pub async fn list_packages(&self, student_name: &str) -> Result<Vec<Package>, AppError> {
        let student = self.get_student(student_name).await?;
        Ok(self.repo.list_packages_for_student(student.id).await?)
    }

    /// Check ledger integrity and return a report.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let stats = self.repo.get_integrity_stats().await?;
        let students = self.repo.list_students(None).await?;
        let last_entries = self.repo.last_entry_accounts().await?;

        let report = build_integrity_report(
            &students,
            &last_entries,
            stats.lesson_count,
            stats.package_count,
            stats.entry_count,
            stats.has_sequence_gaps,
        );

        if !report.is_healthy() {
            warn!(issues = report.issues.len(), "ledger integrity issues found");
        }
        Ok(report)
    }
}
