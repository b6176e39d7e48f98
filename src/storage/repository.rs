use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    ChargedTo, LedgerEntry, LedgerEvent, Lesson, LessonId, LessonStatus, Package, Student,
    StudentAccount, StudentId, StudentStatus,
};

use super::MIGRATION_001_INITIAL;

const STUDENT_COLUMNS: &str =
    "id, name, contact, wallet_balance, debt_lessons, status, version, created_at";
const LESSON_COLUMNS: &str =
    "id, student_id, starts_at, duration_minutes, status, charged_to, created_at, updated_at";
const PACKAGE_COLUMNS: &str = "id, student_id, lessons, fee_cents, description, purchased_at";
const ENTRY_COLUMNS: &str = "id, sequence, student_id, event, lessons, lesson_id, package_id, wallet_before, debt_before, wallet_after, debt_after, status_after, charged_to, refunded_to, note, recorded_at";

/// Statistics for ledger integrity verification.
#[derive(Debug, Clone)]
pub struct IntegrityStats {
    pub lesson_count: i64,
    pub package_count: i64,
    pub entry_count: i64,
    pub has_sequence_gaps: bool,
}

/// Totals of the packages bought by one student.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackageTotals {
    pub count: i64,
    pub lessons: i64,
    pub fee_cents: i64,
}

/// Change to a lesson row made together with an account write.
/// Each variant carries the lesson status the event was computed against;
/// the write is rejected if the row has moved on since.
#[derive(Debug, Clone)]
pub enum LessonChange {
    Mark {
        lesson_id: LessonId,
        from: LessonStatus,
        to: LessonStatus,
        charged_to: Option<ChargedTo>,
    },
    Reschedule {
        lesson_id: LessonId,
        status: LessonStatus,
        starts_at: DateTime<Utc>,
    },
    Delete {
        lesson_id: LessonId,
        status: LessonStatus,
    },
}

/// One atomic account update: new counters guarded by the version they were
/// computed from, the rows the event touches and its journal entry.
pub struct AccountWrite<'a> {
    pub student_id: StudentId,
    pub expected_version: i64,
    pub account: StudentAccount,
    pub status: StudentStatus,
    pub lesson: Option<LessonChange>,
    pub package: Option<&'a Package>,
    pub entry: &'a mut LedgerEntry,
}

/// Repository for persisting students, lessons, packages and the journal.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the SQLite database at `path`.
    /// With `create` the file is created when missing.
    pub async fn connect(path: &str, create: bool, busy_timeout: Duration) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database {}", path))?;
        debug!(path, "connected to database");
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        debug!("migrations applied");
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(path: &str, busy_timeout: Duration) -> Result<Self> {
        let repo = Self::connect(path, true, busy_timeout).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Student operations
    // ========================

    /// Save a new student.
    pub async fn save_student(&self, student: &Student) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO students (id, name, contact, wallet_balance, debt_lessons, status, version, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(student.id.to_string())
        .bind(&student.name)
        .bind(&student.contact)
        .bind(student.wallet_balance())
        .bind(student.debt_lessons())
        .bind(student.status.as_str())
        .bind(student.version)
        .bind(timestamp(&student.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save student")?;
        Ok(())
    }

    /// Get a student by ID.
    pub async fn get_student(&self, id: StudentId) -> Result<Option<Student>> {
        let row = sqlx::query(&format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch student")?;

        row.as_ref().map(Self::row_to_student).transpose()
    }

    /// Get a student by name.
    pub async fn get_student_by_name(&self, name: &str) -> Result<Option<Student>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM students WHERE name = ?",
            STUDENT_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch student by name")?;

        row.as_ref().map(Self::row_to_student).transpose()
    }

    /// List students ordered by name, optionally only those with `status`.
    pub async fn list_students(&self, status: Option<StudentStatus>) -> Result<Vec<Student>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM students WHERE status = ? ORDER BY name",
                    STUDENT_COLUMNS
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM students ORDER BY name",
                    STUDENT_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to list students")?;

        rows.iter().map(Self::row_to_student).collect()
    }

    fn row_to_student(row: &SqliteRow) -> Result<Student> {
        let id_str: String = row.get("id");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");

        Ok(Student {
            id: Uuid::parse_str(&id_str).context("Invalid student ID")?,
            name: row.get("name"),
            contact: row.get("contact"),
            account: StudentAccount::new(row.get("wallet_balance"), row.get("debt_lessons")),
            status: StudentStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid student status: {}", status_str))?,
            version: row.get("version"),
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at")?,
        })
    }

    // ========================
    // Lesson operations
    // ========================

    /// Save a newly scheduled lesson.
    pub async fn save_lesson(&self, lesson: &Lesson) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lessons (id, student_id, starts_at, duration_minutes, status, charged_to, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(lesson.id.to_string())
        .bind(lesson.student_id.to_string())
        .bind(timestamp(&lesson.starts_at))
        .bind(lesson.duration_minutes)
        .bind(lesson.status.as_str())
        .bind(lesson.charged_to.map(|c| c.as_str()))
        .bind(timestamp(&lesson.created_at))
        .bind(timestamp(&lesson.updated_at))
        .execute(&self.pool)
        .await
        .context("Failed to save lesson")?;
        Ok(())
    }

    /// Get a lesson by ID.
    pub async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>> {
        let row = sqlx::query(&format!("SELECT {} FROM lessons WHERE id = ?", LESSON_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch lesson")?;

        row.as_ref().map(Self::row_to_lesson).transpose()
    }

    /// List a student's lessons by start time, optionally filtered by status.
    pub async fn list_lessons_for_student(
        &self,
        student_id: StudentId,
        status: Option<LessonStatus>,
    ) -> Result<Vec<Lesson>> {
        let mut query = format!("SELECT {} FROM lessons WHERE student_id = ?", LESSON_COLUMNS);
        if status.is_some() {
            query.push_str(" AND status = ?");
        }
        query.push_str(" ORDER BY starts_at");

        let mut sql_query = sqlx::query(&query).bind(student_id.to_string());
        if let Some(status) = status {
            sql_query = sql_query.bind(status.as_str());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list lessons")?;

        rows.iter().map(Self::row_to_lesson).collect()
    }

    /// Count a student's lessons per status.
    pub async fn count_lessons_by_status(
        &self,
        student_id: StudentId,
    ) -> Result<HashMap<LessonStatus, i64>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) as count
            FROM lessons
            WHERE student_id = ?
            GROUP BY status
            "#,
        )
        .bind(student_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to count lessons")?;

        let mut counts = HashMap::new();
        for row in rows {
            let status_str: String = row.get("status");
            let status = LessonStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid lesson status: {}", status_str))?;
            counts.insert(status, row.get("count"));
        }
        Ok(counts)
    }

    fn row_to_lesson(row: &SqliteRow) -> Result<Lesson> {
        let id_str: String = row.get("id");
        let student_id_str: String = row.get("student_id");
        let status_str: String = row.get("status");
        let charged_to_str: Option<String> = row.get("charged_to");
        let starts_at_str: String = row.get("starts_at");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(Lesson {
            id: Uuid::parse_str(&id_str).context("Invalid lesson ID")?,
            student_id: Uuid::parse_str(&student_id_str).context("Invalid student ID")?,
            starts_at: parse_timestamp(&starts_at_str).context("Invalid starts_at")?,
            duration_minutes: row.get("duration_minutes"),
            status: LessonStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid lesson status: {}", status_str))?,
            charged_to: parse_charged_to(charged_to_str)?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at")?,
            updated_at: parse_timestamp(&updated_at_str).context("Invalid updated_at")?,
        })
    }

    // ========================
    // Package operations
    // ========================

    /// List a student's packages, oldest first.
    pub async fn list_packages_for_student(&self, student_id: StudentId) -> Result<Vec<Package>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM packages WHERE student_id = ? ORDER BY purchased_at",
            PACKAGE_COLUMNS
        ))
        .bind(student_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list packages")?;

        rows.iter().map(Self::row_to_package).collect()
    }

    /// Sum the packages bought by a student.
    pub async fn package_totals(&self, student_id: StudentId) -> Result<PackageTotals> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as count,
                COALESCE(SUM(lessons), 0) as lessons,
                COALESCE(SUM(fee_cents), 0) as fee_cents
            FROM packages
            WHERE student_id = ?
            "#,
        )
        .bind(student_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum packages")?;

        Ok(PackageTotals {
            count: row.get("count"),
            lessons: row.get("lessons"),
            fee_cents: row.get("fee_cents"),
        })
    }

    fn row_to_package(row: &SqliteRow) -> Result<Package> {
        let id_str: String = row.get("id");
        let student_id_str: String = row.get("student_id");
        let purchased_at_str: String = row.get("purchased_at");

        Ok(Package {
            id: Uuid::parse_str(&id_str).context("Invalid package ID")?,
            student_id: Uuid::parse_str(&student_id_str).context("Invalid student ID")?,
            lessons: row.get("lessons"),
            fee_cents: row.get("fee_cents"),
            description: row.get("description"),
            purchased_at: parse_timestamp(&purchased_at_str).context("Invalid purchased_at")?,
        })
    }

    // ========================
    // Account writes
    // ========================

    /// Apply an account write in a single transaction.
    ///
    /// Returns `false` without changing anything when the student's version or
    /// the lesson's status no longer match what the write was computed from.
    pub async fn commit_account_write(&self, write: AccountWrite<'_>) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let updated = sqlx::query(
            r#"
            UPDATE students
            SET wallet_balance = ?, debt_lessons = ?, status = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(write.account.wallet_balance)
        .bind(write.account.debt_lessons)
        .bind(write.status.as_str())
        .bind(write.student_id.to_string())
        .bind(write.expected_version)
        .execute(&mut *tx)
        .await
        .context("Failed to update student account")?
        .rows_affected();

        if updated == 0 {
            debug!(student_id = %write.student_id, "stale student version");
            return Ok(false);
        }

        if let Some(change) = &write.lesson {
            if !Self::apply_lesson_change(&mut tx, change).await? {
                debug!(student_id = %write.student_id, "stale lesson status");
                return Ok(false);
            }
        }

        if let Some(package) = write.package {
            Self::insert_package(&mut tx, package).await?;
        }

        write.entry.sequence = Self::next_sequence(&mut tx).await?;
        Self::insert_entry(&mut tx, write.entry).await?;

        tx.commit().await.context("Failed to commit account write")?;
        Ok(true)
    }

    async fn apply_lesson_change(
        tx: &mut Transaction<'_, Sqlite>,
        change: &LessonChange,
    ) -> Result<bool> {
        let now = timestamp(&Utc::now());
        let result = match change {
            LessonChange::Mark {
                lesson_id,
                from,
                to,
                charged_to,
            } => {
                sqlx::query(
                    "UPDATE lessons SET status = ?, charged_to = ?, updated_at = ? WHERE id = ? AND status = ?",
                )
                .bind(to.as_str())
                .bind(charged_to.map(|c| c.as_str()))
                .bind(&now)
                .bind(lesson_id.to_string())
                .bind(from.as_str())
                .execute(&mut **tx)
                .await
            }
            LessonChange::Reschedule {
                lesson_id,
                status,
                starts_at,
            } => {
                sqlx::query(
                    "UPDATE lessons SET starts_at = ?, updated_at = ? WHERE id = ? AND status = ?",
                )
                .bind(timestamp(starts_at))
                .bind(&now)
                .bind(lesson_id.to_string())
                .bind(status.as_str())
                .execute(&mut **tx)
                .await
            }
            LessonChange::Delete { lesson_id, status } => {
                sqlx::query("DELETE FROM lessons WHERE id = ? AND status = ?")
                    .bind(lesson_id.to_string())
                    .bind(status.as_str())
                    .execute(&mut **tx)
                    .await
            }
        }
        .context("Failed to update lesson")?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_package(tx: &mut Transaction<'_, Sqlite>, package: &Package) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO packages (id, student_id, lessons, fee_cents, description, purchased_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(package.id.to_string())
        .bind(package.student_id.to_string())
        .bind(package.lessons)
        .bind(package.fee_cents)
        .bind(&package.description)
        .bind(timestamp(&package.purchased_at))
        .execute(&mut **tx)
        .await
        .context("Failed to save package")?;
        Ok(())
    }

    /// Get the next journal sequence number and increment the counter.
    async fn next_sequence(tx: &mut Transaction<'_, Sqlite>) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'entry_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut **tx)
        .await
        .context("Failed to get next sequence number")?;

        Ok(row.get("value"))
    }

    async fn insert_entry(tx: &mut Transaction<'_, Sqlite>, entry: &LedgerEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, sequence, student_id, event, lessons, lesson_id, package_id, wallet_before, debt_before, wallet_after, debt_after, status_after, charged_to, refunded_to, note, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.sequence)
        .bind(entry.student_id.to_string())
        .bind(entry.event.name())
        .bind(entry.event.lessons())
        .bind(entry.lesson_id.map(|id| id.to_string()))
        .bind(entry.package_id.map(|id| id.to_string()))
        .bind(entry.before.wallet_balance)
        .bind(entry.before.debt_lessons)
        .bind(entry.after.wallet_balance)
        .bind(entry.after.debt_lessons)
        .bind(entry.status_after.as_str())
        .bind(entry.charged_to.map(|c| c.as_str()))
        .bind(entry.event.refunded_side().map(|c| c.as_str()))
        .bind(&entry.note)
        .bind(timestamp(&entry.recorded_at))
        .execute(&mut **tx)
        .await
        .context("Failed to save ledger entry")?;
        Ok(())
    }

    // ========================
    // Journal queries
    // ========================

    /// List a student's journal entries in sequence order.
    /// With `limit`, only the most recent entries are returned.
    pub async fn list_entries_for_student(
        &self,
        student_id: StudentId,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerEntry>> {
        let mut query = format!(
            "SELECT {} FROM ledger_entries WHERE student_id = ? ORDER BY sequence DESC",
            ENTRY_COLUMNS
        );
        if let Some(lim) = limit {
            query.push_str(&format!(" LIMIT {}", lim));
        }

        let rows = sqlx::query(&query)
            .bind(student_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list ledger entries")?;

        let mut entries = rows
            .iter()
            .map(Self::row_to_entry)
            .collect::<Result<Vec<_>>>()?;
        entries.reverse();
        Ok(entries)
    }

    /// Counters recorded by each student's most recent journal entry.
    pub async fn last_entry_accounts(&self) -> Result<HashMap<StudentId, StudentAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT e.student_id, e.wallet_after, e.debt_after
            FROM ledger_entries e
            JOIN (
                SELECT student_id, MAX(sequence) as sequence
                FROM ledger_entries
                GROUP BY student_id
            ) last ON last.student_id = e.student_id AND last.sequence = e.sequence
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch last ledger entries")?;

        let mut accounts = HashMap::new();
        for row in rows {
            let student_id_str: String = row.get("student_id");
            let student_id = Uuid::parse_str(&student_id_str).context("Invalid student ID")?;
            accounts.insert(
                student_id,
                StudentAccount::new(row.get("wallet_after"), row.get("debt_after")),
            );
        }
        Ok(accounts)
    }

    /// Get the last journal timestamp for a student.
    pub async fn get_last_activity(&self, student_id: StudentId) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            r#"
            SELECT MAX(recorded_at) as last_activity
            FROM ledger_entries
            WHERE student_id = ?
            "#,
        )
        .bind(student_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to get last activity")?;

        let last_activity: Option<String> = row.get("last_activity");
        last_activity
            .map(|s| parse_timestamp(&s).context("Invalid timestamp"))
            .transpose()
    }

    fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry> {
        let id_str: String = row.get("id");
        let student_id_str: String = row.get("student_id");
        let event_str: String = row.get("event");
        let lessons: Option<i64> = row.get("lessons");
        let lesson_id_str: Option<String> = row.get("lesson_id");
        let package_id_str: Option<String> = row.get("package_id");
        let status_str: String = row.get("status_after");
        let charged_to = parse_charged_to(row.get("charged_to"))?;
        let refunded_to = parse_charged_to(row.get("refunded_to"))?;
        let recorded_at_str: String = row.get("recorded_at");

        Ok(LedgerEntry {
            id: Uuid::parse_str(&id_str).context("Invalid entry ID")?,
            sequence: row.get("sequence"),
            student_id: Uuid::parse_str(&student_id_str).context("Invalid student ID")?,
            event: LedgerEvent::from_parts(&event_str, lessons, refunded_to)
                .ok_or_else(|| anyhow::anyhow!("Invalid ledger event: {}", event_str))?,
            lesson_id: lesson_id_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid lesson ID")?,
            package_id: package_id_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid package ID")?,
            before: StudentAccount::new(row.get("wallet_before"), row.get("debt_before")),
            after: StudentAccount::new(row.get("wallet_after"), row.get("debt_after")),
            status_after: StudentStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid status: {}", status_str))?,
            charged_to,
            note: row.get("note"),
            recorded_at: parse_timestamp(&recorded_at_str).context("Invalid recorded_at")?,
        })
    }

    // ========================
    // Integrity
    // ========================

    /// Get statistics for integrity checking.
    pub async fn get_integrity_stats(&self) -> Result<IntegrityStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM lessons) as lesson_count,
                (SELECT COUNT(*) FROM packages) as package_count,
                (SELECT COUNT(*) FROM ledger_entries) as entry_count,
                (SELECT MIN(sequence) FROM ledger_entries) as min_seq,
                (SELECT MAX(sequence) FROM ledger_entries) as max_seq
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to collect integrity stats")?;

        let entry_count: i64 = row.get("entry_count");
        let min_seq: Option<i64> = row.get("min_seq");
        let max_seq: Option<i64> = row.get("max_seq");

        let has_sequence_gaps = match (min_seq, max_seq) {
            (Some(min), Some(max)) => (max - min + 1) != entry_count,
            _ => false,
        };

        Ok(IntegrityStats {
            lesson_count: row.get("lesson_count"),
            package_count: row.get("package_count"),
            entry_count,
            has_sequence_gaps,
        })
    }
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    // Fixed precision keeps the text columns sortable.
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn parse_charged_to(value: Option<String>) -> Result<Option<ChargedTo>> {
    value
        .map(|s| {
            ChargedTo::from_str(&s).ok_or_else(|| anyhow::anyhow!("Invalid charge side: {}", s))
        })
        .transpose()
}
