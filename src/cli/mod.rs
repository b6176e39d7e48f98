use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{AcademyService, EventResult};
use crate::config::Config;
use crate::domain::{LedgerEntry, LessonStatus, StudentStatus, format_cents, parse_cents};

/// Tuition - lesson-credit ledger for tuition academies
#[derive(Parser)]
#[command(name = "tuition")]
#[command(about = "Track lesson credits, debt and student status for a tuition academy")]
#[command(version)]
pub struct Cli {
    /// Database file path (overrides the config file)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Config file (defaults to ./tuition.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Student management commands
    #[command(subcommand)]
    Student(StudentCommands),

    /// Lesson package commands
    #[command(subcommand)]
    Package(PackageCommands),

    /// Grant free lesson credits (does not pay down debt)
    Grant {
        /// Student name
        student: String,

        /// Number of lessons to grant
        #[arg(short, long)]
        lessons: i64,

        /// Reason for the grant
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Lesson scheduling and attendance commands
    #[command(subcommand)]
    Lesson(LessonCommands),

    /// Show the ledger history of a student
    History {
        /// Student name
        student: String,

        /// Only show the most recent entries
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Verify ledger integrity
    Check,
}

#[derive(Subcommand)]
pub enum StudentCommands {
    /// Create a new student
    Create {
        /// Student name (must be unique)
        name: String,

        /// Contact details (phone, email, parent)
        #[arg(short, long)]
        contact: Option<String>,
    },

    /// List students
    List {
        /// Only students with this status: active, grace, blocked
        #[arg(short, long)]
        status: Option<String>,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Show detailed student information
    Show {
        /// Student name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum PackageCommands {
    /// Record a package purchase
    Buy {
        /// Student name
        student: String,

        /// Number of lessons in the package
        #[arg(short, long)]
        lessons: i64,

        /// Package fee (e.g., "120.00" or "120")
        #[arg(short, long, default_value = "0")]
        fee: String,

        /// Description of the package
        #[arg(long)]
        description: Option<String>,

        /// Purchase date (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },

    /// List a student's packages
    List {
        /// Student name
        student: String,
    },
}

#[derive(Subcommand)]
pub enum LessonCommands {
    /// Schedule a lesson
    Schedule {
        /// Student name
        student: String,

        /// Start time (YYYY-MM-DD HH:MM or YYYY-MM-DD)
        #[arg(long)]
        at: String,

        /// Duration in minutes
        #[arg(long)]
        duration: Option<i64>,
    },

    /// Mark a scheduled lesson as completed
    Complete {
        /// Lesson ID
        id: String,
    },

    /// Mark a scheduled lesson as absent
    Absent {
        /// Lesson ID
        id: String,
    },

    /// Cancel a scheduled lesson
    Cancel {
        /// Lesson ID
        id: String,
    },

    /// Move a lesson to another time
    Reschedule {
        /// Lesson ID
        id: String,

        /// New start time (YYYY-MM-DD HH:MM or YYYY-MM-DD)
        #[arg(long)]
        at: String,
    },

    /// Delete a lesson
    Delete {
        /// Lesson ID
        id: String,
    },

    /// List a student's lessons
    List {
        /// Student name
        student: String,

        /// Filter by status: scheduled, completed, absent, cancelled
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show lesson details
    Show {
        /// Lesson ID
        id: String,
    },
}

impl Cli {
    /// Load the config file and apply command line overrides.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        Ok(config)
    }

    pub async fn run(self, config: Config) -> Result<()> {
        match self.command {
            Commands::Init => {
                AcademyService::open(&config, true).await?;
                println!("Database initialized: {}", config.database);
            }

            Commands::Student(cmd) => {
                let service = AcademyService::open(&config, false).await?;
                run_student_command(&service, cmd).await?;
            }

            Commands::Package(cmd) => {
                let service = AcademyService::open(&config, false).await?;
                run_package_command(&service, cmd).await?;
            }

            Commands::Grant {
                student,
                lessons,
                note,
            } => {
                let service = AcademyService::open(&config, false).await?;
                let result = service.grant_free_lessons(&student, lessons, note).await?;
                println!("Granted {} free lesson(s) to {}", lessons, result.student_name);
                print_account(&result);
            }

            Commands::Lesson(cmd) => {
                let service = AcademyService::open(&config, false).await?;
                run_lesson_command(&service, cmd).await?;
            }

            Commands::History {
                student,
                limit,
                format,
            } => {
                let service = AcademyService::open(&config, false).await?;
                let entries = service.history(&student, limit).await?;
                if format == "json" {
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                } else {
                    print_history(&entries);
                }
            }

            Commands::Check => {
                let service = AcademyService::open(&config, false).await?;
                run_check_command(&service).await?;
            }
        }

        Ok(())
    }
}

async fn run_student_command(service: &AcademyService, cmd: StudentCommands) -> Result<()> {
    match cmd {
        StudentCommands::Create { name, contact } => {
            let student = service.create_student(name, contact).await?;
            println!("Created student: {} ({})", student.name, student.id);
        }

        StudentCommands::List { status, format } => {
            let status = status
                .map(|s| {
                    s.parse::<StudentStatus>().map_err(|e| {
                        anyhow::anyhow!("{}. Valid statuses: active, grace, blocked", e)
                    })
                })
                .transpose()?;
            let students = service.list_students(status).await?;

            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&students)?);
            } else if students.is_empty() {
                println!("No students found.");
            } else {
                println!("{:<24} {:>7} {:>6} {:<8}", "NAME", "WALLET", "DEBT", "STATUS");
                println!("{}", "-".repeat(48));
                for student in students {
                    println!(
                        "{:<24} {:>7} {:>6} {:<8}",
                        student.name,
                        student.wallet_balance(),
                        student.debt_lessons(),
                        student.status
                    );
                }
            }
        }

        StudentCommands::Show { name } => {
            let info = service.get_student_info(&name).await?;
            let student = &info.student;

            println!("Student: {}", student.name);
            println!("  ID:             {}", student.id);
            if let Some(contact) = &student.contact {
                println!("  Contact:        {}", contact);
            }
            println!(
                "  Created:        {}",
                student.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!();
            println!("  Wallet:         {} lesson(s)", student.wallet_balance());
            println!("  Debt:           {} lesson(s)", student.debt_lessons());
            println!("  Status:         {}", student.status);
            println!();
            println!(
                "  Packages:       {} ({} lessons, {} total)",
                info.packages.count,
                info.packages.lessons,
                format_cents(info.packages.fee_cents)
            );
            for status in [
                LessonStatus::Scheduled,
                LessonStatus::Completed,
                LessonStatus::Absent,
                LessonStatus::Cancelled,
            ] {
                let count = info.lessons_by_status.get(&status).copied().unwrap_or(0);
                println!("  {:<15} {}", format!("{}:", capitalize(status.as_str())), count);
            }
            if let Some(last) = info.last_activity {
                println!("  Last activity:  {}", last.format("%Y-%m-%d %H:%M:%S"));
            }
        }
    }
    Ok(())
}

async fn run_package_command(service: &AcademyService, cmd: PackageCommands) -> Result<()> {
    match cmd {
        PackageCommands::Buy {
            student,
            lessons,
            fee,
            description,
            date,
        } => {
            let fee_cents =
                parse_cents(&fee).context("Invalid fee format. Use '120.00' or '120'")?;
            let purchased_at = match date {
                Some(date_str) => parse_datetime(&date_str)?,
                None => Utc::now(),
            };

            let result = service
                .purchase_package(&student, lessons, fee_cents, description, purchased_at)
                .await?;

            println!(
                "Recorded package: {} lesson(s) for {} ({})",
                result.package.lessons,
                format_cents(result.package.fee_cents),
                result.package.id
            );
            let covered = -result.event.entry.debt_delta();
            if covered > 0 {
                println!("  Covered {} lesson(s) of debt", covered);
            }
            print_account(&result.event);
        }

        PackageCommands::List { student } => {
            let packages = service.list_packages(&student).await?;
            if packages.is_empty() {
                println!("No packages found.");
            } else {
                println!(
                    "{:<12} {:>8} {:>10} {:>10}  {}",
                    "DATE", "LESSONS", "FEE", "PER LESSON", "DESCRIPTION"
                );
                println!("{}", "-".repeat(60));
                for package in packages {
                    println!(
                        "{:<12} {:>8} {:>10} {:>10}  {}",
                        package.purchased_at.format("%Y-%m-%d"),
                        package.lessons,
                        format_cents(package.fee_cents),
                        format_cents(package.price_per_lesson()),
                        package.description.as_deref().unwrap_or("")
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_lesson_command(service: &AcademyService, cmd: LessonCommands) -> Result<()> {
    match cmd {
        LessonCommands::Schedule {
            student,
            at,
            duration,
        } => {
            let starts_at = parse_datetime(&at)?;
            let lesson = service.schedule_lesson(&student, starts_at, duration).await?;
            println!(
                "Scheduled lesson for {} at {} ({} min) ({})",
                student,
                lesson.starts_at.format("%Y-%m-%d %H:%M"),
                lesson.duration_minutes,
                lesson.id
            );
        }

        LessonCommands::Complete { id } => {
            mark(service, &id, LessonStatus::Completed).await?;
        }

        LessonCommands::Absent { id } => {
            mark(service, &id, LessonStatus::Absent).await?;
        }

        LessonCommands::Cancel { id } => {
            mark(service, &id, LessonStatus::Cancelled).await?;
        }

        LessonCommands::Reschedule { id, at } => {
            let lesson_id = parse_lesson_id(&id)?;
            let starts_at = parse_datetime(&at)?;
            let result = service.reschedule_lesson(lesson_id, starts_at).await?;
            println!(
                "Rescheduled lesson {} to {}",
                result.lesson.id,
                result.lesson.starts_at.format("%Y-%m-%d %H:%M")
            );
        }

        LessonCommands::Delete { id } => {
            let lesson_id = parse_lesson_id(&id)?;
            let result = service.delete_lesson(lesson_id).await?;
            println!(
                "Deleted {} lesson {} ({})",
                result.lesson.status,
                result.lesson.id,
                result.event.entry.event
            );
            print_account(&result.event);
        }

        LessonCommands::List { student, status } => {
            let status = status
                .map(|s| s.parse::<LessonStatus>().map_err(|e| anyhow::anyhow!(e)))
                .transpose()?;
            let lessons = service.list_lessons(&student, status).await?;
            if lessons.is_empty() {
                println!("No lessons found.");
            } else {
                println!("{:<17} {:>5} {:<10} {}", "STARTS", "MIN", "STATUS", "ID");
                println!("{}", "-".repeat(72));
                for lesson in lessons {
                    println!(
                        "{:<17} {:>5} {:<10} {}",
                        lesson.starts_at.format("%Y-%m-%d %H:%M"),
                        lesson.duration_minutes,
                        lesson.status,
                        lesson.id
                    );
                }
            }
        }

        LessonCommands::Show { id } => {
            let lesson = service.get_lesson(parse_lesson_id(&id)?).await?;
            println!("Lesson: {}", lesson.id);
            println!("  Student ID:  {}", lesson.student_id);
            println!(
                "  Starts:      {}",
                lesson.starts_at.format("%Y-%m-%d %H:%M")
            );
            println!("  Duration:    {} min", lesson.duration_minutes);
            println!("  Status:      {}", lesson.status);
            if let Some(charged_to) = lesson.charged_to {
                println!("  Charged to:  {}", charged_to);
            }
        }
    }
    Ok(())
}

async fn mark(service: &AcademyService, id: &str, status: LessonStatus) -> Result<()> {
    let result = service.mark_lesson(parse_lesson_id(id)?, status).await?;
    println!("Marked lesson {} as {}", result.lesson.id, result.lesson.status);
    print_account(&result.event);
    Ok(())
}

async fn run_check_command(service: &AcademyService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Students:  {}", report.student_count);
    println!("Lessons:   {}", report.lesson_count);
    println!("Packages:  {}", report.package_count);
    println!("Entries:   {}", report.entry_count);
    println!();

    println!("Students by status:");
    for status in StudentStatus::all() {
        let count = report.students_by_status.get(&status).copied().unwrap_or(0);
        println!("  {:<10} {:>6}", format!("{}:", status), count);
    }
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

fn print_account(result: &EventResult) {
    let account = result.account();
    println!(
        "  {}: wallet {}, debt {} ({})",
        result.student_name,
        account.wallet_balance,
        account.debt_lessons,
        result.status()
    );
    if result.repaired {
        eprintln!("  Warning: stored counters were negative and have been reset to zero");
    }
}

fn print_history(entries: &[LedgerEntry]) {
    if entries.is_empty() {
        println!("No ledger entries found.");
        return;
    }

    println!(
        "{:>5} {:<17} {:<30} {:>9} {:>9} {:<8}",
        "SEQ", "RECORDED", "EVENT", "WALLET", "DEBT", "STATUS"
    );
    println!("{}", "-".repeat(84));
    for entry in entries {
        println!(
            "{:>5} {:<17} {:<30} {:>9} {:>9} {:<8}",
            entry.sequence,
            entry.recorded_at.format("%Y-%m-%d %H:%M"),
            entry.event.to_string(),
            format!("{} -> {}", entry.before.wallet_balance, entry.after.wallet_balance),
            format!("{} -> {}", entry.before.debt_lessons, entry.after.debt_lessons),
            entry.status_after
        );
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn parse_lesson_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).context("Invalid lesson ID format (expected UUID)")
}

/// Parse `YYYY-MM-DD HH:MM`, `YYYY-MM-DDTHH:MM` or `YYYY-MM-DD` (midnight) as UTC.
fn parse_datetime(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(naive.and_utc());
        }
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").with_context(|| {
        format!(
            "Invalid date '{}'. Use YYYY-MM-DD or YYYY-MM-DD HH:MM",
            input
        )
    })?;
    let naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;
    Ok(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_formats() {
        let expected = "2025-03-10T15:30:00+00:00";
        assert_eq!(
            parse_datetime("2025-03-10 15:30").unwrap().to_rfc3339(),
            expected
        );
        assert_eq!(
            parse_datetime("2025-03-10T15:30").unwrap().to_rfc3339(),
            expected
        );
        assert_eq!(
            parse_datetime("2025-03-10").unwrap().to_rfc3339(),
            "2025-03-10T00:00:00+00:00"
        );
        assert!(parse_datetime("10/03/2025").is_err());
    }

    #[test]
    fn test_cli_overrides_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tuition.toml");
        std::fs::write(&path, "database = \"file.db\"\nmax_retries = 9\n").unwrap();

        let cli = Cli::parse_from([
            "tuition",
            "--config",
            path.to_str().unwrap(),
            "--database",
            "other.db",
            "check",
        ]);
        let config = cli.load_config().unwrap();
        assert_eq!(config.database, "other.db");
        assert_eq!(config.max_retries, 9);
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("scheduled"), "Scheduled");
        assert_eq!(capitalize(""), "");
    }
}
