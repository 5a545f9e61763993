use academic_records::config::AppConfig;
use academic_records::dataset::SchoolSnapshot;
use academic_records::error::AppError;
use academic_records::telemetry;
use academic_records::workflows::promotion::PromotionService;
use academic_records::workflows::records::{
    CourseId, GradebookService, MemoryStore, StudentId, Trimester, YearId,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "academic-records",
    about = "Evaluate and promote students from a JSON school snapshot",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate one student's year without writing anything
    Evaluate(StudentArgs),
    /// Promote one student into next year's course
    Promote(StudentCourseArgs),
    /// Promote every active student of a course
    PromoteAll(CourseArgs),
    /// Summarize one student's absences for a course trimester
    AttendanceSummary(AttendanceSummaryArgs),
}

#[derive(Args, Debug)]
struct DatasetArgs {
    /// Path to the school snapshot (JSON)
    #[arg(long)]
    dataset: PathBuf,
}

#[derive(Args, Debug)]
struct StudentArgs {
    #[command(flatten)]
    dataset: DatasetArgs,
    #[arg(long)]
    student: String,
    #[arg(long)]
    year: String,
}

#[derive(Args, Debug)]
struct StudentCourseArgs {
    #[command(flatten)]
    student: StudentArgs,
    #[arg(long)]
    course: String,
}

#[derive(Args, Debug)]
struct CourseArgs {
    #[command(flatten)]
    dataset: DatasetArgs,
    #[arg(long)]
    year: String,
    #[arg(long)]
    course: String,
}

#[derive(Args, Debug)]
struct AttendanceSummaryArgs {
    #[command(flatten)]
    student: StudentCourseArgs,
    /// Trimester label (T1, T2 or T3)
    #[arg(long, value_parser = parse_trimester)]
    trimester: Trimester,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    info!(environment = ?config.environment, "academic records cli starting");

    match cli.command {
        Command::Evaluate(args) => {
            let service = promotion_service(&args.dataset, &config)?;
            let evaluation = service.evaluator().evaluate(
                &StudentId::new(args.student),
                &YearId::new(args.year),
            )?;
            let messages = evaluation.reason_messages();
            print_json(&json!({ "evaluation": evaluation, "messages": messages }))
        }
        Command::Promote(args) => {
            let service = promotion_service(&args.student.dataset, &config)?;
            let outcome = service.promote(
                &StudentId::new(args.student.student),
                &YearId::new(args.student.year),
                &CourseId::new(args.course),
            )?;
            print_json(&json!({ "summary": outcome.summary(), "outcome": outcome }))
        }
        Command::PromoteAll(args) => {
            let service = promotion_service(&args.dataset, &config)?;
            let report = service
                .promote_all(&YearId::new(args.year), &CourseId::new(args.course))
                .await?;
            print_json(&report)
        }
        Command::AttendanceSummary(args) => {
            let StudentCourseArgs { student, course } = args.student;
            let store = load_store(&student.dataset, &config)?;
            let gradebook =
                GradebookService::new(store, config.gradebook, config.promotion.weighting);
            let summary = gradebook.trimester_attendance_summary(
                &StudentId::new(student.student),
                &CourseId::new(course),
                &YearId::new(student.year),
                args.trimester,
            )?;
            let ratio = summary.totals.ratio();
            print_json(&json!({ "summary": summary, "attendance_ratio": ratio }))
        }
    }
}

fn load_store(args: &DatasetArgs, config: &AppConfig) -> Result<Arc<MemoryStore>, AppError> {
    let snapshot = SchoolSnapshot::from_path(&args.dataset)?;
    Ok(snapshot.into_store(config)?)
}

fn promotion_service(
    args: &DatasetArgs,
    config: &AppConfig,
) -> Result<PromotionService<MemoryStore>, AppError> {
    let store = load_store(args, config)?;
    Ok(PromotionService::new(store, config.promotion.clone())?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn parse_trimester(raw: &str) -> Result<Trimester, String> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "T1" | "1" => Ok(Trimester::T1),
        "T2" | "2" => Ok(Trimester::T2),
        "T3" | "3" => Ok(Trimester::T3),
        _ => Err(format!("'{raw}' is not a trimester (expected T1, T2 or T3)")),
    }
}
