use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing_subscriber::EnvFilter;

use academic_results::engine::{self, UnclassifiedExamPolicy};
use academic_results::{db, report};

#[derive(Parser)]
#[command(name = "academic-results")]
#[command(about = "Semester and yearly result computation with grade ranking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a realistic demo dataset
    Seed,
    /// Import score entries from a CSV file into one semester
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        year: String,
        #[arg(long)]
        semester: String,
    },
    /// Compute and store semester results, ranked per grade
    ComputeSemester {
        #[arg(long)]
        year: String,
        #[arg(long)]
        semester: String,
        /// Fail instead of logging when unclassified exams sit in scope
        #[arg(long)]
        strict_exam_kinds: bool,
    },
    /// Roll stored semester results up into yearly results and re-rank
    ComputeYearly {
        #[arg(long)]
        year: String,
    },
    /// List computed semester results
    Results {
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        year: Option<String>,
        #[arg(long)]
        semester: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List computed yearly results
    YearlyResults {
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        year: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown ranking report for one semester
    Report {
        #[arg(long)]
        year: String,
        #[arg(long)]
        semester: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://school.db".to_string());

    let options = SqliteConnectOptions::from_str(&database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to open the results database")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::init_db(&pool).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import {
            csv,
            year,
            semester,
        } => {
            let imported = db::import_scores_csv(&pool, &csv, &year, &semester).await?;
            println!("Imported {imported} score entries from {}.", csv.display());
        }
        Commands::ComputeSemester {
            year,
            semester,
            strict_exam_kinds,
        } => {
            let academic_year_id = db::academic_year_id_by_name(&pool, &year).await?;
            let semester_id = db::semester_id_by_name(&pool, &semester).await?;
            let policy = if strict_exam_kinds {
                UnclassifiedExamPolicy::Strict
            } else {
                UnclassifiedExamPolicy::Lenient
            };
            let processed =
                engine::compute_semester_results(&pool, academic_year_id, semester_id, policy)
                    .await?;
            if processed == 0 {
                println!("No results computed for {semester}, {year} (no qualifying students or scores).");
            } else {
                println!("Computed semester results for {processed} students ({semester}, {year}).");
            }
        }
        Commands::ComputeYearly { year } => {
            let academic_year_id = db::academic_year_id_by_name(&pool, &year).await?;
            let processed = engine::compute_yearly_results(&pool, academic_year_id).await?;
            if processed == 0 {
                println!("No yearly results computed for {year} (no semester results stored).");
            } else {
                println!("Computed yearly results for {processed} students ({year}).");
            }
        }
        Commands::Results {
            student,
            year,
            semester,
            json,
        } => {
            let results = db::list_semester_results(
                &pool,
                student.as_deref(),
                year.as_deref(),
                semester.as_deref(),
            )
            .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No semester results stored.");
            } else {
                for result in &results {
                    println!(
                        "- {} ({}, {}) {} {}: total {:.2}, average {:.2}%, rank {}",
                        result.student_name,
                        result.student_code,
                        result.grade_name,
                        result.semester_name,
                        result.academic_year_name,
                        result.total_marks,
                        result.average_score,
                        result.grade_rank
                    );
                }
            }
        }
        Commands::YearlyResults {
            student,
            year,
            json,
        } => {
            let results =
                db::list_yearly_results(&pool, student.as_deref(), year.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No yearly results stored.");
            } else {
                for result in &results {
                    println!(
                        "- {} ({}, {}) {}: total {:.2}, average {:.2}%, rank {}",
                        result.student_name,
                        result.student_code,
                        result.grade_name,
                        result.academic_year_name,
                        result.total_marks,
                        result.average_score,
                        result.grade_rank
                    );
                }
            }
        }
        Commands::Report {
            year,
            semester,
            out,
        } => {
            let results =
                db::list_semester_results(&pool, None, Some(&year), Some(&semester)).await?;
            let report = report::build_semester_report(&year, &semester, &results);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
