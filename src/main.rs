use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use uuid::Uuid;

mod config;
mod db;
mod grades;
mod import;
mod logger;
mod models;
mod report;
mod schedule;
mod validation;

use crate::models::{DayOfWeek, EvaluationInput, SessionType, SlotInput, TimeOfDay};
use crate::validation::Rejection;

#[derive(Parser)]
#[command(name = "registrar")]
#[command(about = "Grade aggregation and room scheduling for the university registrar", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EvaluationArgs {
    #[arg(long = "type")]
    evaluation_type: String,
    #[arg(long)]
    score: f64,
    #[arg(long, default_value_t = 1.0)]
    weight: f64,
    #[arg(long)]
    date: NaiveDate,
    #[arg(long)]
    comment: Option<String>,
}

impl From<EvaluationArgs> for EvaluationInput {
    fn from(args: EvaluationArgs) -> Self {
        EvaluationInput {
            evaluation_type: args.evaluation_type,
            score: args.score,
            weight: args.weight,
            date: args.date,
            comment: args.comment,
        }
    }
}

#[derive(Args)]
struct SlotArgs {
    #[arg(long)]
    room: String,
    #[arg(long)]
    day: DayOfWeek,
    #[arg(long)]
    start: TimeOfDay,
    #[arg(long)]
    end: TimeOfDay,
    #[arg(long, default_value = "lecture")]
    session_type: SessionType,
}

impl From<SlotArgs> for SlotInput {
    fn from(args: SlotArgs) -> Self {
        SlotInput {
            room: args.room,
            day: args.day,
            start: args.start,
            end: args.end,
            session_type: args.session_type,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students, courses, evaluations and slots
    Seed,
    /// Import evaluations from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Weighted average of a student in one course
    CourseAverage {
        #[arg(long)]
        student: String,
        #[arg(long)]
        course: String,
        #[arg(long)]
        json: bool,
    },
    /// Credit-weighted average of a student across courses
    OverallAverage {
        #[arg(long)]
        student: String,
        #[arg(long)]
        json: bool,
    },
    /// Record an evaluation for an enrolled student
    AddEvaluation {
        #[arg(long)]
        student: String,
        #[arg(long)]
        course: String,
        #[command(flatten)]
        evaluation: EvaluationArgs,
    },
    /// Overwrite an evaluation in place
    UpdateEvaluation {
        #[arg(long)]
        id: Uuid,
        #[command(flatten)]
        evaluation: EvaluationArgs,
    },
    DeleteEvaluation {
        #[arg(long)]
        id: Uuid,
    },
    /// List evaluations, newest first, optionally filtered
    Evaluations {
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        course: Option<String>,
        #[arg(long = "type")]
        evaluation_type: Option<String>,
    },
    ShowEvaluation {
        #[arg(long)]
        id: Uuid,
    },
    /// Score statistics across all evaluations
    GradeStats,
    /// Report whether a room is free for a time range
    CheckConflict {
        #[arg(long)]
        room: String,
        #[arg(long)]
        day: DayOfWeek,
        #[arg(long)]
        start: TimeOfDay,
        #[arg(long)]
        end: TimeOfDay,
        /// Slot to ignore, when checking a reschedule
        #[arg(long)]
        exclude: Option<Uuid>,
    },
    /// Book a room for a course session
    AddSlot {
        #[arg(long)]
        course: String,
        #[command(flatten)]
        slot: SlotArgs,
    },
    UpdateSlot {
        #[arg(long)]
        id: Uuid,
        #[command(flatten)]
        slot: SlotArgs,
    },
    DeleteSlot {
        #[arg(long)]
        id: Uuid,
    },
    ShowSlot {
        #[arg(long)]
        id: Uuid,
    },
    /// List slots, optionally for one day or course
    Slots {
        #[arg(long)]
        day: Option<DayOfWeek>,
        #[arg(long)]
        course: Option<String>,
    },
    /// Slot counts by day, session type and room
    ScheduleStats,
    /// Write a markdown transcript for a student
    Transcript {
        #[arg(long)]
        student: String,
        #[arg(long, default_value = "transcript.md")]
        out: PathBuf,
    },
}

fn format_average(average: Option<f64>) -> String {
    match average {
        Some(value) => format!("{value:.2}"),
        None => "no evaluations recorded".to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::Config::from_env()?;
    logger::init_logging(&config.log_level);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_evaluations_csv(&pool, &csv).await?;
            println!("Inserted {inserted} evaluations from {}.", csv.display());
        }
        Commands::CourseAverage {
            student,
            course,
            json,
        } => {
            let student = db::require_student(&pool, &student).await??;
            let course = db::require_course(&pool, &course).await??;
            let evaluations = db::find_evaluations(&pool, student.id, course.id).await?;
            let average = grades::course_average(&evaluations);
            let total_weight: f64 = evaluations.iter().map(|e| e.weight).sum();

            if json {
                let body = json!({
                    "student": student.matricule,
                    "course": course.code,
                    "average": average,
                    "total_weight": total_weight,
                    "evaluations": evaluations,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!(
                    "{} in {}: {} across {} evaluations",
                    student.full_name,
                    course.code,
                    format_average(average),
                    evaluations.len()
                );
            }
        }
        Commands::OverallAverage { student, json } => {
            let student = db::require_student(&pool, &student).await??;
            let evaluations = db::find_student_evaluations(&pool, student.id).await?;
            let averages = grades::course_averages_for_student(&evaluations);
            let overall = grades::overall_average(&grades::credited(&averages));

            if json {
                let body = json!({
                    "student": student.matricule,
                    "overall_average": overall,
                    "total_credits": averages.iter().map(|a| a.credits).sum::<i32>(),
                    "courses": averages,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                for average in &averages {
                    println!(
                        "- {} ({} credits): {:.2}",
                        average.course_code, average.credits, average.average
                    );
                }
                println!(
                    "Overall average for {}: {}",
                    student.full_name,
                    format_average(overall)
                );
            }
        }
        Commands::AddEvaluation {
            student,
            course,
            evaluation,
        } => {
            let input = EvaluationInput::from(evaluation);
            let created = db::create_evaluation(&pool, &student, &course, &input).await??;
            println!("Evaluation {} recorded.", created.id);
        }
        Commands::UpdateEvaluation { id, evaluation } => {
            let input = EvaluationInput::from(evaluation);
            let updated = db::update_evaluation(&pool, id, &input).await??;
            println!(
                "Evaluation {} now {:.2} (weight {}).",
                updated.id, updated.score, updated.weight
            );
        }
        Commands::DeleteEvaluation { id } => {
            db::delete_evaluation(&pool, id).await??;
            println!("Evaluation {id} deleted.");
        }
        Commands::Evaluations {
            student,
            course,
            evaluation_type,
        } => {
            let student_id = match student {
                Some(matricule) => Some(db::require_student(&pool, &matricule).await??.id),
                None => None,
            };
            let course_id = match course {
                Some(code) => Some(db::require_course(&pool, &code).await??.id),
                None => None,
            };
            let evaluations =
                db::list_evaluations(&pool, student_id, course_id, evaluation_type.as_deref()).await?;

            if evaluations.is_empty() {
                println!("No evaluations recorded.");
            }
            for evaluation in evaluations {
                println!(
                    "- {} {} {} {:.2} (weight {})",
                    evaluation.id,
                    evaluation.date,
                    evaluation.evaluation_type,
                    evaluation.score,
                    evaluation.weight
                );
            }
        }
        Commands::ShowEvaluation { id } => {
            let evaluation = db::find_evaluation(&pool, id)
                .await?
                .ok_or_else(|| Rejection::not_found("evaluation", id))?;
            println!("{}", serde_json::to_string_pretty(&evaluation)?);
        }
        Commands::GradeStats => {
            let scores = db::fetch_all_scores(&pool).await?;
            let overview = grades::summarize_grades(&scores);
            println!("{}", serde_json::to_string_pretty(&overview)?);
        }
        Commands::CheckConflict {
            room,
            day,
            start,
            end,
            exclude,
        } => {
            let candidate = validation::validate_slot(&SlotInput {
                room,
                day,
                start,
                end,
                session_type: SessionType::default(),
            })?;
            let existing = db::find_slots(&pool, &candidate.room, candidate.day).await?;
            let conflicts = schedule::find_conflicts(&candidate, &existing, exclude);

            if conflicts.is_empty() {
                println!(
                    "Room {} is free on {} from {} to {}.",
                    candidate.room, candidate.day, candidate.start, candidate.end
                );
            } else {
                println!("Room {} is taken:", candidate.room);
                for slot in conflicts {
                    println!("- {} {}-{} ({})", slot.id, slot.start, slot.end, slot.session_type);
                }
            }
        }
        Commands::AddSlot { course, slot } => {
            let input = SlotInput::from(slot);
            let created = db::create_slot(&pool, &course, &input).await??;
            println!(
                "Slot {} booked: {} {} {}-{}.",
                created.id, created.room, created.day, created.start, created.end
            );
        }
        Commands::UpdateSlot { id, slot } => {
            let input = SlotInput::from(slot);
            let updated = db::update_slot(&pool, id, &input).await??;
            println!(
                "Slot {} moved to {} {} {}-{}.",
                updated.id, updated.room, updated.day, updated.start, updated.end
            );
        }
        Commands::DeleteSlot { id } => {
            db::delete_slot(&pool, id).await??;
            println!("Slot {id} deleted.");
        }
        Commands::ShowSlot { id } => {
            let slot = db::find_slot(&pool, id)
                .await?
                .ok_or_else(|| Rejection::not_found("slot", id))?;
            println!("{}", serde_json::to_string_pretty(&slot)?);
        }
        Commands::Slots { day, course } => {
            let course_id = match course {
                Some(code) => Some(db::require_course(&pool, &code).await??.id),
                None => None,
            };
            let slots = db::list_slots(&pool, day, course_id).await?;

            if slots.is_empty() {
                println!("No slots scheduled.");
            }
            for slot in slots {
                println!(
                    "- {} {} {}-{} room {} ({})",
                    slot.id, slot.day, slot.start, slot.end, slot.room, slot.session_type
                );
            }
        }
        Commands::ScheduleStats => {
            let slots = db::list_slots(&pool, None, None).await?;
            let overview = schedule::summarize_slots(&slots);
            println!("{}", serde_json::to_string_pretty(&overview)?);
        }
        Commands::Transcript { student, out } => {
            let student = db::require_student(&pool, &student).await??;
            let evaluations = db::find_student_evaluations(&pool, student.id).await?;
            let averages = grades::course_averages_for_student(&evaluations);
            let overall = grades::overall_average(&grades::credited(&averages));
            let scores: Vec<(String, f64)> = evaluations
                .iter()
                .map(|e| (e.evaluation_type.clone(), e.score))
                .collect();
            let overview = grades::summarize_grades(&scores);

            let transcript = report::build_transcript(
                &student,
                &averages,
                overall,
                &overview,
                Utc::now().date_naive(),
            );
            std::fs::write(&out, transcript)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(student = %student.matricule, path = %out.display(), "transcript written");
            println!("Transcript written to {}.", out.display());
        }
    }

    Ok(())
}
