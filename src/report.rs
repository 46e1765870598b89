use std::fmt::Write;

use chrono::NaiveDate;

use crate::grades::GradeOverview;
use crate::models::{CourseAverage, StudentRecord};

pub fn build_transcript(
    student: &StudentRecord,
    course_averages: &[CourseAverage],
    overall: Option<f64>,
    overview: &GradeOverview,
    generated_on: NaiveDate,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Transcript for {}", student.full_name);
    let _ = writeln!(
        output,
        "Matricule {} ({}), generated {}",
        student.matricule, student.email, generated_on
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Course Averages");

    if course_averages.is_empty() {
        let _ = writeln!(output, "No evaluations recorded yet.");
    } else {
        for course in course_averages {
            let _ = writeln!(
                output,
                "- {} {}: {:.2}/20 ({} credits, {} evaluations)",
                course.course_code,
                course.course_name,
                course.average,
                course.credits,
                course.evaluation_count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Overall Average");
    match overall {
        Some(average) => {
            let credits: i32 = course_averages.iter().map(|c| c.credits).sum();
            let _ = writeln!(output, "{average:.2}/20 across {credits} credits");
        }
        None => {
            let _ = writeln!(output, "No evaluations recorded yet.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Evaluation Mix");

    if overview.by_type.is_empty() {
        let _ = writeln!(output, "No evaluations recorded yet.");
    } else {
        for summary in &overview.by_type {
            let _ = writeln!(
                output,
                "- {}: {} evaluations (mean {:.2})",
                summary.evaluation_type, summary.count, summary.mean
            );
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "## Score Bands");
        for (band, count) in &overview.distribution {
            let _ = writeln!(output, "- {}: {}", band.label(), count);
        }
    }

    output
}
