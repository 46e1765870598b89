use std::io::Read;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::models::EvaluationInput;

/// Header: `matricule,course_code,evaluation_type,score,weight,date,comment,source_key`.
/// `weight`, `comment` and `source_key` may be empty or absent.
#[derive(Debug, Deserialize)]
struct EvaluationCsvRow {
    matricule: String,
    course_code: String,
    evaluation_type: String,
    score: f64,
    #[serde(default)]
    weight: Option<f64>,
    date: NaiveDate,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    source_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImportRow {
    pub line: usize,
    pub matricule: String,
    pub course_code: String,
    pub input: EvaluationInput,
    pub source_key: Option<String>,
}

impl From<(usize, EvaluationCsvRow)> for ImportRow {
    fn from((line, row): (usize, EvaluationCsvRow)) -> Self {
        ImportRow {
            line,
            matricule: row.matricule.trim().to_string(),
            course_code: row.course_code.trim().to_string(),
            input: EvaluationInput {
                evaluation_type: row.evaluation_type,
                score: row.score,
                weight: row.weight.unwrap_or(1.0),
                date: row.date,
                comment: row.comment.filter(|c| !c.trim().is_empty()),
            },
            source_key: row.source_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

/// Decodes every row up front; a malformed row fails the whole file.
pub fn read_import_rows<R: Read>(source: R) -> anyhow::Result<Vec<ImportRow>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(source);
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<EvaluationCsvRow>().enumerate() {
        let line = index + 1;
        let row = result.with_context(|| format!("malformed row {line}"))?;
        rows.push(ImportRow::from((line, row)));
    }

    Ok(rows)
}
