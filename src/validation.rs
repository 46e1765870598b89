use std::fmt;

use crate::models::{EvaluationInput, ScheduleSlot, SlotCandidate, SlotInput};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 20.0;

/// Why a write was refused before anything was mutated.
#[derive(Debug, Clone)]
pub enum Rejection {
    NotFound { entity: &'static str, key: String },
    Conflict { message: String, conflicting: Vec<ScheduleSlot> },
    Invalid(Vec<String>),
}

impl Rejection {
    pub fn not_found(entity: &'static str, key: impl fmt::Display) -> Self {
        Rejection::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotFound { entity, key } => write!(f, "{entity} '{key}' not found"),
            Rejection::Conflict {
                message,
                conflicting,
            } => {
                write!(f, "{message}")?;
                for slot in conflicting {
                    write!(
                        f,
                        "; overlaps {} {} {}-{}",
                        slot.room, slot.day, slot.start, slot.end
                    )?;
                }
                Ok(())
            }
            Rejection::Invalid(problems) => write!(f, "invalid input: {}", problems.join(", ")),
        }
    }
}

impl std::error::Error for Rejection {}

pub type Outcome<T> = Result<T, Rejection>;

pub fn validate_evaluation(input: &EvaluationInput) -> Outcome<()> {
    let mut problems = Vec::new();

    if input.evaluation_type.trim().is_empty() {
        problems.push("evaluation type is required".to_string());
    }
    if !input.score.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&input.score) {
        problems.push(format!(
            "score must be between {MIN_SCORE} and {MAX_SCORE}, got {}",
            input.score
        ));
    }
    if !input.weight.is_finite() || input.weight <= 0.0 {
        problems.push(format!("weight must be positive, got {}", input.weight));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Rejection::Invalid(problems))
    }
}

/// Existence and enrollment problems win over bad field values.
pub fn admit_evaluation<T>(resolved: Outcome<T>, input: &EvaluationInput) -> Outcome<T> {
    let subject = resolved?;
    validate_evaluation(input)?;
    Ok(subject)
}

pub fn validate_slot(input: &SlotInput) -> Outcome<SlotCandidate> {
    let mut problems = Vec::new();
    let room = input.room.trim();

    if room.is_empty() {
        problems.push("room is required".to_string());
    }
    if input.start >= input.end {
        problems.push(format!(
            "start {} must be before end {}",
            input.start, input.end
        ));
    }

    if !problems.is_empty() {
        return Err(Rejection::Invalid(problems));
    }

    Ok(SlotCandidate {
        room: room.to_string(),
        day: input.day,
        start: input.start,
        end: input.end,
    })
}
