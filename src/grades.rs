use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use uuid::Uuid;

use crate::models::{CourseAverage, CourseEvaluation, CreditedAverage, Evaluation};

/// Rounds half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn weighted_mean(pairs: impl Iterator<Item = (f64, f64)>) -> Option<f64> {
    let mut seen = false;
    let mut numerator = 0.0;
    let mut denominator = 0.0;

    for (value, weight) in pairs {
        seen = true;
        numerator += value * weight;
        denominator += weight;
    }

    if !seen {
        return None;
    }
    if denominator == 0.0 {
        return Some(0.0);
    }
    Some(round2(numerator / denominator))
}

/// Weighted mean of one student's evaluations in one course.
///
/// `None` means nothing has been recorded yet, which is not the same as a zero
/// average.
pub fn course_average(evaluations: &[Evaluation]) -> Option<f64> {
    weighted_mean(evaluations.iter().map(|e| (e.score, e.weight)))
}

/// Credit-weighted mean of course averages.
pub fn overall_average(course_averages: &[CreditedAverage]) -> Option<f64> {
    weighted_mean(course_averages.iter().map(|c| (c.average, c.credits)))
}

/// Groups a student's evaluations by course and averages each group.
pub fn course_averages_for_student(evaluations: &[CourseEvaluation]) -> Vec<CourseAverage> {
    let mut groups: HashMap<Uuid, Vec<&CourseEvaluation>> = HashMap::new();
    for evaluation in evaluations {
        groups.entry(evaluation.course_id).or_default().push(evaluation);
    }

    let mut averages: Vec<CourseAverage> = groups
        .into_values()
        .filter_map(|group| {
            let first = group.first()?;
            let average = weighted_mean(group.iter().map(|e| (e.score, e.weight)))?;
            Some(CourseAverage {
                course_id: first.course_id,
                course_code: first.course_code.clone(),
                course_name: first.course_name.clone(),
                credits: first.credits,
                average,
                total_weight: group.iter().map(|e| e.weight).sum(),
                evaluation_count: group.len(),
            })
        })
        .collect();

    averages.sort_by(|a, b| a.course_code.cmp(&b.course_code));
    averages
}

pub fn credited(averages: &[CourseAverage]) -> Vec<CreditedAverage> {
    averages
        .iter()
        .map(|a| CreditedAverage {
            average: a.average,
            credits: f64::from(a.credits),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeBand {
    VeryGood,
    Good,
    FairlyGood,
    Pass,
    Fail,
}

impl GradeBand {
    pub fn for_score(score: f64) -> GradeBand {
        match score {
            s if s >= 16.0 => GradeBand::VeryGood,
            s if s >= 14.0 => GradeBand::Good,
            s if s >= 12.0 => GradeBand::FairlyGood,
            s if s >= 10.0 => GradeBand::Pass,
            _ => GradeBand::Fail,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GradeBand::VeryGood => "very good",
            GradeBand::Good => "good",
            GradeBand::FairlyGood => "fairly good",
            GradeBand::Pass => "pass",
            GradeBand::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationTypeSummary {
    pub evaluation_type: String,
    pub count: usize,
    pub mean: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeOverview {
    pub total: usize,
    pub mean: Option<f64>,
    pub by_type: Vec<EvaluationTypeSummary>,
    pub distribution: Vec<(GradeBand, usize)>,
}

/// Unweighted statistics over `(evaluation_type, score)` pairs.
pub fn summarize_grades(scores: &[(String, f64)]) -> GradeOverview {
    let mut by_type: HashMap<&str, (usize, f64)> = HashMap::new();
    let mut bands: BTreeMap<GradeBand, usize> = BTreeMap::new();
    let mut total_score = 0.0;

    for (evaluation_type, score) in scores {
        let entry = by_type.entry(evaluation_type.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += score;
        *bands.entry(GradeBand::for_score(*score)).or_insert(0) += 1;
        total_score += score;
    }

    let mut summaries: Vec<EvaluationTypeSummary> = by_type
        .into_iter()
        .map(|(evaluation_type, (count, sum))| EvaluationTypeSummary {
            evaluation_type: evaluation_type.to_string(),
            count,
            mean: round2(sum / count as f64),
        })
        .collect();
    summaries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.evaluation_type.cmp(&b.evaluation_type))
    });

    GradeOverview {
        total: scores.len(),
        mean: (!scores.is_empty()).then(|| round2(total_score / scores.len() as f64)),
        by_type: summaries,
        distribution: bands.into_iter().collect(),
    }
}
