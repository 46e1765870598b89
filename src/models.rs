use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct StudentRecord {
    pub id: Uuid,
    pub matricule: String,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseRecord {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub credits: i32,
}

/// One graded assessment of a student in a course.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub evaluation_type: String,
    pub score: f64,
    pub weight: f64,
    pub date: NaiveDate,
    pub comment: Option<String>,
}

/// An evaluation joined with the course it belongs to.
#[derive(Debug, Clone)]
pub struct CourseEvaluation {
    pub course_id: Uuid,
    pub course_code: String,
    pub course_name: String,
    pub credits: i32,
    pub score: f64,
    pub weight: f64,
    pub evaluation_type: String,
}

/// Caller-supplied fields for creating or overwriting an evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationInput {
    pub evaluation_type: String,
    pub score: f64,
    pub weight: f64,
    pub date: NaiveDate,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseAverage {
    pub course_id: Uuid,
    pub course_code: String,
    pub course_name: String,
    pub credits: i32,
    pub average: f64,
    pub total_weight: f64,
    pub evaluation_count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct CreditedAverage {
    pub average: f64,
    pub credits: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayOfWeek {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_lowercase();
        DayOfWeek::ALL
            .into_iter()
            .find(|day| day.as_str() == lowered || day.as_str()[..3] == lowered)
            .ok_or_else(|| format!("unknown day of week '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    #[default]
    Lecture,
    Lab,
    Tutorial,
    Exam,
}

impl SessionType {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionType::Lecture => "lecture",
            SessionType::Lab => "lab",
            SessionType::Tutorial => "tutorial",
            SessionType::Exam => "exam",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "lecture" => Ok(SessionType::Lecture),
            "lab" => Ok(SessionType::Lab),
            "tutorial" => Ok(SessionType::Tutorial),
            "exam" => Ok(SessionType::Exam),
            other => Err(format!("unknown session type '{other}'")),
        }
    }
}

/// Time of day as minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes < 24 * 60).then_some(TimeOfDay(minutes))
    }

    pub fn minutes(self) -> u16 {
        self.0
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// Accepts `H:MM` or `HH:MM`, hours 0-23, minutes always two digits.
impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid time '{value}', expected HH:MM");
        let (hours, minutes) = value.trim().split_once(':').ok_or_else(invalid)?;
        let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(hours) || hours.len() > 2 || !all_digits(minutes) || minutes.len() != 2 {
            return Err(invalid());
        }
        let hours: u16 = hours.parse().map_err(|_| invalid())?;
        let minutes: u16 = minutes.parse().map_err(|_| invalid())?;
        if hours >= 24 || minutes >= 60 {
            return Err(invalid());
        }
        Ok(TimeOfDay(hours * 60 + minutes))
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A recurring weekly occupation of a room by a course session.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleSlot {
    pub id: Uuid,
    pub course_id: Uuid,
    pub room: String,
    pub day: DayOfWeek,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub session_type: SessionType,
}

/// The room/day/interval part of a slot, before it has an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotCandidate {
    pub room: String,
    pub day: DayOfWeek,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

#[derive(Debug, Clone)]
pub struct SlotInput {
    pub room: String,
    pub day: DayOfWeek,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub session_type: SessionType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_times_to_minutes() {
        assert_eq!("09:30".parse::<TimeOfDay>().unwrap().minutes(), 570);
        assert_eq!("7:05".parse::<TimeOfDay>().unwrap().minutes(), 425);
        assert_eq!("00:00".parse::<TimeOfDay>().unwrap().minutes(), 0);
        assert_eq!("23:59".parse::<TimeOfDay>().unwrap().minutes(), 1439);
    }

    #[test]
    fn rejects_malformed_times() {
        for value in ["24:00", "12:60", "12:5", "123:00", "noon", "12-30", ":30", "+1:30"] {
            assert!(value.parse::<TimeOfDay>().is_err(), "{value} should not parse");
        }
    }

    #[test]
    fn times_compare_numerically_not_lexically() {
        let nine: TimeOfDay = "9:00".parse().unwrap();
        let ten: TimeOfDay = "10:00".parse().unwrap();
        assert!(nine < ten);
        assert_eq!(nine.to_string(), "09:00");
    }

    #[test]
    fn days_parse_full_and_short_names() {
        assert_eq!("Monday".parse::<DayOfWeek>().unwrap(), DayOfWeek::Monday);
        assert_eq!("thu".parse::<DayOfWeek>().unwrap(), DayOfWeek::Thursday);
        assert!("someday".parse::<DayOfWeek>().is_err());
    }

    #[test]
    fn session_type_defaults_to_lecture() {
        assert_eq!(SessionType::default(), SessionType::Lecture);
        assert_eq!("LAB".parse::<SessionType>().unwrap(), SessionType::Lab);
    }
}
