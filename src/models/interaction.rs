use serde::{Deserialize, Serialize};

use super::{CourseId, StudentId};
use crate::error::AppError;

/// A validated engagement record; the interaction log only ever holds these
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub student_id: StudentId,
    pub course_id: CourseId,
    /// Hours spent, non-negative
    pub time_spent: f64,
    /// Quiz score on the 0-100 scale
    pub quiz_score: f64,
    /// Completion fraction in [0, 1]
    pub completion_status: f64,
    /// Explicit rating in [1, 5], if the student left one
    #[serde(default)]
    pub rating: Option<f64>,
}

/// An interaction as submitted by a caller, before validation
///
/// Every field is optional so that a missing value surfaces as a
/// `ValidationError` instead of a body rejection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NewInteraction {
    pub student_id: Option<StudentId>,
    pub course_id: Option<CourseId>,
    pub time_spent: Option<f64>,
    pub quiz_score: Option<f64>,
    pub completion_status: Option<f64>,
    pub rating: Option<f64>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::Validation(format!("missing required field '{}'", field)))
}

fn in_range(value: f64, field: &str, min: f64, max: f64) -> Result<f64, AppError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(value)
    } else {
        Err(AppError::Validation(format!(
            "'{}' must be within [{}, {}], got {}",
            field, min, max, value
        )))
    }
}

impl TryFrom<NewInteraction> for Interaction {
    type Error = AppError;

    fn try_from(raw: NewInteraction) -> Result<Self, Self::Error> {
        let student_id = required(raw.student_id, "student_id")?;
        let course_id = required(raw.course_id, "course_id")?;
        let time_spent = required(raw.time_spent, "time_spent")?;
        let quiz_score = required(raw.quiz_score, "quiz_score")?;
        let completion_status = required(raw.completion_status, "completion_status")?;

        Ok(Self {
            student_id,
            course_id,
            time_spent: in_range(time_spent, "time_spent", 0.0, f64::MAX)?,
            quiz_score: in_range(quiz_score, "quiz_score", 0.0, 100.0)?,
            completion_status: in_range(completion_status, "completion_status", 0.0, 1.0)?,
            rating: raw
                .rating
                .map(|r| in_range(r, "rating", 1.0, 5.0))
                .transpose()?,
        })
    }
}

impl From<Interaction> for NewInteraction {
    fn from(record: Interaction) -> Self {
        Self {
            student_id: Some(record.student_id),
            course_id: Some(record.course_id),
            time_spent: Some(record.time_spent),
            quiz_score: Some(record.quiz_score),
            completion_status: Some(record.completion_status),
            rating: record.rating,
        }
    }
}
