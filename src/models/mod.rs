use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

pub mod course;
pub mod interaction;
pub mod recommendation;
pub mod student;

pub use course::Course;
pub use interaction::{Interaction, NewInteraction};
pub use recommendation::{
    ContentPerformance, ContentTypeStats, CourseTime, MetricsSnapshot, ModelSource, ModelStatus,
    Reason, Recommendation, RecommendationResponse, Strategy, StudentProgress, TrainingState,
};
pub use student::Student;

/// Stable identifier of a student in the dataset store
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct StudentId(pub i64);

/// Stable identifier of a course in the catalog
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct CourseId(pub i64);

impl Display for StudentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for CourseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordinal level shared by student skill and course difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl FromStr for SkillLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(SkillLevel::Beginner),
            "intermediate" => Ok(SkillLevel::Intermediate),
            "advanced" => Ok(SkillLevel::Advanced),
            other => Err(format!("unknown skill level '{}'", other)),
        }
    }
}

impl Display for SkillLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SkillLevel::Beginner => "beginner",
            SkillLevel::Intermediate => "intermediate",
            SkillLevel::Advanced => "advanced",
        };
        write!(f, "{}", label)
    }
}

/// Delivery format of a course
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContentType {
    Video,
    Interactive,
    #[serde(rename = "Project-based")]
    ProjectBased,
    Text,
    Mixed,
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "video" => Ok(ContentType::Video),
            "interactive" => Ok(ContentType::Interactive),
            "project-based" | "project_based" | "projectbased" => Ok(ContentType::ProjectBased),
            "text" => Ok(ContentType::Text),
            "mixed" => Ok(ContentType::Mixed),
            other => Err(format!("unknown content type '{}'", other)),
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ContentType::Video => "Video",
            ContentType::Interactive => "Interactive",
            ContentType::ProjectBased => "Project-based",
            ContentType::Text => "Text",
            ContentType::Mixed => "Mixed",
        };
        write!(f, "{}", label)
    }
}
