use serde::{Deserialize, Serialize};

use super::{ContentType, CourseId, SkillLevel};

/// A catalog course; read-only to the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub category_id: i64,
    pub content_type: ContentType,
    pub difficulty: SkillLevel,
    pub rating: f64,
    /// Expected hours to complete the course
    pub expected_time: f64,
    /// Free-text description fed to the TF-IDF vectorizer
    pub features: String,
}
