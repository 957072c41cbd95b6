use serde::{Deserialize, Serialize};

use super::{SkillLevel, StudentId};

/// A registered student as supplied by the dataset store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Student {
    pub id: StudentId,
    #[serde(default)]
    pub full_name: Option<String>,
    pub skill_level: SkillLevel,
    /// Declared interest tags, used to build the cold-start profile
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub preferred_categories: Vec<String>,
}

impl Student {
    /// Text used to vectorize the student's declared interests
    pub fn interest_profile(&self) -> String {
        self.interests.join(" ")
    }

    /// Whether a course of the given difficulty is within reach for this student
    pub fn can_take(&self, difficulty: SkillLevel) -> bool {
        difficulty <= self.skill_level
    }
}
