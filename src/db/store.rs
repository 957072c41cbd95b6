use crate::error::AppResult;
use crate::models::{Course, CourseId, Interaction, Student, StudentId};

/// The three tables the engine reads from the dataset store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub students: Vec<Student>,
    pub courses: Vec<Course>,
    /// Append-only interaction log, oldest first
    pub interactions: Vec<Interaction>,
}

impl Dataset {
    pub fn student(&self, id: StudentId) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn course(&self, id: CourseId) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    /// Records of one student in log order
    pub fn interactions_of(&self, id: StudentId) -> Vec<&Interaction> {
        self.interactions
            .iter()
            .filter(|r| r.student_id == id)
            .collect()
    }
}

/// Splits a comma-separated tag column, dropping blanks
pub(crate) fn split_tags(raw: Option<String>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// External collaborator supplying students, courses and the interaction log
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DatasetStore: Send + Sync {
    /// Reads all three tables
    async fn load(&self) -> AppResult<Dataset>;

    /// Durably appends one validated record to the interaction log
    async fn append_interaction(&self, record: &Interaction) -> AppResult<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
