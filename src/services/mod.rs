use crate::models::CourseId;

pub mod collaborative;
pub mod content;
pub mod engagement;
pub mod engine;
pub mod fusion;
pub mod matrix;
pub mod metrics;
pub mod registry;

pub use engine::{EngineConfig, RecommendationEngine, TrainingReport};
pub use metrics::EngineMetrics;
pub use registry::{ModelRegistry, ModelSet};

/// Sorts by descending score, ties broken by ascending course id, and keeps `n`
pub(crate) fn rank_top_n(mut scored: Vec<(CourseId, f64)>, n: usize) -> Vec<(CourseId, f64)> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(n);
    scored
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::models::{
        ContentType, Course, CourseId, Interaction, SkillLevel, Student, StudentId,
    };

    pub fn course(id: i64, features: &str) -> Course {
        Course {
            id: CourseId(id),
            name: format!("Course {}", id),
            category_id: 1,
            content_type: ContentType::Video,
            difficulty: SkillLevel::Beginner,
            rating: 4.0,
            expected_time: 20.0,
            features: features.to_string(),
        }
    }

    pub fn student(id: i64, level: SkillLevel, interests: &[&str]) -> Student {
        Student {
            id: StudentId(id),
            full_name: None,
            skill_level: level,
            interests: interests.iter().map(|s| s.to_string()).collect(),
            preferred_categories: vec![],
        }
    }

    pub fn interaction(student: i64, course: i64, rating: Option<f64>) -> Interaction {
        Interaction {
            student_id: StudentId(student),
            course_id: CourseId(course),
            time_spent: 5.0,
            quiz_score: 60.0,
            completion_status: 0.5,
            rating,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_breaks_ties_by_course_id() {
        let ranked = rank_top_n(
            vec![
                (CourseId(3), 0.5),
                (CourseId(1), 0.5),
                (CourseId(2), 0.9),
                (CourseId(4), 0.1),
            ],
            3,
        );
        assert_eq!(
            ranked,
            vec![(CourseId(2), 0.9), (CourseId(1), 0.5), (CourseId(3), 0.5)]
        );
    }
}
