use std::collections::{BTreeMap, HashMap};

use crate::models::{Course, CourseId, Interaction, Reason, Recommendation, Student};
use super::matrix::CourseIndex;

pub const CF_WEIGHT: f64 = 0.6;
pub const CBF_WEIGHT: f64 = 0.4;
/// Maximum relative boost granted by a fully engaged student
pub const ENGAGEMENT_BOOST: f64 = 0.2;

pub const POPULARITY_WEIGHT: f64 = 0.6;
pub const PROFILE_WEIGHT: f64 = 0.4;
const POPULARITY_COUNT_WEIGHT: f64 = 0.6;
const POPULARITY_RATING_WEIGHT: f64 = 0.4;

/// A scored course before it is resolved against the catalog
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub course_id: CourseId,
    pub confidence: f64,
    pub reason: Reason,
}

/// Merges CF and CBF candidates for a student with history
///
/// Each contribution is `score * weight * (1 + 0.2 * engagement)`; a course
/// proposed by both sources gets the sum of its contributions.
pub fn fuse(
    cf: &[(CourseId, f64)],
    cbf: &[(CourseId, f64)],
    engagement: f64,
) -> Vec<Candidate> {
    let boost = 1.0 + ENGAGEMENT_BOOST * engagement.clamp(0.0, 1.0);
    let mut merged: BTreeMap<CourseId, Candidate> = BTreeMap::new();

    let sources = [
        (cf, CF_WEIGHT, Reason::Collaborative),
        (cbf, CBF_WEIGHT, Reason::ContentSimilarity),
    ];
    for (list, weight, reason) in sources {
        for &(course_id, score) in list {
            let contribution = score * weight * boost;
            merged
                .entry(course_id)
                .and_modify(|c| {
                    c.confidence += contribution;
                    if c.reason != reason {
                        c.reason = Reason::Hybrid;
                    }
                })
                .or_insert(Candidate {
                    course_id,
                    confidence: contribution,
                    reason,
                });
        }
    }

    merged.into_values().collect()
}

/// Popularity in [0, 1] from interaction counts and mean explicit ratings
///
/// The count term is relative to the most popular course; the rating term is
/// the mean rating over the 5-point scale.
pub fn popularity(log: &[Interaction]) -> HashMap<CourseId, f64> {
    let mut stats: HashMap<CourseId, (usize, f64, usize)> = HashMap::new();
    for record in log {
        let entry = stats.entry(record.course_id).or_insert((0, 0.0, 0));
        entry.0 += 1;
        if let Some(rating) = record.rating {
            entry.1 += rating;
            entry.2 += 1;
        }
    }

    let max_count = stats.values().map(|s| s.0).max().unwrap_or(0);
    stats
        .into_iter()
        .map(|(course_id, (count, rating_sum, rated))| {
            let count_score = if max_count > 0 {
                count as f64 / max_count as f64
            } else {
                0.0
            };
            let rating_score = if rated > 0 {
                rating_sum / rated as f64 / 5.0
            } else {
                0.0
            };
            (
                course_id,
                POPULARITY_COUNT_WEIGHT * count_score + POPULARITY_RATING_WEIGHT * rating_score,
            )
        })
        .collect()
}

/// Candidates for a student without history: popularity blended with interest
/// similarity, limited to courses at or below the student's skill level
pub fn cold_start(
    student: &Student,
    courses: &[Course],
    profile_scores: &HashMap<CourseId, f64>,
    popularity: &HashMap<CourseId, f64>,
) -> Vec<Candidate> {
    courses
        .iter()
        .filter(|course| student.can_take(course.difficulty))
        .map(|course| {
            let popularity_score = popularity.get(&course.id).copied().unwrap_or(0.0);
            let content_score = profile_scores.get(&course.id).copied().unwrap_or(0.0);
            Candidate {
                course_id: course.id,
                confidence: POPULARITY_WEIGHT * popularity_score + PROFILE_WEIGHT * content_score,
                reason: Reason::InterestsAndPopularity,
            }
        })
        .collect()
}

/// Drops courses outside the index, orders by confidence then course id, and
/// resolves names
pub fn finalize(
    candidates: Vec<Candidate>,
    available: &CourseIndex,
    courses: &[Course],
    n: usize,
) -> Vec<Recommendation> {
    let names: HashMap<CourseId, &str> = courses.iter().map(|c| (c.id, c.name.as_str())).collect();

    let mut kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| available.contains(c.course_id) && c.confidence.is_finite())
        .collect();
    kept.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.course_id.cmp(&b.course_id))
    });

    kept.into_iter()
        .filter_map(|c| {
            names.get(&c.course_id).map(|name| Recommendation {
                course_id: c.course_id,
                course_name: name.to_string(),
                confidence: c.confidence,
                reason: c.reason,
            })
        })
        .take(n)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SkillLevel;
    use crate::services::testing::{course, interaction, student};

    #[test]
    fn test_fuse_weights_and_boost() {
        let fused = fuse(&[(CourseId(1), 4.0)], &[(CourseId(2), 0.5)], 1.0);
        let cf = fused.iter().find(|c| c.course_id == CourseId(1)).unwrap();
        let cbf = fused.iter().find(|c| c.course_id == CourseId(2)).unwrap();

        assert!((cf.confidence - 4.0 * 0.6 * 1.2).abs() < 1e-12);
        assert!((cbf.confidence - 0.5 * 0.4 * 1.2).abs() < 1e-12);
        assert_eq!(cf.reason, Reason::Collaborative);
        assert_eq!(cbf.reason, Reason::ContentSimilarity);
    }

    #[test]
    fn test_fuse_sums_courses_from_both_sources() {
        let fused = fuse(&[(CourseId(1), 3.0)], &[(CourseId(1), 0.5)], 0.0);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].confidence - (3.0 * 0.6 + 0.5 * 0.4)).abs() < 1e-12);
        assert_eq!(fused[0].reason, Reason::Hybrid);
    }

    #[test]
    fn test_engagement_never_penalizes() {
        let low = fuse(&[(CourseId(1), 3.0)], &[], 0.0);
        let high = fuse(&[(CourseId(1), 3.0)], &[], 0.8);
        assert!(high[0].confidence >= low[0].confidence);
    }

    #[test]
    fn test_popularity_blends_count_and_rating() {
        let log = vec![
            interaction(1, 10, Some(5.0)),
            interaction(2, 10, Some(5.0)),
            interaction(3, 11, Some(2.5)),
            interaction(4, 12, None),
        ];
        let scores = popularity(&log);

        assert!((scores[&CourseId(10)] - 1.0).abs() < 1e-12);
        assert!((scores[&CourseId(11)] - (0.6 * 0.5 + 0.4 * 0.5)).abs() < 1e-12);
        assert!((scores[&CourseId(12)] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_cold_start_gates_on_skill_level() {
        let mut advanced = course(3, "c");
        advanced.difficulty = SkillLevel::Advanced;
        let mut intermediate = course(2, "b");
        intermediate.difficulty = SkillLevel::Intermediate;
        let courses = vec![course(1, "a"), intermediate, advanced];
        let learner = student(7, SkillLevel::Intermediate, &["a"]);

        let candidates = cold_start(&learner, &courses, &HashMap::new(), &HashMap::new());
        let ids: Vec<CourseId> = candidates.iter().map(|c| c.course_id).collect();
        assert_eq!(ids, vec![CourseId(1), CourseId(2)]);
        assert!(candidates
            .iter()
            .all(|c| c.reason == Reason::InterestsAndPopularity));
    }

    #[test]
    fn test_cold_start_confidence_formula() {
        let courses = vec![course(1, "a")];
        let learner = student(7, SkillLevel::Beginner, &["a"]);
        let profile = HashMap::from([(CourseId(1), 0.5)]);
        let pop = HashMap::from([(CourseId(1), 0.25)]);

        let candidates = cold_start(&learner, &courses, &profile, &pop);
        assert!((candidates[0].confidence - (0.6 * 0.25 + 0.4 * 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_finalize_filters_sorts_and_truncates() {
        let courses = vec![course(1, "a"), course(2, "b"), course(3, "c")];
        let index = CourseIndex::from_catalog(&courses);
        let candidates = vec![
            Candidate { course_id: CourseId(3), confidence: 0.5, reason: Reason::Collaborative },
            Candidate { course_id: CourseId(9), confidence: 9.0, reason: Reason::Collaborative },
            Candidate { course_id: CourseId(2), confidence: 0.5, reason: Reason::Collaborative },
            Candidate { course_id: CourseId(1), confidence: 0.7, reason: Reason::Collaborative },
        ];

        let recs = finalize(candidates, &index, &courses, 2);
        let ids: Vec<CourseId> = recs.iter().map(|r| r.course_id).collect();
        assert_eq!(ids, vec![CourseId(1), CourseId(2)]);
        assert_eq!(recs[0].course_name, "Course 1");
    }
}
