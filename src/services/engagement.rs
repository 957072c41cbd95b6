use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use crate::models::{
    ContentPerformance, ContentType, ContentTypeStats, Course, CourseId, CourseTime, Interaction,
    StudentId,
};

const TIME_WEIGHT: f64 = 0.4;
const COMPLETION_WEIGHT: f64 = 0.3;
const QUIZ_WEIGHT: f64 = 0.3;

const RECORD_TIME_WEIGHT: f64 = 0.4;
const RECORD_QUIZ_WEIGHT: f64 = 0.4;
const RECORD_RATING_WEIGHT: f64 = 0.2;

/// The three bounded inputs of a raw engagement score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngagementComponents {
    /// Hours spent over the catalog's total expected hours
    pub time_score: f64,
    pub completion_score: f64,
    /// Mean quiz score scaled to [0, 1]
    pub quiz_score: f64,
}

impl EngagementComponents {
    /// Computes the components from one student's records; `None` without records
    pub fn from_records<'a, I>(records: I, total_expected_time: f64) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Interaction>,
    {
        let mut count = 0usize;
        let mut time = 0.0;
        let mut completion = 0.0;
        let mut quiz = 0.0;
        for record in records {
            count += 1;
            time += record.time_spent;
            completion += record.completion_status;
            quiz += record.quiz_score;
        }
        if count == 0 {
            return None;
        }

        let n = count as f64;
        let time_score = if total_expected_time > 0.0 {
            time / total_expected_time
        } else {
            0.0
        };

        Some(Self {
            time_score: time_score.clamp(0.0, 1.0),
            completion_score: (completion / n).clamp(0.0, 1.0),
            quiz_score: (quiz / n / 100.0).clamp(0.0, 1.0),
        })
    }

    pub fn raw_score(&self) -> f64 {
        TIME_WEIGHT * self.time_score
            + COMPLETION_WEIGHT * self.completion_score
            + QUIZ_WEIGHT * self.quiz_score
    }
}

pub fn total_expected_time(courses: &[Course]) -> f64 {
    courses.iter().map(|c| c.expected_time).sum()
}

/// Raw score of one student; zero when the student has no records
pub fn raw_score(student: StudentId, log: &[Interaction], courses: &[Course]) -> f64 {
    EngagementComponents::from_records(
        log.iter().filter(|r| r.student_id == student),
        total_expected_time(courses),
    )
    .map_or(0.0, |c| c.raw_score())
}

/// Raw scores for every student with at least one record
pub fn population_raw_scores(log: &[Interaction], courses: &[Course]) -> BTreeMap<StudentId, f64> {
    let total = total_expected_time(courses);
    let mut by_student: BTreeMap<StudentId, Vec<&Interaction>> = BTreeMap::new();
    for record in log {
        by_student.entry(record.student_id).or_default().push(record);
    }

    by_student
        .into_iter()
        .filter_map(|(student, records)| {
            EngagementComponents::from_records(records, total).map(|c| (student, c.raw_score()))
        })
        .collect()
}

/// Min-max scaling into [0, 1]; a population with no spread maps to zero
pub fn min_max_normalize(scores: &BTreeMap<StudentId, f64>) -> HashMap<StudentId, f64> {
    let min = scores.values().copied().fold(f64::INFINITY, f64::min);
    let max = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    scores
        .iter()
        .map(|(student, raw)| {
            let normalized = if range > 0.0 { (raw - min) / range } else { 0.0 };
            (*student, normalized.clamp(0.0, 1.0))
        })
        .collect()
}

/// Caches normalized engagement scores for the whole population
///
/// Normalization is relative to every student with records, so one miss
/// fills the cache for all of them and any appended interaction clears it.
#[derive(Debug, Default)]
pub struct EngagementScorer {
    cache: Mutex<HashMap<StudentId, f64>>,
}

impl EngagementScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalized score in [0, 1]; zero for students without records
    pub fn normalized(&self, student: StudentId, log: &[Interaction], courses: &[Course]) -> f64 {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(score) = cache.get(&student) {
            return *score;
        }
        if !log.iter().any(|r| r.student_id == student) {
            return 0.0;
        }

        let population = population_raw_scores(log, courses);
        *cache = min_max_normalize(&population);
        tracing::debug!(population = cache.len(), "Engagement scores recomputed");

        cache.get(&student).copied().unwrap_or(0.0)
    }

    /// Drops every cached score
    pub fn invalidate(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    #[cfg(test)]
    fn cached_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Mean quiz score on the 0-100 scale, zero without records
pub fn quiz_performance(records: &[&Interaction]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| r.quiz_score).sum::<f64>() / records.len() as f64
}

/// Content type with the best mean quiz score; ties go to the first type in catalog order
pub fn preferred_content(
    records: &[&Interaction],
    courses: &HashMap<CourseId, &Course>,
) -> Option<ContentType> {
    let mut by_type: BTreeMap<ContentType, (f64, usize)> = BTreeMap::new();
    for record in records {
        if let Some(course) = courses.get(&record.course_id) {
            let entry = by_type.entry(course.content_type).or_insert((0.0, 0));
            entry.0 += record.quiz_score;
            entry.1 += 1;
        }
    }

    by_type
        .into_iter()
        .map(|(content_type, (sum, n))| (content_type, sum / n as f64))
        .fold(None, |best: Option<(ContentType, f64)>, (ct, mean)| match best {
            Some((_, best_mean)) if best_mean >= mean => best,
            _ => Some((ct, mean)),
        })
        .map(|(ct, _)| ct)
}

/// Number of distinct courses the student fully completed
pub fn completed_courses(records: &[&Interaction]) -> usize {
    records
        .iter()
        .filter(|r| r.completion_status >= 1.0)
        .map(|r| r.course_id)
        .collect::<BTreeSet<_>>()
        .len()
}

/// Engagement of a single record for reporting
///
/// Time is taken relative to `mean_time` across the whole log, so the value
/// is not bounded. Unrated records have no score.
pub fn record_engagement(record: &Interaction, mean_time: f64) -> Option<f64> {
    let rating = record.rating?;
    let time = if mean_time > 0.0 {
        record.time_spent / mean_time
    } else {
        0.0
    };
    Some(
        RECORD_TIME_WEIGHT * time
            + RECORD_QUIZ_WEIGHT * record.quiz_score / 100.0
            + RECORD_RATING_WEIGHT * rating / 5.0,
    )
}

fn mean_of(sum: f64, n: usize) -> Option<f64> {
    (n > 0).then(|| sum / n as f64)
}

/// Mean per-record engagement over the rated records of the log
pub fn average_engagement(log: &[Interaction]) -> Option<f64> {
    let mean_time = mean_of(log.iter().map(|r| r.time_spent).sum(), log.len()).unwrap_or(0.0);
    let scores: Vec<f64> = log
        .iter()
        .filter_map(|r| record_engagement(r, mean_time))
        .collect();
    mean_of(scores.iter().sum(), scores.len())
}

/// Engagement broken down by content type and by course
pub fn content_performance(log: &[Interaction], courses: &[Course]) -> ContentPerformance {
    let catalog: HashMap<CourseId, &Course> = courses.iter().map(|c| (c.id, c)).collect();
    let mean_time = mean_of(log.iter().map(|r| r.time_spent).sum(), log.len()).unwrap_or(0.0);

    #[derive(Default)]
    struct Acc {
        n: usize,
        quiz: f64,
        time: f64,
        completion: f64,
        engagement: f64,
        scored: usize,
    }

    let mut total_engagement = 0.0;
    let mut total_scored = 0;

    let mut by_type: BTreeMap<ContentType, Acc> = BTreeMap::new();
    let mut by_course: BTreeMap<CourseId, (f64, usize)> = BTreeMap::new();
    for record in log {
        let course_entry = by_course.entry(record.course_id).or_insert((0.0, 0));
        course_entry.0 += record.time_spent;
        course_entry.1 += 1;

        let engagement = record_engagement(record, mean_time);
        if let Some(score) = engagement {
            total_engagement += score;
            total_scored += 1;
        }

        if let Some(course) = catalog.get(&record.course_id) {
            let acc = by_type.entry(course.content_type).or_default();
            acc.n += 1;
            acc.quiz += record.quiz_score;
            acc.time += record.time_spent;
            acc.completion += record.completion_status;
            if let Some(score) = engagement {
                acc.engagement += score;
                acc.scored += 1;
            }
        }
    }

    ContentPerformance {
        content_types: by_type
            .into_iter()
            .map(|(content_type, acc)| {
                let n = acc.n as f64;
                ContentTypeStats {
                    content_type,
                    interactions: acc.n,
                    mean_quiz_score: acc.quiz / n,
                    mean_time_spent: acc.time / n,
                    mean_completion: acc.completion / n,
                    mean_engagement_score: mean_of(acc.engagement, acc.scored),
                }
            })
            .collect(),
        course_time: by_course
            .into_iter()
            .map(|(course_id, (time, n))| CourseTime {
                course_id,
                mean_time_spent: time / n as f64,
            })
            .collect(),
        avg_engagement_score: mean_of(total_engagement, total_scored),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{course, interaction};

    fn record(student: i64, course: i64, time: f64, quiz: f64, completion: f64) -> Interaction {
        Interaction {
            time_spent: time,
            quiz_score: quiz,
            completion_status: completion,
            ..interaction(student, course, Some(4.0))
        }
    }

    #[test]
    fn test_single_interaction_scenario() {
        let courses = vec![course(10, "x")];
        let log = vec![record(1, 10, 10.0, 80.0, 1.0)];

        let components = EngagementComponents::from_records(&log, total_expected_time(&courses))
            .unwrap();
        assert!((components.time_score - 0.5).abs() < 1e-12);
        assert!((components.completion_score - 1.0).abs() < 1e-12);
        assert!((components.quiz_score - 0.8).abs() < 1e-12);
        assert!((raw_score(StudentId(1), &log, &courses) - 0.74).abs() < 1e-12);
    }

    #[test]
    fn test_student_without_records_scores_zero() {
        let courses = vec![course(10, "x")];
        let log = vec![record(1, 10, 10.0, 80.0, 1.0)];
        assert_eq!(raw_score(StudentId(2), &log, &courses), 0.0);

        let scorer = EngagementScorer::new();
        assert_eq!(scorer.normalized(StudentId(2), &log, &courses), 0.0);
    }

    #[test]
    fn test_time_component_is_clamped() {
        let courses = vec![course(10, "x")];
        let log = vec![record(1, 10, 500.0, 100.0, 1.0)];
        let components = EngagementComponents::from_records(&log, 20.0).unwrap();
        assert_eq!(components.time_score, 1.0);
        assert!(raw_score(StudentId(1), &log, &courses) <= 1.0);
    }

    #[test]
    fn test_zero_expected_time_does_not_divide_by_zero() {
        let log = vec![record(1, 10, 5.0, 50.0, 0.5)];
        let components = EngagementComponents::from_records(&log, 0.0).unwrap();
        assert_eq!(components.time_score, 0.0);
    }

    #[test]
    fn test_normalization_spans_unit_interval() {
        let courses = vec![course(10, "x"), course(11, "y")];
        let log = vec![
            record(1, 10, 2.0, 20.0, 0.0),
            record(2, 10, 20.0, 60.0, 0.5),
            record(3, 11, 40.0, 100.0, 1.0),
        ];
        let normalized = min_max_normalize(&population_raw_scores(&log, &courses));

        assert_eq!(normalized[&StudentId(1)], 0.0);
        assert_eq!(normalized[&StudentId(3)], 1.0);
        assert!(normalized[&StudentId(2)] > 0.0 && normalized[&StudentId(2)] < 1.0);
    }

    #[test]
    fn test_flat_population_normalizes_to_zero() {
        let courses = vec![course(10, "x")];
        let log = vec![record(1, 10, 5.0, 50.0, 0.5), record(2, 10, 5.0, 50.0, 0.5)];
        let normalized = min_max_normalize(&population_raw_scores(&log, &courses));
        assert!(normalized.values().all(|v| *v == 0.0));
    }

    #[test]
    fn test_other_students_change_normalized_but_not_raw() {
        let courses = vec![course(10, "x")];
        let mut log = vec![record(1, 10, 5.0, 50.0, 0.5), record(2, 10, 1.0, 10.0, 0.0)];
        let scorer = EngagementScorer::new();

        let raw_before = raw_score(StudentId(1), &log, &courses);
        let normalized_before = scorer.normalized(StudentId(1), &log, &courses);

        log.push(record(2, 10, 20.0, 100.0, 1.0));
        scorer.invalidate();

        assert_eq!(raw_score(StudentId(1), &log, &courses), raw_before);
        assert_ne!(scorer.normalized(StudentId(1), &log, &courses), normalized_before);
    }

    #[test]
    fn test_cache_fills_population_and_invalidates() {
        let courses = vec![course(10, "x")];
        let log = vec![record(1, 10, 5.0, 50.0, 0.5), record(2, 10, 1.0, 10.0, 0.0)];
        let scorer = EngagementScorer::new();

        scorer.normalized(StudentId(1), &log, &courses);
        assert_eq!(scorer.cached_len(), 2);

        scorer.invalidate();
        assert_eq!(scorer.cached_len(), 0);
    }

    #[test]
    fn test_progress_helpers() {
        let mut video = course(10, "x");
        video.content_type = ContentType::Video;
        let mut text = course(11, "y");
        text.content_type = ContentType::Text;
        let catalog: HashMap<CourseId, &Course> = [(video.id, &video), (text.id, &text)].into();

        let log = vec![
            record(1, 10, 5.0, 60.0, 1.0),
            record(1, 11, 5.0, 90.0, 0.5),
            record(1, 10, 5.0, 70.0, 1.0),
        ];
        let records: Vec<&Interaction> = log.iter().collect();

        assert!((quiz_performance(&records) - 220.0 / 3.0).abs() < 1e-9);
        assert_eq!(preferred_content(&records, &catalog), Some(ContentType::Text));
        assert_eq!(completed_courses(&records), 1);
        assert_eq!(quiz_performance(&[]), 0.0);
        assert_eq!(preferred_content(&[], &catalog), None);
    }

    #[test]
    fn test_content_performance_groups_by_type() {
        let mut text = course(11, "y");
        text.content_type = ContentType::Text;
        let courses = vec![course(10, "x"), text];
        let log = vec![
            record(1, 10, 4.0, 60.0, 1.0),
            record(2, 10, 6.0, 80.0, 0.0),
            record(1, 11, 3.0, 90.0, 0.5),
        ];

        let perf = content_performance(&log, &courses);
        let video = perf
            .content_types
            .iter()
            .find(|s| s.content_type == ContentType::Video)
            .unwrap();
        assert_eq!(video.interactions, 2);
        assert!((video.mean_quiz_score - 70.0).abs() < 1e-9);
        assert!((video.mean_time_spent - 5.0).abs() < 1e-9);
        assert_eq!(perf.course_time.len(), 2);
        assert_eq!(perf.course_time[0].course_id, CourseId(10));
    }

    #[test]
    fn test_content_performance_reports_engagement() {
        let courses = vec![course(10, "x")];
        let mut unrated = record(2, 10, 2.0, 40.0, 0.0);
        unrated.rating = None;
        // mean time over the log is 4.0
        let log = vec![record(1, 10, 6.0, 80.0, 1.0), unrated];

        let perf = content_performance(&log, &courses);
        // 0.4 * 6/4 + 0.4 * 0.8 + 0.2 * 4/5
        let expected = 0.6 + 0.32 + 0.16;
        let video = &perf.content_types[0];
        assert!((video.mean_engagement_score.unwrap() - expected).abs() < 1e-9);
        assert!((perf.avg_engagement_score.unwrap() - expected).abs() < 1e-9);
        assert_eq!(average_engagement(&log), perf.avg_engagement_score);
    }

    #[test]
    fn test_empty_log_has_no_engagement_average() {
        let perf = content_performance(&[], &[course(10, "x")]);
        assert!(perf.content_types.is_empty());
        assert_eq!(perf.avg_engagement_score, None);
        assert_eq!(average_engagement(&[]), None);
    }
}
