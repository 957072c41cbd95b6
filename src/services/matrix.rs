use std::collections::{BTreeMap, BTreeSet};

use crate::models::{Course, CourseId, Interaction, StudentId};

/// Sparse student x course rating matrix derived from the interaction log
///
/// Each cell holds the most recent rating for the pair. Absent cells read as
/// `0.0`, the factorization convention for "unobserved"; use [`RatingMatrix::rating`]
/// when absence has to be told apart from a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatingMatrix {
    rows: BTreeMap<StudentId, BTreeMap<CourseId, f64>>,
}

impl RatingMatrix {
    /// Rebuilds the matrix from the full log; later records win
    pub fn build(log: &[Interaction]) -> Self {
        let mut matrix = Self::default();
        for record in log {
            matrix.insert(record);
        }
        matrix
    }

    /// Applies one appended record. Records without a rating leave the matrix as is.
    pub fn insert(&mut self, record: &Interaction) {
        if let Some(rating) = record.rating {
            self.rows
                .entry(record.student_id)
                .or_default()
                .insert(record.course_id, rating);
        }
    }

    /// Cell value with zero fill
    pub fn get(&self, student: StudentId, course: CourseId) -> f64 {
        self.rating(student, course).unwrap_or(0.0)
    }

    pub fn rating(&self, student: StudentId, course: CourseId) -> Option<f64> {
        self.rows.get(&student)?.get(&course).copied()
    }

    pub fn student_ratings(&self, student: StudentId) -> Option<&BTreeMap<CourseId, f64>> {
        self.rows.get(&student)
    }

    /// Observed cells in (student, course) order
    pub fn observed(&self) -> impl Iterator<Item = (StudentId, CourseId, f64)> + '_ {
        self.rows.iter().flat_map(|(student, row)| {
            row.iter().map(move |(course, rating)| (*student, *course, *rating))
        })
    }

    pub fn observed_count(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.observed_count() == 0
    }

    pub fn students(&self) -> impl Iterator<Item = StudentId> + '_ {
        self.rows.keys().copied()
    }

    /// Every course that has at least one rating
    pub fn courses(&self) -> BTreeSet<CourseId> {
        self.rows
            .values()
            .flat_map(|row| row.keys().copied())
            .collect()
    }
}

/// Set of course identifiers currently present in the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseIndex(BTreeSet<CourseId>);

impl CourseIndex {
    pub fn from_catalog(courses: &[Course]) -> Self {
        Self(courses.iter().map(|c| c.id).collect())
    }

    pub fn contains(&self, course: CourseId) -> bool {
        self.0.contains(&course)
    }

    pub fn iter(&self) -> impl Iterator<Item = CourseId> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{course, interaction};

    #[test]
    fn test_latest_rating_wins() {
        let log = vec![
            interaction(1, 10, Some(2.0)),
            interaction(1, 10, Some(4.5)),
            interaction(2, 10, Some(3.0)),
        ];
        let matrix = RatingMatrix::build(&log);

        assert_eq!(matrix.rating(StudentId(1), CourseId(10)), Some(4.5));
        assert_eq!(matrix.observed_count(), 2);
    }

    #[test]
    fn test_absent_cells_read_as_zero() {
        let matrix = RatingMatrix::build(&[interaction(1, 10, Some(4.0))]);
        assert_eq!(matrix.get(StudentId(1), CourseId(11)), 0.0);
        assert_eq!(matrix.rating(StudentId(1), CourseId(11)), None);
        assert_eq!(matrix.get(StudentId(9), CourseId(10)), 0.0);
    }

    #[test]
    fn test_unrated_records_do_not_create_cells() {
        let matrix = RatingMatrix::build(&[interaction(1, 10, None)]);
        assert!(matrix.is_empty());
        assert!(matrix.student_ratings(StudentId(1)).is_none());
    }

    #[test]
    fn test_incremental_insert_matches_rebuild() {
        let mut log = vec![interaction(1, 10, Some(3.0)), interaction(2, 11, Some(5.0))];
        let mut matrix = RatingMatrix::build(&log);

        let appended = interaction(1, 11, Some(2.0));
        matrix.insert(&appended);
        log.push(appended);

        assert_eq!(matrix, RatingMatrix::build(&log));
    }

    #[test]
    fn test_observed_is_ordered() {
        let log = vec![
            interaction(2, 11, Some(1.0)),
            interaction(1, 12, Some(2.0)),
            interaction(1, 10, Some(3.0)),
        ];
        let cells: Vec<_> = RatingMatrix::build(&log).observed().collect();
        assert_eq!(
            cells,
            vec![
                (StudentId(1), CourseId(10), 3.0),
                (StudentId(1), CourseId(12), 2.0),
                (StudentId(2), CourseId(11), 1.0),
            ]
        );
    }

    #[test]
    fn test_course_index_from_catalog() {
        let index = CourseIndex::from_catalog(&[course(3, "a"), course(1, "b")]);
        assert_eq!(index.len(), 2);
        assert!(index.contains(CourseId(1)));
        assert!(!index.contains(CourseId(2)));
        assert_eq!(index.iter().collect::<Vec<_>>(), vec![CourseId(1), CourseId(3)]);
    }
}
