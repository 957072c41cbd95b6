use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::matrix::{CourseIndex, RatingMatrix};
use super::rank_top_n;
use crate::error::{AppError, AppResult};
use crate::models::{CourseId, StudentId};

/// Hyper-parameters of the latent factor model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CfParams {
    pub factors: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub regularization: f64,
    /// Standard deviation of the initial factor values
    pub init_std: f64,
    pub seed: u64,
    /// Fraction of observed ratings kept out of training for validation
    pub holdout_fraction: f64,
}

impl Default for CfParams {
    fn default() -> Self {
        Self {
            factors: 100,
            epochs: 20,
            learning_rate: 0.005,
            regularization: 0.02,
            init_std: 0.1,
            seed: 42,
            holdout_fraction: 0.2,
        }
    }
}

/// Serialized form of [`CfModel`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct CfArtifact {
    params: CfParams,
    global_mean: f64,
    students: Vec<StudentId>,
    courses: Vec<CourseId>,
    student_bias: Vec<f64>,
    course_bias: Vec<f64>,
    student_factors: Vec<Vec<f64>>,
    course_factors: Vec<Vec<f64>>,
    validation_rmse: Option<f64>,
}

/// Biased matrix factorization fitted with stochastic gradient descent
///
/// Prediction for a (student, course) pair is
/// `mean + b_student + b_course + p_student . q_course`; components unknown to
/// the model contribute zero, so unseen pairs fall back to the baseline. Scores
/// are not clipped to the rating scale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "CfArtifact", into = "CfArtifact")]
pub struct CfModel {
    artifact: CfArtifact,
    student_index: HashMap<StudentId, usize>,
    course_index: HashMap<CourseId, usize>,
}

impl From<CfArtifact> for CfModel {
    fn from(artifact: CfArtifact) -> Self {
        let student_index = artifact
            .students
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();
        let course_index = artifact
            .courses
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();
        Self {
            artifact,
            student_index,
            course_index,
        }
    }
}

impl From<CfModel> for CfArtifact {
    fn from(model: CfModel) -> Self {
        model.artifact
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl CfModel {
    /// Fits the model on every observed cell of the matrix
    ///
    /// A seeded shuffle splits off the holdout set, so the same matrix and
    /// parameters always produce the same model.
    pub fn train(matrix: &RatingMatrix, params: CfParams) -> AppResult<Self> {
        if matrix.is_empty() {
            return Err(AppError::InsufficientData(
                "rating matrix has no observed ratings".to_string(),
            ));
        }

        let students: Vec<StudentId> = matrix.students().collect();
        let courses: Vec<CourseId> = matrix.courses().into_iter().collect();
        let student_pos: HashMap<StudentId, usize> =
            students.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let course_pos: HashMap<CourseId, usize> =
            courses.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut cells: Vec<(usize, usize, f64)> = matrix
            .observed()
            .map(|(s, c, r)| (student_pos[&s], course_pos[&c], r))
            .collect();

        let mut rng = StdRng::seed_from_u64(params.seed);
        cells.shuffle(&mut rng);

        let fraction = params.holdout_fraction.clamp(0.0, 1.0);
        let mut holdout_len = (cells.len() as f64 * fraction).floor() as usize;
        if holdout_len >= cells.len() {
            holdout_len = 0;
        }
        let (holdout, train) = cells.split_at(holdout_len);

        let normal = Normal::new(0.0, params.init_std)
            .map_err(|e| AppError::Internal(format!("invalid CF init_std: {}", e)))?;
        let global_mean = train.iter().map(|(_, _, r)| r).sum::<f64>() / train.len() as f64;
        let mut student_bias = vec![0.0; students.len()];
        let mut course_bias = vec![0.0; courses.len()];
        let mut student_factors: Vec<Vec<f64>> = (0..students.len())
            .map(|_| (0..params.factors).map(|_| rng.sample(normal)).collect())
            .collect();
        let mut course_factors: Vec<Vec<f64>> = (0..courses.len())
            .map(|_| (0..params.factors).map(|_| rng.sample(normal)).collect())
            .collect();

        let lr = params.learning_rate;
        let reg = params.regularization;
        for _ in 0..params.epochs {
            for &(u, i, rating) in train {
                let predicted = global_mean
                    + student_bias[u]
                    + course_bias[i]
                    + dot(&student_factors[u], &course_factors[i]);
                let err = rating - predicted;

                student_bias[u] += lr * (err - reg * student_bias[u]);
                course_bias[i] += lr * (err - reg * course_bias[i]);

                for f in 0..params.factors {
                    let pu = student_factors[u][f];
                    let qi = course_factors[i][f];
                    student_factors[u][f] += lr * (err * qi - reg * pu);
                    course_factors[i][f] += lr * (err * pu - reg * qi);
                }
            }
        }

        let validation_rmse = if holdout.is_empty() {
            None
        } else {
            let sse: f64 = holdout
                .iter()
                .map(|&(u, i, rating)| {
                    let predicted = global_mean
                        + student_bias[u]
                        + course_bias[i]
                        + dot(&student_factors[u], &course_factors[i]);
                    (rating - predicted).powi(2)
                })
                .sum();
            Some((sse / holdout.len() as f64).sqrt())
        };

        tracing::info!(
            students = students.len(),
            courses = courses.len(),
            train_ratings = train.len(),
            holdout_ratings = holdout.len(),
            validation_rmse = ?validation_rmse,
            "CF model trained"
        );

        Ok(CfArtifact {
            params,
            global_mean,
            students,
            courses,
            student_bias,
            course_bias,
            student_factors,
            course_factors,
            validation_rmse,
        }
        .into())
    }

    pub fn predict(&self, student: StudentId, course: CourseId) -> f64 {
        let a = &self.artifact;
        let u = self.student_index.get(&student).copied();
        let i = self.course_index.get(&course).copied();

        let mut score = a.global_mean;
        if let Some(u) = u {
            score += a.student_bias[u];
        }
        if let Some(i) = i {
            score += a.course_bias[i];
        }
        if let (Some(u), Some(i)) = (u, i) {
            score += dot(&a.student_factors[u], &a.course_factors[i]);
        }
        score
    }

    /// Best `n` courses for a student among the available ones
    ///
    /// Courses the student already rated at or above `exclude_rated_at_least`
    /// are skipped.
    pub fn top_n(
        &self,
        student: StudentId,
        n: usize,
        available: &CourseIndex,
        rated: Option<&BTreeMap<CourseId, f64>>,
        exclude_rated_at_least: f64,
    ) -> Vec<(CourseId, f64)> {
        let scored = available
            .iter()
            .filter(|course| {
                rated
                    .and_then(|r| r.get(course))
                    .map_or(true, |rating| *rating < exclude_rated_at_least)
            })
            .map(|course| (course, self.predict(student, course)))
            .collect();
        rank_top_n(scored, n)
    }

    pub fn validation_rmse(&self) -> Option<f64> {
        self.artifact.validation_rmse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{course, interaction};

    fn small_params() -> CfParams {
        CfParams {
            factors: 4,
            epochs: 200,
            learning_rate: 0.02,
            holdout_fraction: 0.0,
            ..CfParams::default()
        }
    }

    fn sample_matrix() -> RatingMatrix {
        RatingMatrix::build(&[
            interaction(1, 10, Some(5.0)),
            interaction(1, 11, Some(1.0)),
            interaction(2, 10, Some(5.0)),
            interaction(2, 11, Some(1.0)),
            interaction(2, 12, Some(5.0)),
            interaction(3, 11, Some(1.0)),
            interaction(3, 12, Some(4.0)),
        ])
    }

    #[test]
    fn test_empty_matrix_is_insufficient() {
        let err = CfModel::train(&RatingMatrix::default(), small_params()).unwrap_err();
        assert_eq!(err.kind(), "InsufficientDataError");
    }

    #[test]
    fn test_negative_init_std_is_rejected() {
        let params = CfParams {
            init_std: -0.1,
            ..small_params()
        };
        let err = CfModel::train(&sample_matrix(), params).unwrap_err();
        assert_eq!(err.kind(), "InternalError");
        assert!(err.to_string().contains("init_std"));
    }

    #[test]
    fn test_initial_factors_follow_init_std() {
        let params = CfParams {
            factors: 50,
            epochs: 0,
            init_std: 0.1,
            ..small_params()
        };
        let model = CfModel::train(&sample_matrix(), params).unwrap();
        let values: Vec<f64> = model
            .artifact
            .student_factors
            .iter()
            .chain(&model.artifact.course_factors)
            .flatten()
            .copied()
            .collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt();

        assert!(mean.abs() < 0.05);
        assert!((std - 0.1).abs() < 0.03);
    }

    #[test]
    fn test_fit_orders_liked_above_disliked() {
        let model = CfModel::train(&sample_matrix(), small_params()).unwrap();
        assert!(model.predict(StudentId(1), CourseId(10)) > model.predict(StudentId(1), CourseId(11)));
    }

    #[test]
    fn test_training_is_deterministic_for_a_seed() {
        let a = CfModel::train(&sample_matrix(), small_params()).unwrap();
        let b = CfModel::train(&sample_matrix(), small_params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_pairs_fall_back_to_baseline() {
        let model = CfModel::train(&sample_matrix(), small_params()).unwrap();
        let score = model.predict(StudentId(99), CourseId(99));
        assert!((score - model.artifact.global_mean).abs() < 1e-12);
    }

    #[test]
    fn test_top_n_excludes_top_rated_and_respects_index() {
        let matrix = sample_matrix();
        let model = CfModel::train(&matrix, small_params()).unwrap();
        let index = CourseIndex::from_catalog(&[course(10, ""), course(11, ""), course(13, "")]);

        let top = model.top_n(StudentId(1), 5, &index, matrix.student_ratings(StudentId(1)), 5.0);
        let ids: Vec<CourseId> = top.iter().map(|(c, _)| *c).collect();

        assert!(!ids.contains(&CourseId(10)));
        assert!(!ids.contains(&CourseId(12)));
        assert!(ids.contains(&CourseId(11)));
        assert!(ids.contains(&CourseId(13)));
    }

    #[test]
    fn test_holdout_produces_validation_rmse() {
        let params = CfParams {
            holdout_fraction: 0.3,
            ..small_params()
        };
        let model = CfModel::train(&sample_matrix(), params).unwrap();
        assert!(model.validation_rmse().is_some());
    }

    #[test]
    fn test_single_rating_is_never_fully_held_out() {
        let matrix = RatingMatrix::build(&[interaction(1, 10, Some(3.0))]);
        let params = CfParams {
            holdout_fraction: 1.0,
            ..small_params()
        };
        let model = CfModel::train(&matrix, params).unwrap();
        assert!(model.validation_rmse().is_none());
    }

    #[test]
    fn test_serde_round_trip_preserves_predictions() {
        let model = CfModel::train(&sample_matrix(), small_params()).unwrap();
        let json = serde_json::to_vec(&model).unwrap();
        let restored: CfModel = serde_json::from_slice(&json).unwrap();

        assert_eq!(restored, model);
        assert_eq!(
            restored.predict(StudentId(3), CourseId(10)),
            model.predict(StudentId(3), CourseId(10))
        );
    }
}
