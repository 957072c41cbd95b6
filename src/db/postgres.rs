use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use super::store::{split_tags, Dataset, DatasetStore};
use crate::error::{AppError, AppResult};
use crate::models::{Course, CourseId, Interaction, NewInteraction, Student, StudentId};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the bundled migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, FromRow)]
struct StudentRow {
    student_id: i64,
    full_name: Option<String>,
    skill_level: String,
    interests: Option<String>,
    preferred_categories: Option<String>,
}

#[derive(Debug, FromRow)]
struct CourseRow {
    course_id: i64,
    course_name: String,
    category_id: i64,
    content_type: String,
    difficulty: String,
    rating: f64,
    average_time: f64,
    features: String,
}

#[derive(Debug, FromRow)]
struct EngagementRow {
    id: i64,
    student_id: i64,
    course_id: i64,
    time_spent: f64,
    quiz_score: f64,
    completion_status: f64,
    rating: Option<f64>,
}

/// Missing tables or columns are schema problems, everything else is a database failure
fn classify(table: &str, err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::ColumnNotFound(column) => {
            AppError::Schema(format!("{} is missing column '{}'", table, column))
        }
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some("42703") | Some("42P01")) =>
        {
            AppError::Schema(format!("{}: {}", table, db.message()))
        }
        _ => AppError::Database(err),
    }
}

/// Dataset store over the `students`, `courses` and `engagement` tables
#[derive(Clone)]
pub struct PgDatasetStore {
    pool: PgPool,
}

impl PgDatasetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_students(&self) -> AppResult<Vec<Student>> {
        let rows = sqlx::query_as::<_, StudentRow>(
            "SELECT student_id, full_name, skill_level, interests, preferred_categories \
             FROM students ORDER BY student_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("students", e))?;

        rows.into_iter()
            .map(|row| {
                let skill_level = row.skill_level.parse().map_err(|e: String| {
                    AppError::Schema(format!("students row {}: {}", row.student_id, e))
                })?;
                Ok(Student {
                    id: StudentId(row.student_id),
                    full_name: row.full_name,
                    skill_level,
                    interests: split_tags(row.interests),
                    preferred_categories: split_tags(row.preferred_categories),
                })
            })
            .collect()
    }

    async fn load_courses(&self) -> AppResult<Vec<Course>> {
        let rows = sqlx::query_as::<_, CourseRow>(
            "SELECT course_id, course_name, category_id, content_type, difficulty, rating, \
             average_time, features FROM courses ORDER BY course_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("courses", e))?;

        rows.into_iter()
            .map(|row| {
                let schema_err =
                    |e: String| AppError::Schema(format!("courses row {}: {}", row.course_id, e));
                Ok(Course {
                    id: CourseId(row.course_id),
                    content_type: row.content_type.parse().map_err(schema_err)?,
                    difficulty: row.difficulty.parse().map_err(schema_err)?,
                    name: row.course_name,
                    category_id: row.category_id,
                    rating: row.rating,
                    expected_time: row.average_time,
                    features: row.features,
                })
            })
            .collect()
    }

    async fn load_interactions(&self) -> AppResult<Vec<Interaction>> {
        let rows = sqlx::query_as::<_, EngagementRow>(
            "SELECT id, student_id, course_id, time_spent, quiz_score, completion_status, rating \
             FROM engagement ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify("engagement", e))?;

        rows.into_iter()
            .map(|row| {
                Interaction::try_from(NewInteraction {
                    student_id: Some(StudentId(row.student_id)),
                    course_id: Some(CourseId(row.course_id)),
                    time_spent: Some(row.time_spent),
                    quiz_score: Some(row.quiz_score),
                    completion_status: Some(row.completion_status),
                    rating: row.rating,
                })
                .map_err(|e| AppError::Schema(format!("engagement row {}: {}", row.id, e)))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl DatasetStore for PgDatasetStore {
    async fn load(&self) -> AppResult<Dataset> {
        let (students, courses, interactions) = tokio::try_join!(
            self.load_students(),
            self.load_courses(),
            self.load_interactions()
        )?;

        tracing::info!(
            students = students.len(),
            courses = courses.len(),
            interactions = interactions.len(),
            "Postgres dataset loaded"
        );
        Ok(Dataset {
            students,
            courses,
            interactions,
        })
    }

    async fn append_interaction(&self, record: &Interaction) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO engagement (student_id, course_id, time_spent, quiz_score, completion_status, rating) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.student_id.0)
        .bind(record.course_id.0)
        .bind(record.time_spent)
        .bind(record.quiz_score)
        .bind(record.completion_status)
        .bind(record.rating)
        .execute(&self.pool)
        .await
        .map_err(|e| classify("engagement", e))?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_classified_as_schema_error() {
        let err = classify("courses", sqlx::Error::ColumnNotFound("features".to_string()));
        assert_eq!(err.kind(), "SchemaError");
        assert!(err.to_string().contains("features"));
    }

    #[test]
    fn test_other_failures_stay_database_errors() {
        let err = classify("engagement", sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), "DatabaseError");
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL"]
    async fn test_append_then_load_round_trip() {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/course_recommender".to_string());
        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = PgDatasetStore::new(pool);

        let before = store.load().await.unwrap().interactions.len();
        let record = Interaction {
            student_id: StudentId(1001),
            course_id: CourseId(2001),
            time_spent: 4.0,
            quiz_score: 75.0,
            completion_status: 0.5,
            rating: Some(4.0),
        };
        store.append_interaction(&record).await.unwrap();

        let after = store.load().await.unwrap().interactions;
        assert_eq!(after.len(), before + 1);
        assert_eq!(after.last(), Some(&record));
    }
}
