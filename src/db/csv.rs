use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use super::store::{split_tags, Dataset, DatasetStore};
use crate::error::{AppError, AppResult};
use crate::models::{Course, CourseId, Interaction, NewInteraction, Student, StudentId};

const STUDENT_COLUMNS: &[&str] = &["student_id", "skill_level", "interests"];
const COURSE_COLUMNS: &[&str] = &[
    "course_id",
    "course_name",
    "category_id",
    "content_type",
    "difficulty",
    "rating",
    "features",
];
const ENGAGEMENT_COLUMNS: &[&str] = &[
    "student_id",
    "course_id",
    "time_spent",
    "quiz_score",
    "completion_status",
    "rating",
];

#[derive(Debug, Deserialize)]
struct StudentRow {
    student_id: i64,
    #[serde(default)]
    full_name: Option<String>,
    skill_level: String,
    #[serde(default)]
    interests: Option<String>,
    #[serde(default, alias = "preferences")]
    preferred_categories: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CourseRow {
    course_id: i64,
    course_name: String,
    category_id: i64,
    content_type: String,
    difficulty: String,
    rating: f64,
    #[serde(alias = "expected_time")]
    average_time: f64,
    features: String,
}

#[derive(Debug, Deserialize)]
struct EngagementRow {
    student_id: i64,
    course_id: i64,
    time_spent: f64,
    quiz_score: f64,
    completion_status: f64,
    #[serde(default)]
    rating: Option<f64>,
}

fn require_columns(file: &str, headers: &StringRecord, required: &[&str]) -> AppResult<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Schema(format!(
            "{} is missing required columns: {}",
            file,
            missing.join(", ")
        )))
    }
}

/// Reads every row of `path` after checking the header for `required` columns
fn read_rows<T: DeserializeOwned>(path: &Path, required: &[&str]) -> AppResult<Vec<T>> {
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_path(path)?;
    let headers = reader.headers()?.clone();
    require_columns(&file, &headers, required)?;

    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

fn student_from_row(row: StudentRow) -> AppResult<Student> {
    let skill_level = row.skill_level.parse().map_err(|e: String| {
        AppError::Schema(format!("students.csv student {}: {}", row.student_id, e))
    })?;
    Ok(Student {
        id: StudentId(row.student_id),
        full_name: row.full_name.filter(|n| !n.is_empty()),
        skill_level,
        interests: split_tags(row.interests),
        preferred_categories: split_tags(row.preferred_categories),
    })
}

fn course_from_row(row: CourseRow) -> AppResult<Course> {
    let schema_err =
        |e: String| AppError::Schema(format!("courses.csv course {}: {}", row.course_id, e));
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
}

fn interaction_from_row(line: usize, row: EngagementRow) -> AppResult<Interaction> {
    Interaction::try_from(NewInteraction {
        student_id: Some(StudentId(row.student_id)),
        course_id: Some(CourseId(row.course_id)),
        time_spent: Some(row.time_spent),
        quiz_score: Some(row.quiz_score),
        completion_status: Some(row.completion_status),
        rating: row.rating,
    })
    .map_err(|e| AppError::Schema(format!("engagement.csv row {}: {}", line, e)))
}

/// Dataset store over `students.csv`, `courses.csv` and `engagement.csv`
#[derive(Debug, Clone)]
pub struct CsvDatasetStore {
    data_dir: PathBuf,
}

impl CsvDatasetStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn students_path(&self) -> PathBuf {
        self.data_dir.join("students.csv")
    }

    fn courses_path(&self) -> PathBuf {
        self.data_dir.join("courses.csv")
    }

    fn engagement_path(&self) -> PathBuf {
        self.data_dir.join("engagement.csv")
    }

    fn load_blocking(&self) -> AppResult<Dataset> {
        let students = read_rows::<StudentRow>(&self.students_path(), STUDENT_COLUMNS)?
            .into_iter()
            .map(student_from_row)
            .collect::<AppResult<Vec<_>>>()?;

        let mut course_columns = COURSE_COLUMNS.to_vec();
        let courses_path = self.courses_path();
        let headers = ReaderBuilder::new()
            .trim(Trim::All)
            .from_path(&courses_path)?
            .headers()?
            .clone();
        if !headers.iter().any(|h| h == "expected_time") {
            course_columns.push("average_time");
        }
        let courses = read_rows::<CourseRow>(&courses_path, &course_columns)?
            .into_iter()
            .map(course_from_row)
            .collect::<AppResult<Vec<_>>>()?;

        let engagement_path = self.engagement_path();
        let interactions = if engagement_path.exists() {
            read_rows::<EngagementRow>(&engagement_path, ENGAGEMENT_COLUMNS)?
                .into_iter()
                .enumerate()
                .map(|(i, row)| interaction_from_row(i + 1, row))
                .collect::<AppResult<Vec<_>>>()?
        } else {
            tracing::warn!(path = %engagement_path.display(), "No engagement log yet, starting empty");
            Vec::new()
        };

        Ok(Dataset {
            students,
            courses,
            interactions,
        })
    }

    fn append_blocking(&self, record: &Interaction) -> AppResult<()> {
        let path = self.engagement_path();
        let is_new = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);

        let columns: Vec<String> = if is_new {
            ENGAGEMENT_COLUMNS.iter().map(|c| c.to_string()).collect()
        } else {
            let mut reader = ReaderBuilder::new().trim(Trim::All).from_path(&path)?;
            let headers = reader.headers()?.clone();
            require_columns("engagement.csv", &headers, ENGAGEMENT_COLUMNS)?;
            headers.iter().map(str::to_string).collect()
        };

        let fields: Vec<String> = columns
            .iter()
            .map(|column| match column.as_str() {
                "student_id" => record.student_id.to_string(),
                "course_id" => record.course_id.to_string(),
                "time_spent" => record.time_spent.to_string(),
                "quiz_score" => record.quiz_score.to_string(),
                "completion_status" => record.completion_status.to_string(),
                "rating" => record.rating.map(|r| r.to_string()).unwrap_or_default(),
                _ => String::new(),
            })
            .collect();

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(&columns)?;
        }
        writer.write_record(&fields)?;
        writer.flush()?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DatasetStore for CsvDatasetStore {
    async fn load(&self) -> AppResult<Dataset> {
        let store = self.clone();
        let dataset = tokio::task::spawn_blocking(move || store.load_blocking())
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;

        tracing::info!(
            students = dataset.students.len(),
            courses = dataset.courses.len(),
            interactions = dataset.interactions.len(),
            dir = %self.data_dir.display(),
            "CSV dataset loaded"
        );
        Ok(dataset)
    }

    async fn append_interaction(&self, record: &Interaction) -> AppResult<()> {
        let store = self.clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || store.append_blocking(&record))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
    }

    fn name(&self) -> &'static str {
        "csv"
    }
}
