use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hasher;
use xxhash_rust::xxh64::Xxh64;

use super::matrix::CourseIndex;
use super::rank_top_n;
use crate::error::{AppError, AppResult};
use crate::models::{Course, CourseId};

/// English stop words dropped before weighting
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst", "an",
    "and", "another", "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
    "around", "as", "at", "be", "became", "because", "become", "becomes", "been", "before",
    "beforehand", "behind", "being", "below", "beside", "besides", "between", "beyond", "both",
    "but", "by", "can", "cannot", "could", "did", "do", "does", "done", "down", "due", "during",
    "each", "either", "else", "elsewhere", "enough", "etc", "even", "ever", "every", "everyone",
    "everything", "everywhere", "except", "few", "for", "former", "formerly", "from", "further",
    "had", "has", "have", "he", "hence", "her", "here", "hereafter", "hereby", "herein", "hers",
    "herself", "him", "himself", "his", "how", "however", "i", "ie", "if", "in", "indeed",
    "into", "is", "it", "its", "itself", "just", "last", "latter", "least", "less", "many",
    "may", "me", "meanwhile", "might", "more", "moreover", "most", "mostly", "much", "must",
    "my", "myself", "namely", "neither", "never", "nevertheless", "next", "no", "nobody",
    "none", "nor", "not", "nothing", "now", "nowhere", "of", "off", "often", "on", "once",
    "one", "only", "onto", "or", "other", "others", "otherwise", "our", "ours", "ourselves",
    "out", "over", "own", "per", "perhaps", "please", "rather", "same", "seem", "seemed",
    "seeming", "seems", "several", "she", "should", "since", "so", "some", "somehow", "someone",
    "something", "sometime", "sometimes", "somewhere", "still", "such", "than", "that", "the",
    "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "these", "they", "this", "those", "though", "through",
    "throughout", "thru", "thus", "to", "together", "too", "toward", "towards", "under",
    "until", "up", "upon", "us", "very", "via", "was", "we", "well", "were", "what", "whatever",
    "when", "whence", "whenever", "where", "whereas", "whereby", "wherein", "whether", "which",
    "while", "who", "whoever", "whole", "whom", "whose", "why", "will", "with", "within",
    "without", "would", "yet", "you", "your", "yours", "yourself", "yourselves",
];

/// How a student's history is collapsed into one score per candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Mean,
    Max,
}

/// Lowercased word tokens of two or more characters, stop words removed
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2 && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Cosine similarity, defined as zero when either side is a zero vector
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// TF-IDF vectorizer with smoothed idf and L2-normalized output
///
/// Weights follow `tf * (ln((1 + n) / (1 + df)) + 1)` over raw term counts.
/// The vocabulary is kept in lexical order, so fitting is deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TfidfVectorizer {
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn fit<S: AsRef<str>>(documents: &[S]) -> Self {
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        for doc in documents {
            let unique: BTreeSet<String> = tokenize(doc.as_ref()).into_iter().collect();
            for term in unique {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let n_docs = documents.len() as f64;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(document_frequency.len());
        for (idx, (term, df)) in document_frequency.into_iter().enumerate() {
            idf.push(((1.0 + n_docs) / (1.0 + df as f64)).ln() + 1.0);
            vocabulary.insert(term, idx);
        }

        Self { vocabulary, idf }
    }

    /// Dense weight vector for `text`; all zeros when no term is in the vocabulary
    pub fn transform(&self, text: &str) -> Vec<f64> {
        let mut weights = vec![0.0; self.vocabulary.len()];
        for term in tokenize(text) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                weights[idx] += 1.0;
            }
        }

        for (w, idf) in weights.iter_mut().zip(&self.idf) {
            *w *= idf;
        }

        let norm = weights.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            for w in &mut weights {
                *w /= norm;
            }
        }
        weights
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct SimilarityArtifact {
    course_ids: Vec<CourseId>,
    /// Hash of the catalog text the matrix was computed from
    fingerprint: u64,
    values: Vec<Vec<f64>>,
}

/// Pairwise cosine similarity between catalog courses, indexed by course id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "SimilarityArtifact", into = "SimilarityArtifact")]
pub struct SimilarityMatrix {
    artifact: SimilarityArtifact,
    index: HashMap<CourseId, usize>,
}

impl From<SimilarityArtifact> for SimilarityMatrix {
    fn from(artifact: SimilarityArtifact) -> Self {
        let index = artifact
            .course_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();
        Self { artifact, index }
    }
}

impl From<SimilarityMatrix> for SimilarityArtifact {
    fn from(matrix: SimilarityMatrix) -> Self {
        matrix.artifact
    }
}

impl SimilarityMatrix {
    pub fn compute(course_ids: Vec<CourseId>, vectors: &[Vec<f64>], fingerprint: u64) -> Self {
        let values = vectors
            .iter()
            .map(|a| vectors.iter().map(|b| cosine(a, b)).collect())
            .collect();
        SimilarityArtifact {
            course_ids,
            fingerprint,
            values,
        }
        .into()
    }

    pub fn get(&self, a: CourseId, b: CourseId) -> Option<f64> {
        let i = *self.index.get(&a)?;
        let j = *self.index.get(&b)?;
        Some(self.artifact.values[i][j])
    }

    pub fn contains(&self, course: CourseId) -> bool {
        self.index.contains_key(&course)
    }

    pub fn course_ids(&self) -> &[CourseId] {
        &self.artifact.course_ids
    }

    pub fn fingerprint(&self) -> u64 {
        self.artifact.fingerprint
    }
}

/// Stable hash over course ids and feature text, independent of catalog order
pub fn catalog_fingerprint(courses: &[Course]) -> u64 {
    let mut sorted: Vec<&Course> = courses.iter().collect();
    sorted.sort_by_key(|c| c.id);

    let mut hasher = Xxh64::new(0);
    hasher.write_u64(sorted.len() as u64);
    for course in sorted {
        hasher.write_i64(course.id.0);
        hasher.write_u64(course.features.len() as u64);
        hasher.write(course.features.as_bytes());
    }
    hasher.finish()
}

/// Fitted content model: vectorizer, similarity matrix and per-course vectors
#[derive(Debug, Clone, PartialEq)]
pub struct ContentModel {
    vectorizer: TfidfVectorizer,
    similarity: SimilarityMatrix,
    course_vectors: HashMap<CourseId, Vec<f64>>,
}

impl ContentModel {
    /// Fits the vectorizer on the catalog and computes all pairwise similarities
    pub fn fit(courses: &[Course]) -> AppResult<Self> {
        if courses.is_empty() {
            return Err(AppError::InsufficientData(
                "course catalog is empty".to_string(),
            ));
        }

        let mut sorted: Vec<&Course> = courses.iter().collect();
        sorted.sort_by_key(|c| c.id);

        let documents: Vec<&str> = sorted.iter().map(|c| c.features.as_str()).collect();
        let vectorizer = TfidfVectorizer::fit(&documents);
        let vectors: Vec<Vec<f64>> = documents.iter().map(|d| vectorizer.transform(d)).collect();
        let ids: Vec<CourseId> = sorted.iter().map(|c| c.id).collect();

        let similarity = SimilarityMatrix::compute(ids.clone(), &vectors, catalog_fingerprint(courses));
        let course_vectors = ids.into_iter().zip(vectors).collect();

        tracing::info!(
            courses = courses.len(),
            vocabulary = vectorizer.vocabulary_len(),
            "CBF model trained"
        );

        Ok(Self {
            vectorizer,
            similarity,
            course_vectors,
        })
    }

    /// Reassembles a model from persisted parts
    ///
    /// Fails when the similarity matrix was computed from a different catalog.
    pub fn from_parts(
        vectorizer: TfidfVectorizer,
        similarity: SimilarityMatrix,
        courses: &[Course],
    ) -> AppResult<Self> {
        if similarity.fingerprint() != catalog_fingerprint(courses) {
            return Err(AppError::Internal(
                "similarity matrix does not match the current catalog".to_string(),
            ));
        }

        let course_vectors = courses
            .iter()
            .map(|c| (c.id, vectorizer.transform(&c.features)))
            .collect();

        Ok(Self {
            vectorizer,
            similarity,
            course_vectors,
        })
    }

    /// Whether the model was built from exactly this catalog
    pub fn matches_catalog(&self, courses: &[Course]) -> bool {
        self.similarity.fingerprint() == catalog_fingerprint(courses)
    }

    /// Ranks courses by similarity to the ones the student already engaged with
    pub fn top_n_for_history(
        &self,
        history: &[CourseId],
        n: usize,
        aggregation: Aggregation,
        available: &CourseIndex,
    ) -> Vec<(CourseId, f64)> {
        let known: Vec<CourseId> = history
            .iter()
            .copied()
            .filter(|c| self.similarity.contains(*c))
            .collect();
        if known.is_empty() {
            return Vec::new();
        }

        let scored = self
            .similarity
            .course_ids()
            .iter()
            .copied()
            .filter(|c| available.contains(*c) && !history.contains(c))
            .map(|candidate| {
                let sims = known
                    .iter()
                    .filter_map(|seen| self.similarity.get(*seen, candidate));
                let score = match aggregation {
                    Aggregation::Mean => sims.sum::<f64>() / known.len() as f64,
                    Aggregation::Max => sims.fold(0.0, f64::max),
                };
                (candidate, score)
            })
            .collect();

        rank_top_n(scored, n)
    }

    /// Similarity of every course to a free-text profile
    pub fn profile_scores(&self, profile: &str) -> HashMap<CourseId, f64> {
        let profile_vector = self.vectorizer.transform(profile);
        self.course_vectors
            .iter()
            .map(|(id, vector)| (*id, cosine(&profile_vector, vector)))
            .collect()
    }

    pub fn vectorizer(&self) -> &TfidfVectorizer {
        &self.vectorizer
    }

    pub fn similarity(&self) -> &SimilarityMatrix {
        &self.similarity
    }
}
