#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use tracing::{debug, info};

use super::{
    dataset::{Dataset, DatasetError},
    exam::{ExamDefinition, Question},
    ground_truth::{GroundTruth, GroundTruthAnswer},
    rubric::{Rubric, RubricEntry},
};
use crate::{error::LoadError, types::QuestionId};

/// Where the reference documents of a course live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    /// Exam definition (`test.json`).
    exam:         PathBuf,
    /// Grading rubric (`class_resources/grading_rubric.json`).
    rubric:       PathBuf,
    /// Ground-truth answers (`class_resources/ground_truth_answers.json`).
    ground_truth: PathBuf,
    /// Directory holding the CSV datasets (`datasets/`).
    datasets_dir: PathBuf,
}

impl DataLayout {
    /// Standard layout rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            exam:         root.join("test.json"),
            rubric:       root.join("class_resources").join("grading_rubric.json"),
            ground_truth: root.join("class_resources").join("ground_truth_answers.json"),
            datasets_dir: root.join("datasets"),
        }
    }

    /// Exam definition path.
    pub fn exam(&self) -> &Path {
        &self.exam
    }

    /// Rubric path.
    pub fn rubric(&self) -> &Path {
        &self.rubric
    }

    /// Ground-truth path.
    pub fn ground_truth(&self) -> &Path {
        &self.ground_truth
    }

    /// Dataset directory.
    pub fn datasets_dir(&self) -> &Path {
        &self.datasets_dir
    }
}

/// Read-only access to every reference document of a grading run.
///
/// Exam, rubric and ground truth are parsed up front; datasets are parsed on
/// first use and cached, since nothing writes to them during a run.
#[derive(Debug)]
pub struct ReferenceStore {
    /// Directory holding the CSV datasets.
    datasets_dir: PathBuf,
    /// Questions of the exam.
    exam:         ExamDefinition,
    /// Grading rubric.
    rubric:       Rubric,
    /// Ground-truth answers.
    ground_truth: GroundTruth,
    /// Parsed datasets by file name.
    datasets:     RwLock<HashMap<String, Arc<Dataset>>>,
}

impl ReferenceStore {
    /// Assembles a store from already-parsed documents.
    pub fn new(
        datasets_dir: impl Into<PathBuf>,
        exam: ExamDefinition,
        rubric: Rubric,
        ground_truth: GroundTruth,
    ) -> Self {
        Self {
            datasets_dir: datasets_dir.into(),
            exam,
            rubric,
            ground_truth,
            datasets: RwLock::new(HashMap::new()),
        }
    }

    /// Loads the exam, rubric and ground truth described by `layout`.
    pub fn load(layout: DataLayout) -> Result<Self, LoadError> {
        let exam = ExamDefinition::load(layout.exam())?;
        let rubric = Rubric::load(layout.rubric())?;
        let ground_truth = GroundTruth::load(layout.ground_truth())?;
        info!(
            questions = exam.questions().len(),
            rubric_entries = rubric.entries().len(),
            answers = ground_truth.answers().len(),
            "reference data loaded"
        );
        Ok(Self::new(layout.datasets_dir, exam, rubric, ground_truth))
    }

    /// The exam question with this id.
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.exam.question(id)
    }

    /// The rubric entry for this question.
    pub fn rubric_entry(&self, id: &QuestionId) -> Option<&RubricEntry> {
        self.rubric.entry(id)
    }

    /// The ground-truth answer for this question.
    pub fn ground_truth(&self, id: &QuestionId) -> Option<&GroundTruthAnswer> {
        self.ground_truth.answer(id)
    }

    /// The exam definition.
    pub fn exam(&self) -> &ExamDefinition {
        &self.exam
    }

    /// Loads (or returns the cached copy of) a dataset.
    ///
    /// `name` is a file name inside the dataset directory; `.csv` is appended
    /// when it has no extension. Names that try to leave the directory are
    /// treated as unknown.
    pub fn dataset(&self, name: &str) -> Result<Arc<Dataset>, DatasetError> {
        let file_name = normalize_dataset_name(name).ok_or_else(|| self.not_found(name))?;

        if let Some(cached) = self
            .datasets
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&file_name)
        {
            return Ok(Arc::clone(cached));
        }

        let path = self.datasets_dir.join(&file_name);
        if !path.is_file() {
            return Err(self.not_found(name));
        }

        debug!(dataset = %file_name, "parsing dataset");
        let dataset = Arc::new(Dataset::from_path(file_name.clone(), &path)?);
        self.datasets
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(file_name, Arc::clone(&dataset));
        Ok(dataset)
    }

    /// File names of every dataset in the dataset directory, sorted.
    pub fn dataset_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.datasets_dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "csv"))
                    .filter_map(|e| e.file_name().to_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Builds the not-found error listing the available datasets.
    fn not_found(&self, name: &str) -> DatasetError {
        let available = self.dataset_names();
        DatasetError::NotFound {
            name:      name.to_string(),
            available: if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            },
        }
    }
}

/// Turns a requested dataset name into a file name inside the dataset
/// directory, or `None` when the name is not a plain file name.
fn normalize_dataset_name(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return None;
    }
    if Path::new(name).extension().is_some() {
        Some(name.to_string())
    } else {
        Some(format!("{name}.csv"))
    }
}
