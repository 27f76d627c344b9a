use include_dir::{include_dir, Dir};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::ServiceError;
use crate::services::{Exercise, ExerciseProvider, Question, QuestionKind, ServiceResult};

static EXERCISE_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/exercises");

/// A question together with its answer key. Only the grader sees the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradedQuestion {
    pub id: String,
    pub text: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
    pub correct_answer: String,
}

impl GradedQuestion {
    pub fn public(&self) -> Question {
        Question {
            id: self.id.clone(),
            text: self.text.clone(),
            kind: self.kind.clone(),
        }
    }

    /// Case-insensitive, whitespace-trimmed comparison.
    pub fn is_correct(&self, answer: &str) -> bool {
        answer.trim().to_lowercase() == self.correct_answer.trim().to_lowercase()
    }
}

/// On-disk exercise format: the text plus its graded questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseEntry {
    pub id: String,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub ranked: bool,
    #[serde(default)]
    pub questions: Vec<GradedQuestion>,
}

impl ExerciseEntry {
    pub fn exercise(&self) -> Exercise {
        Exercise {
            id: self.id.clone(),
            title: self.title.clone(),
            text: self.text.clone(),
            ranked: self.ranked,
            question_count: self.questions.len(),
        }
    }

    /// Rejects entries the grader could not score unambiguously.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.ranked && self.questions.is_empty() {
            return Err(ServiceError::Unavailable(format!(
                "ranked exercise {} has no questions",
                self.id
            )));
        }
        if let Some(dup) = self.questions.iter().map(|q| q.id.as_str()).duplicates().next() {
            return Err(ServiceError::Unavailable(format!(
                "exercise {} repeats question id {dup}",
                self.id
            )));
        }
        let empty_choice = self.questions.iter().find(
            |q| matches!(&q.kind, QuestionKind::Choice { options } if options.is_empty()),
        );
        if let Some(q) = empty_choice {
            return Err(ServiceError::Unavailable(format!(
                "question {} of exercise {} has no options",
                q.id, self.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Library {
    entries: BTreeMap<String, ExerciseEntry>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exercises compiled into the binary.
    pub fn bundled() -> ServiceResult<Self> {
        let mut library = Self::new();
        for file in EXERCISE_DIR.files() {
            if file.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = file.contents_utf8().ok_or_else(|| {
                ServiceError::Unavailable(format!("{} is not valid UTF-8", file.path().display()))
            })?;
            let entry: ExerciseEntry = serde_json::from_str(raw)?;
            entry.validate()?;
            library.insert(entry);
        }
        debug!(count = library.len(), "loaded bundled exercises");
        Ok(library)
    }

    /// Adds an exercise from a JSON file, returning its id.
    pub fn load_file(&mut self, path: &Path) -> ServiceResult<String> {
        let raw = std::fs::read_to_string(path)?;
        let entry: ExerciseEntry = serde_json::from_str(&raw)?;
        entry.validate()?;
        let id = entry.id.clone();
        debug!(id, path = %path.display(), "loaded exercise file");
        self.insert(entry);
        Ok(id)
    }

    pub fn insert(&mut self, entry: ExerciseEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ExerciseEntry> {
        self.entries.values()
    }

    pub fn entry(&self, id: &str) -> ServiceResult<&ExerciseEntry> {
        self.entries
            .get(id)
            .ok_or_else(|| ServiceError::NotFound { id: id.to_string() })
    }
}

impl ExerciseProvider for Library {
    fn exercise(&self, id: &str) -> ServiceResult<Exercise> {
        self.entry(id).map(ExerciseEntry::exercise)
    }

    fn questions(&self, id: &str) -> ServiceResult<Vec<Question>> {
        Ok(self
            .entry(id)?
            .questions
            .iter()
            .map(GradedQuestion::public)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn bundled_exercises_parse() {
        let library = Library::bundled().unwrap();
        assert!(library.len() >= 3);

        let warmup = library.exercise("warmup").unwrap();
        assert!(!warmup.ranked);
        assert_eq!(warmup.question_count, 0);

        let lighthouse = library.exercise("lighthouse").unwrap();
        assert!(lighthouse.ranked);
        assert_eq!(lighthouse.question_count, 5);
    }

    #[test]
    fn questions_are_served_without_answer_key() {
        let library = Library::bundled().unwrap();
        let questions = library.questions("lighthouse").unwrap();
        assert_eq!(questions.len(), 5);
        let json = serde_json::to_string(&questions).unwrap();
        assert!(!json.contains("correct_answer"));
        assert!(matches!(questions[3].kind, QuestionKind::Open));
    }

    #[test]
    fn unknown_exercise_is_not_found() {
        let library = Library::bundled().unwrap();
        assert!(matches!(
            library.exercise("nope"),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[test]
    fn grading_ignores_case_and_padding() {
        let q = GradedQuestion {
            id: "q".into(),
            text: "?".into(),
            kind: QuestionKind::Open,
            correct_answer: "Spring tides".into(),
        };
        assert!(q.is_correct("  spring TIDES "));
        assert!(!q.is_correct("neap tides"));
    }

    #[test]
    fn load_file_adds_exercise() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"id":"custom","title":"Mine","text":"one two three","questions":[]}}"#
        )
        .unwrap();

        let mut library = Library::new();
        let id = library.load_file(file.path()).unwrap();
        assert_eq!(id, "custom");
        assert_eq!(library.exercise("custom").unwrap().text, "one two three");
    }

    #[test]
    fn load_file_rejects_repeated_question_ids() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"id":"dup","title":"Dup","text":"a b","questions":[
                {{"id":"q1","text":"?","question_type":"open","correct_answer":"a"}},
                {{"id":"q1","text":"?","question_type":"open","correct_answer":"b"}}]}}"#
        )
        .unwrap();
        let mut library = Library::new();
        let err = library.load_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("repeats question id q1"), "{err}");
        assert!(library.is_empty());
    }

    #[test]
    fn load_file_rejects_ranked_exercise_without_questions() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"id":"r","title":"R","text":"a b c","ranked":true,"questions":[]}}"#
        )
        .unwrap();
        let mut library = Library::new();
        let err = library.load_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("ranked exercise r has no questions"), "{err}");
        assert!(library.is_empty());
    }

    #[test]
    fn load_file_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let mut library = Library::new();
        assert!(matches!(
            library.load_file(file.path()),
            Err(ServiceError::Json(_))
        ));
    }
}
