//! Read-only passage store loaded from a prepared snapshot.
//!
//! The snapshot is produced offline by the corpus-preparation scripts. This
//! module only validates and holds it; nothing here mutates a `Corpus` after
//! `load` returns.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::CorpusLoadError;
use crate::vector_math::l2_norm;

/// One passage with its precomputed embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassageRecord {
    /// Stable identifier; generated from the position when the snapshot omits it.
    #[serde(default)]
    pub id: String,
    /// The verbatim chunk content.
    #[serde(alias = "content")]
    pub text: String,
    /// Primary person the passage is about, if the preparation step found one.
    #[serde(default, alias = "wife_name")]
    pub entity: Option<String>,
    /// Biography section heading the chunk came from.
    #[serde(default)]
    pub section: Option<String>,
    /// Alternate name forms referenced in the chunk.
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(alias = "chunk_embeddings")]
    pub embedding: Vec<f32>,
}

impl PassageRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            entity: None,
            section: None,
            aliases: Vec::new(),
            embedding,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    /// Normalized alias set, entity name included.
    pub fn alias_keys(&self) -> BTreeSet<String> {
        self.entity
            .iter()
            .chain(self.aliases.iter())
            .map(|alias| normalize_alias(alias))
            .filter(|alias| !alias.is_empty())
            .collect()
    }
}

/// Case- and whitespace-insensitive key used for alias comparisons.
pub fn normalize_alias(alias: &str) -> String {
    alias
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Wrapped(Snapshot),
    Bare(Vec<PassageRecord>),
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(default)]
    embedding_model: Option<String>,
    #[serde(default)]
    dimension: Option<usize>,
    records: Vec<PassageRecord>,
}

/// All passages, immutable after load and shared across requests.
#[derive(Debug, Clone)]
pub struct Corpus {
    records: Vec<PassageRecord>,
    dimension: usize,
    embedding_model: Option<String>,
}

impl Corpus {
    /// Loads and validates a snapshot file.
    pub fn load(path: &Path) -> Result<Self, CorpusLoadError> {
        Self::load_with_expected_dimension(path, None)
    }

    /// Like `load`, additionally requiring a specific vector dimensionality.
    pub fn load_with_expected_dimension(
        path: &Path,
        expected_dimension: Option<usize>,
    ) -> Result<Self, CorpusLoadError> {
        if !path.exists() {
            return Err(CorpusLoadError::Missing(path.to_path_buf()));
        }

        let contents = fs::read(path).map_err(|source| CorpusLoadError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: SnapshotFile =
            serde_json::from_slice(&contents).map_err(|source| CorpusLoadError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        let (records, declared, embedding_model) = match snapshot {
            SnapshotFile::Wrapped(snapshot) => {
                (snapshot.records, snapshot.dimension, snapshot.embedding_model)
            }
            SnapshotFile::Bare(records) => (records, None, None),
        };

        let corpus = Self::build(records, declared, embedding_model)?;
        if let Some(expected) = expected_dimension {
            if expected != corpus.dimension() {
                return Err(CorpusLoadError::EmbedderMismatch {
                    corpus: corpus.dimension(),
                    embedder: expected,
                });
            }
        }

        tracing::info!(
            "Loaded corpus from {}: {} passages, dimension {}",
            path.display(),
            corpus.size(),
            corpus.dimension()
        );
        Ok(corpus)
    }

    /// Builds a corpus from in-memory records with the same checks as `load`.
    pub fn from_records(records: Vec<PassageRecord>) -> Result<Self, CorpusLoadError> {
        Self::build(records, None, None)
    }

    fn build(
        mut records: Vec<PassageRecord>,
        declared_dimension: Option<usize>,
        embedding_model: Option<String>,
    ) -> Result<Self, CorpusLoadError> {
        let first = records.first().ok_or(CorpusLoadError::Empty)?;
        let dimension = first.embedding.len();

        for (index, record) in records.iter_mut().enumerate() {
            if record.embedding.is_empty() {
                return Err(CorpusLoadError::EmptyEmbedding { index });
            }
            if record.embedding.len() != dimension {
                return Err(CorpusLoadError::DimensionMismatch {
                    index,
                    expected: dimension,
                    found: record.embedding.len(),
                });
            }
            if record.embedding.iter().any(|v| !v.is_finite()) {
                return Err(CorpusLoadError::NonFiniteEmbedding { index });
            }
            if record.id.trim().is_empty() {
                record.id = format!("passage-{}", index);
            }
        }

        if let Some(declared) = declared_dimension {
            if declared != dimension {
                return Err(CorpusLoadError::DeclaredDimensionMismatch {
                    declared,
                    found: dimension,
                });
            }
        }

        let degenerate = records
            .iter()
            .filter(|record| l2_norm(&record.embedding) <= f32::EPSILON)
            .count();
        if degenerate > 0 {
            tracing::warn!(
                "Corpus contains {} passage(s) with a zero-magnitude embedding; they always score 0",
                degenerate
            );
        }

        let duplicates = count_duplicate_texts(&records);
        if duplicates > 0 {
            tracing::warn!(
                "Corpus contains {} passage(s) whose text duplicates an earlier passage",
                duplicates
            );
        }

        Ok(Self {
            records,
            dimension,
            embedding_model,
        })
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embedding_model(&self) -> Option<&str> {
        self.embedding_model.as_deref()
    }

    pub fn records(&self) -> &[PassageRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&PassageRecord> {
        self.records.get(index)
    }
}

fn count_duplicate_texts(records: &[PassageRecord]) -> usize {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for record in records {
        *seen.entry(record.text.trim()).or_default() += 1;
    }
    seen.values().map(|count| count - 1).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_snapshot(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(contents.as_bytes()).expect("write snapshot");
        file
    }

    #[test]
    fn loads_wrapped_snapshot() {
        let file = write_snapshot(
            r#"{
                "embedding_model": "bge-m3",
                "dimension": 3,
                "records": [
                    {"id": "a", "text": "Umm Habibah was Ramlah bint Abi Sufyan.",
                     "entity": "Umm Habibah Ramlah Bint Abu Sufyan",
                     "aliases": ["Ramlah"], "embedding": [1.0, 0.0, 0.0]},
                    {"text": "Zaynab bint Jahsh was a cousin.", "embedding": [0.0, 1.0, 0.0]}
                ]
            }"#,
        );

        let corpus = Corpus::load(file.path()).expect("snapshot should load");

        assert_eq!(corpus.size(), 2);
        assert_eq!(corpus.dimension(), 3);
        assert_eq!(corpus.embedding_model(), Some("bge-m3"));
        assert_eq!(corpus.records()[1].id, "passage-1");
        assert!(corpus.records()[0]
            .alias_keys()
            .contains("umm habibah ramlah bint abu sufyan"));
    }

    #[test]
    fn loads_bare_record_array_with_preparation_field_names() {
        let file = write_snapshot(
            r#"[
                {"wife_name": "Sawdah Bint Zam'ah", "section": "Her Marriage",
                 "content": "Sawdah married the Prophet after Khadijah.",
                 "aliases": [], "chunk_embeddings": [0.5, 0.5]}
            ]"#,
        );

        let corpus = Corpus::load(file.path()).expect("bare array should load");
        let record = &corpus.records()[0];

        assert_eq!(record.entity.as_deref(), Some("Sawdah Bint Zam'ah"));
        assert_eq!(record.section.as_deref(), Some("Her Marriage"));
        assert_eq!(record.text, "Sawdah married the Prophet after Khadijah.");
    }

    #[test]
    fn missing_snapshot_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Corpus::load(&dir.path().join("absent.json")).expect_err("missing");
        assert!(matches!(err, CorpusLoadError::Missing(_)));
    }

    #[test]
    fn unreadable_snapshot_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Corpus::load(dir.path()).expect_err("directory is not a snapshot");
        assert!(matches!(err, CorpusLoadError::Unreadable { .. }));
    }

    #[test]
    fn malformed_snapshot_is_reported() {
        let file = write_snapshot("{ not json");
        let err = Corpus::load(file.path()).expect_err("malformed");
        assert!(matches!(err, CorpusLoadError::Malformed { .. }));
    }

    #[test]
    fn inconsistent_dimensions_fail_the_load() {
        let file = write_snapshot(
            r#"[
                {"text": "a", "embedding": [1.0, 0.0]},
                {"text": "b", "embedding": [1.0, 0.0, 0.0]}
            ]"#,
        );

        let err = Corpus::load(file.path()).expect_err("dimension mismatch");
        assert!(matches!(
            err,
            CorpusLoadError::DimensionMismatch {
                index: 1,
                expected: 2,
                found: 3
            }
        ));
    }

    #[test]
    fn declared_dimension_must_match_records() {
        let file = write_snapshot(r#"{"dimension": 4, "records": [{"text": "a", "embedding": [1.0, 0.0]}]}"#);
        let err = Corpus::load(file.path()).expect_err("declared mismatch");
        assert!(matches!(
            err,
            CorpusLoadError::DeclaredDimensionMismatch { declared: 4, found: 2 }
        ));
    }

    #[test]
    fn expected_dimension_is_enforced() {
        let file = write_snapshot(r#"[{"text": "a", "embedding": [1.0, 0.0]}]"#);
        let err = Corpus::load_with_expected_dimension(file.path(), Some(1024))
            .expect_err("expected dimension mismatch");
        assert!(matches!(
            err,
            CorpusLoadError::EmbedderMismatch {
                corpus: 2,
                embedder: 1024
            }
        ));
    }

    #[test]
    fn empty_corpus_is_rejected() {
        let file = write_snapshot(r#"{"records": []}"#);
        assert!(matches!(
            Corpus::load(file.path()),
            Err(CorpusLoadError::Empty)
        ));
    }

    #[test]
    fn empty_embedding_is_rejected() {
        let err = Corpus::from_records(vec![PassageRecord::new("a", "text", vec![])])
            .expect_err("empty vector");
        assert!(matches!(err, CorpusLoadError::EmptyEmbedding { index: 0 }));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let err = Corpus::from_records(vec![
            PassageRecord::new("a", "one", vec![1.0, 0.0]),
            PassageRecord::new("b", "two", vec![f32::NAN, 0.0]),
        ])
        .expect_err("nan");
        assert!(matches!(err, CorpusLoadError::NonFiniteEmbedding { index: 1 }));
    }

    #[test]
    fn duplicate_texts_are_kept() {
        let corpus = Corpus::from_records(vec![
            PassageRecord::new("a", "same text", vec![1.0, 0.0]),
            PassageRecord::new("b", "same text", vec![0.0, 1.0]),
        ])
        .expect("duplicates load");
        assert_eq!(corpus.size(), 2);
        assert_eq!(count_duplicate_texts(corpus.records()), 1);
    }

    #[test]
    fn alias_keys_ignore_case_and_spacing() {
        let record = PassageRecord::new("a", "t", vec![1.0])
            .with_entity("Zaynab  Bint Jahsh")
            .with_aliases(["Umm al-Hakam", " "]);
        let keys = record.alias_keys();

        assert!(keys.contains("zaynab bint jahsh"));
        assert!(keys.contains("umm al-hakam"));
        assert_eq!(keys.len(), 2);
    }
}
