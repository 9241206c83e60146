//! Persistence for datasets and strategy files.
//!
//! Datasets use the canonical JSON layout. Strategy files may be JSON or
//! YAML, chosen by extension.

use crate::dataset::{
    dedup_ordered, Difficulty, EvaluationDataset, EvaluationDocument, EvaluationQuery, Metadata,
    DEFAULT_QUERY_TYPE,
};
use crate::error::{BenchError, Result};
use crate::strategy::StrategyConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// File format for strategy files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Yaml,
}

impl FileFormat {
    /// Determine format from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            _ => FileFormat::Json,
        }
    }
}

/// Save a dataset as pretty-printed JSON.
pub fn save_dataset(dataset: &EvaluationDataset, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(dataset)
        .map_err(|e| BenchError::Serialization(e.to_string()))?;
    fs::write(path, json).map_err(|e| BenchError::io(path, e))
}

/// Load a dataset from a JSON file.
pub fn load_dataset(path: &Path) -> Result<EvaluationDataset> {
    if !path.exists() {
        return Err(BenchError::DatasetNotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
    parse_dataset(&content)
}

/// Parse a dataset from JSON text.
///
/// Either the whole dataset is produced or an error naming the first
/// offending field is returned.
pub fn parse_dataset(json: &str) -> Result<EvaluationDataset> {
    let root: Value = serde_json::from_str(json)
        .map_err(|e| BenchError::dataset_format("<root>", e.to_string()))?;
    let root = root
        .as_object()
        .ok_or_else(|| BenchError::dataset_format("<root>", "expected a JSON object"))?;

    let name = required_str(root, "name", "name")?;
    let description = optional_str(root, "description", "description")?.unwrap_or_default();
    let metadata = metadata_field(root, "metadata", "metadata")?;

    let documents = required_array(root, "documents", "documents")?
        .iter()
        .enumerate()
        .map(|(i, value)| parse_document(value, &format!("documents[{}]", i)))
        .collect::<Result<Vec<_>>>()?;

    let queries = required_array(root, "queries", "queries")?
        .iter()
        .enumerate()
        .map(|(i, value)| parse_query(value, &format!("queries[{}]", i)))
        .collect::<Result<Vec<_>>>()?;

    Ok(EvaluationDataset {
        name,
        description,
        documents,
        queries,
        metadata,
    })
}

fn parse_document(value: &Value, path: &str) -> Result<EvaluationDocument> {
    let obj = value
        .as_object()
        .ok_or_else(|| BenchError::dataset_format(path, "expected an object"))?;

    Ok(EvaluationDocument {
        doc_id: required_str(obj, "doc_id", &format!("{}.doc_id", path))?,
        content: required_str(obj, "content", &format!("{}.content", path))?,
        title: optional_str(obj, "title", &format!("{}.title", path))?,
        metadata: metadata_field(obj, "metadata", &format!("{}.metadata", path))?,
    })
}

fn parse_query(value: &Value, path: &str) -> Result<EvaluationQuery> {
    let obj = value
        .as_object()
        .ok_or_else(|| BenchError::dataset_format(path, "expected an object"))?;

    let ids_path = format!("{}.relevant_doc_ids", path);
    let ids = required_array(obj, "relevant_doc_ids", &ids_path)?
        .iter()
        .enumerate()
        .map(|(i, id)| {
            id.as_str().map(str::to_string).ok_or_else(|| {
                BenchError::dataset_format(format!("{}[{}]", ids_path, i), "expected a string")
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let difficulty = match optional_str(obj, "difficulty", &format!("{}.difficulty", path))? {
        Some(raw) => raw
            .parse::<Difficulty>()
            .map_err(|e| BenchError::dataset_format(format!("{}.difficulty", path), e))?,
        None => Difficulty::default(),
    };

    Ok(EvaluationQuery {
        text: required_str(obj, "query", &format!("{}.query", path))?,
        relevant_doc_ids: dedup_ordered(ids.into_iter()),
        expected_answer: optional_str(obj, "expected_answer", &format!("{}.expected_answer", path))?,
        difficulty,
        query_type: optional_str(obj, "query_type", &format!("{}.query_type", path))?
            .unwrap_or_else(|| DEFAULT_QUERY_TYPE.to_string()),
        metadata: metadata_field(obj, "metadata", &format!("{}.metadata", path))?,
    })
}

fn required_str(obj: &Map<String, Value>, key: &str, path: &str) -> Result<String> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(BenchError::dataset_format(path, "expected a string")),
        None => Err(BenchError::dataset_format(path, "missing required field")),
    }
}

fn optional_str(obj: &Map<String, Value>, key: &str, path: &str) -> Result<Option<String>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(BenchError::dataset_format(path, "expected a string")),
    }
}

fn required_array<'a>(obj: &'a Map<String, Value>, key: &str, path: &str) -> Result<&'a Vec<Value>> {
    match obj.get(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(BenchError::dataset_format(path, "expected an array")),
        None => Err(BenchError::dataset_format(path, "missing required field")),
    }
}

fn metadata_field(obj: &Map<String, Value>, key: &str, path: &str) -> Result<Metadata> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(Metadata::new()),
        Some(Value::Object(map)) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Some(_) => Err(BenchError::dataset_format(path, "expected an object")),
    }
}

/// Check if a dataset file exists at the given path.
pub fn dataset_exists(path: &Path) -> bool {
    path.exists() && path.is_file()
}

/// Strategy file layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyFile {
    pub strategies: Vec<StrategyConfig>,
}

/// Load strategies from a JSON or YAML file.
pub fn load_strategies(path: &Path) -> Result<Vec<StrategyConfig>> {
    let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
    let file: StrategyFile = match FileFormat::from_path(path) {
        FileFormat::Json => serde_json::from_str(&content)
            .map_err(|e| BenchError::Config(format!("Failed to parse strategies file: {}", e)))?,
        FileFormat::Yaml => serde_yaml::from_str(&content)
            .map_err(|e| BenchError::Config(format!("Failed to parse strategies file: {}", e)))?,
    };
    Ok(file.strategies)
}

/// Save strategies to a JSON or YAML file.
pub fn save_strategies(strategies: &[StrategyConfig], path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let file = StrategyFile {
        strategies: strategies.to_vec(),
    };
    let content = match FileFormat::from_path(path) {
        FileFormat::Json => serde_json::to_string_pretty(&file)
            .map_err(|e| BenchError::Serialization(e.to_string()))?,
        FileFormat::Yaml => {
            serde_yaml::to_string(&file).map_err(|e| BenchError::Serialization(e.to_string()))?
        }
    };
    fs::write(path, content).map_err(|e| BenchError::io(path, e))
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::create_sample_dataset;
    use crate::strategy::{ChunkerConfig, EmbedderConfig};
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dataset.json");

        let mut original = create_sample_dataset();
        original
            .metadata
            .insert("source".to_string(), serde_json::json!("unit-test"));
        original.documents[0]
            .metadata
            .insert("year".to_string(), serde_json::json!(2015));

        tokio_test::assert_ok!(save_dataset(&original, &path));
        assert!(dataset_exists(&path));

        let loaded = load_dataset(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_missing_field_is_named() {
        let json = r#"{
            "name": "broken",
            "documents": [
                {"doc_id": "a", "content": "text"},
                {"doc_id": "b"}
            ],
            "queries": []
        }"#;
        match parse_dataset(json) {
            Err(BenchError::DatasetFormat { field, .. }) => {
                assert_eq!(field, "documents[1].content")
            }
            other => panic!("expected DatasetFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_query_field_is_named() {
        let json = r#"{
            "name": "broken",
            "documents": [{"doc_id": "a", "content": "text"}],
            "queries": [{"query": "q", "relevant_doc_ids": ["a", 7]}]
        }"#;
        match parse_dataset(json) {
            Err(BenchError::DatasetFormat { field, .. }) => {
                assert_eq!(field, "queries[0].relevant_doc_ids[1]")
            }
            other => panic!("expected DatasetFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_difficulty_is_rejected() {
        let json = r#"{
            "name": "d",
            "documents": [{"doc_id": "a", "content": "text"}],
            "queries": [{"query": "q", "relevant_doc_ids": ["a"], "difficulty": "brutal"}]
        }"#;
        let err = parse_dataset(json).unwrap_err();
        assert_eq!(err.kind(), "dataset_format");
        assert!(err.to_string().contains("queries[0].difficulty"));
    }

    #[test]
    fn test_optional_fields_get_defaults() {
        let json = r#"{
            "name": "minimal",
            "documents": [{"doc_id": "a", "content": "text"}],
            "queries": [{"query": "q", "relevant_doc_ids": ["a", "a"]}]
        }"#;
        let dataset = parse_dataset(json).unwrap();
        assert_eq!(dataset.description, "");
        assert!(dataset.metadata.is_empty());
        let query = &dataset.queries[0];
        assert_eq!(query.relevant_doc_ids, vec!["a"]);
        assert_eq!(query.difficulty, Difficulty::Medium);
        assert_eq!(query.query_type, "factual");
        assert!(query.expected_answer.is_none());
    }

    #[test]
    fn test_load_nonexistent() {
        let result = load_dataset(Path::new("/nonexistent/dataset.json"));
        assert!(matches!(result, Err(BenchError::DatasetNotFound(_))));
    }

    #[test]
    fn test_syntax_error_is_dataset_format() {
        let err = parse_dataset("{not json").unwrap_err();
        assert_eq!(err.kind(), "dataset_format");
    }

    #[test]
    fn test_strategies_round_trip_yaml_and_json() {
        let dir = TempDir::new().unwrap();
        let strategies = vec![StrategyConfig::new(
            "recursive-256",
            ChunkerConfig::Recursive {
                chunk_size: 256,
                chunk_overlap: 32,
            },
            EmbedderConfig::Hashing {
                dimension: 128,
                normalize: true,
            },
        )];

        for name in ["strategies.yaml", "strategies.json"] {
            let path = dir.path().join(name);
            save_strategies(&strategies, &path).unwrap();
            let loaded = load_strategies(&path).unwrap();
            assert_eq!(loaded, strategies);
        }
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_path(Path::new("s.yaml")), FileFormat::Yaml);
        assert_eq!(FileFormat::from_path(Path::new("s.yml")), FileFormat::Yaml);
        assert_eq!(FileFormat::from_path(Path::new("s.json")), FileFormat::Json);
        assert_eq!(FileFormat::from_path(Path::new("s")), FileFormat::Json);
    }
}
