//! Labeled evaluation datasets: documents, queries and relevance judgments.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Free-form metadata attached to documents, queries and datasets.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A document in the evaluation corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDocument {
    /// Identifier, unique within its dataset.
    pub doc_id: String,
    /// Full text content.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl EvaluationDocument {
    pub fn new(doc_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            content: content.into(),
            title: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Approximate token count (words / 0.75).
    pub fn token_estimate(&self) -> usize {
        estimate_tokens(&self.content)
    }
}

/// Query difficulty label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!(
                "unknown difficulty '{}' (expected easy, medium or hard)",
                other
            )),
        }
    }
}

/// Default query type when none is given.
pub const DEFAULT_QUERY_TYPE: &str = "factual";

/// A query with its relevance judgments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationQuery {
    /// The query text. Persisted under the `query` key.
    #[serde(rename = "query")]
    pub text: String,
    /// Relevant document ids, in judgment order, without duplicates.
    pub relevant_doc_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default = "default_query_type")]
    pub query_type: String,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_query_type() -> String {
    DEFAULT_QUERY_TYPE.to_string()
}

impl EvaluationQuery {
    /// Create a query. Duplicate relevant ids are collapsed, first occurrence wins.
    pub fn new<I, S>(text: impl Into<String>, relevant_doc_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text: text.into(),
            relevant_doc_ids: dedup_ordered(relevant_doc_ids.into_iter().map(Into::into)),
            expected_answer: None,
            difficulty: Difficulty::default(),
            query_type: default_query_type(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_expected_answer(mut self, answer: impl Into<String>) -> Self {
        self.expected_answer = Some(answer.into());
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_query_type(mut self, query_type: impl Into<String>) -> Self {
        self.query_type = query_type.into();
        self
    }
}

/// Collapse duplicates while keeping the first occurrence of each id.
pub(crate) fn dedup_ordered(ids: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(id.clone())).collect()
}

/// A complete labeled dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDataset {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub documents: Vec<EvaluationDocument>,
    pub queries: Vec<EvaluationQuery>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Summary statistics about a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStats {
    pub document_count: usize,
    pub query_count: usize,
    pub avg_relevant_per_query: f64,
    pub avg_document_tokens: f64,
    pub queries_by_difficulty: BTreeMap<Difficulty, usize>,
    pub queries_by_type: BTreeMap<String, usize>,
}

impl EvaluationDataset {
    /// Create a new empty dataset.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            documents: Vec::new(),
            queries: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn add_document(&mut self, document: EvaluationDocument) {
        self.documents.push(document);
    }

    pub fn add_query(&mut self, query: EvaluationQuery) {
        self.queries.push(query);
    }

    /// Look up a document by id.
    pub fn get_document(&self, doc_id: &str) -> Option<&EvaluationDocument> {
        self.documents.iter().find(|d| d.doc_id == doc_id)
    }

    /// Queries of the given type.
    pub fn by_type(&self, query_type: &str) -> Vec<&EvaluationQuery> {
        self.queries
            .iter()
            .filter(|q| q.query_type == query_type)
            .collect()
    }

    /// Queries of the given difficulty.
    pub fn by_difficulty(&self, difficulty: Difficulty) -> Vec<&EvaluationQuery> {
        self.queries
            .iter()
            .filter(|q| q.difficulty == difficulty)
            .collect()
    }

    /// Check dataset invariants. An empty list means the dataset is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for doc in &self.documents {
            *counts.entry(doc.doc_id.as_str()).or_default() += 1;
        }
        // Report duplicates in document order so messages are stable.
        let mut reported = HashSet::new();
        for doc in &self.documents {
            let count = counts[doc.doc_id.as_str()];
            if count > 1 && reported.insert(doc.doc_id.as_str()) {
                violations.push(format!(
                    "Duplicate doc_id '{}' appears {} times",
                    doc.doc_id, count
                ));
            }
        }

        for (i, query) in self.queries.iter().enumerate() {
            if query.relevant_doc_ids.is_empty() {
                violations.push(format!(
                    "Query {} ('{}') has no relevant documents",
                    i, query.text
                ));
            }
            for doc_id in &query.relevant_doc_ids {
                if !counts.contains_key(doc_id.as_str()) {
                    violations.push(format!(
                        "Query {} ('{}') references unknown doc_id '{}'",
                        i, query.text, doc_id
                    ));
                }
            }
        }

        violations
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    pub fn stats(&self) -> DatasetStats {
        let mut queries_by_difficulty = BTreeMap::new();
        let mut queries_by_type = BTreeMap::new();
        for query in &self.queries {
            *queries_by_difficulty.entry(query.difficulty).or_insert(0) += 1;
            *queries_by_type.entry(query.query_type.clone()).or_insert(0) += 1;
        }

        let avg_relevant_per_query = if self.queries.is_empty() {
            0.0
        } else {
            self.queries
                .iter()
                .map(|q| q.relevant_doc_ids.len())
                .sum::<usize>() as f64
                / self.queries.len() as f64
        };

        let avg_document_tokens = if self.documents.is_empty() {
            0.0
        } else {
            self.documents
                .iter()
                .map(|d| d.token_estimate())
                .sum::<usize>() as f64
                / self.documents.len() as f64
        };

        DatasetStats {
            document_count: self.documents.len(),
            query_count: self.queries.len(),
            avg_relevant_per_query,
            avg_document_tokens,
            queries_by_difficulty,
            queries_by_type,
        }
    }
}

/// Estimate token count from text (rough approximation: words / 0.75).
pub fn estimate_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f64 / 0.75) as usize
}

/// Create a small, valid dataset for smoke runs.
pub fn create_sample_dataset() -> EvaluationDataset {
    let mut dataset = EvaluationDataset::new(
        "sample",
        "Built-in programming-language corpus for quick checks",
    );

    dataset.add_document(
        EvaluationDocument::new(
            "rust",
            "Rust is a systems programming language focused on safety, speed, and concurrency. \
             It achieves memory safety without garbage collection through its ownership system. \
             The borrow checker ensures references are valid and prevents data races at compile time. \
             Rust 1.0 was announced in May 2015.",
        )
        .with_title("Rust"),
    );
    dataset.add_document(
        EvaluationDocument::new(
            "python",
            "Python is a high-level, interpreted programming language known for its clear syntax. \
             Created by Guido van Rossum, Python was first released in 1991. \
             The Python Package Index hosts thousands of third-party packages.",
        )
        .with_title("Python"),
    );
    dataset.add_document(
        EvaluationDocument::new(
            "ml",
            "Machine learning is a subset of artificial intelligence that enables systems to learn from data. \
             Supervised learning uses labeled data to train models, while unsupervised learning finds patterns in unlabeled data. \
             Deep learning uses neural networks with many layers.",
        )
        .with_title("Machine Learning"),
    );
    dataset.add_document(
        EvaluationDocument::new(
            "go",
            "Go is a statically typed, compiled language designed at Google. \
             Goroutines and channels make concurrent programming straightforward. \
             Go has a garbage collector and fast compilation.",
        )
        .with_title("Go"),
    );

    dataset.add_query(
        EvaluationQuery::new(
            "How does Rust achieve memory safety without garbage collection?",
            ["rust"],
        )
        .with_expected_answer("Through its ownership system and the borrow checker.")
        .with_difficulty(Difficulty::Easy),
    );
    dataset.add_query(
        EvaluationQuery::new("Who created Python and when was it released?", ["python"])
            .with_expected_answer("Guido van Rossum, first released in 1991.")
            .with_difficulty(Difficulty::Easy),
    );
    dataset.add_query(
        EvaluationQuery::new(
            "What is the difference between supervised and unsupervised learning?",
            ["ml"],
        )
        .with_expected_answer(
            "Supervised learning uses labeled data; unsupervised learning finds patterns in unlabeled data.",
        )
        .with_difficulty(Difficulty::Medium)
        .with_query_type("conceptual"),
    );
    dataset.add_query(
        EvaluationQuery::new(
            "Which languages are designed for safe concurrent programming?",
            ["rust", "go"],
        )
        .with_difficulty(Difficulty::Hard)
        .with_query_type("comparative"),
    );

    dataset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_dataset_is_valid() {
        let dataset = create_sample_dataset();
        assert!(dataset.validate().is_empty());
        assert_eq!(dataset.documents.len(), 4);
        assert_eq!(dataset.queries.len(), 4);
    }

    #[test]
    fn test_duplicate_doc_id_is_reported() {
        let mut dataset = create_sample_dataset();
        dataset.add_document(EvaluationDocument::new("rust", "another rust doc"));

        let violations = dataset.validate();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("Duplicate doc_id 'rust'"));
    }

    #[test]
    fn test_missing_referenced_document_is_reported() {
        let mut dataset = create_sample_dataset();
        dataset.documents.retain(|d| d.doc_id != "go");

        let violations = dataset.validate();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("unknown doc_id 'go'"));
    }

    #[test]
    fn test_query_without_relevant_docs_is_reported() {
        let mut dataset = create_sample_dataset();
        dataset.add_query(EvaluationQuery::new("orphan", Vec::<String>::new()));

        let violations = dataset.validate();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("no relevant documents"));
    }

    #[test]
    fn test_relevant_ids_are_an_ordered_set() {
        let query = EvaluationQuery::new("q", ["b", "a", "b", "c", "a"]);
        assert_eq!(query.relevant_doc_ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_filtered_views() {
        let dataset = create_sample_dataset();
        assert_eq!(dataset.by_difficulty(Difficulty::Easy).len(), 2);
        assert_eq!(dataset.by_difficulty(Difficulty::Hard).len(), 1);
        assert_eq!(dataset.by_type("factual").len(), 2);
        assert_eq!(dataset.by_type("comparative").len(), 1);
        assert!(dataset.by_type("missing").is_empty());
    }

    #[test]
    fn test_lookup_by_doc_id() {
        let dataset = create_sample_dataset();
        assert_eq!(
            dataset.get_document("python").and_then(|d| d.title.as_deref()),
            Some("Python")
        );
        assert!(dataset.get_document("cobol").is_none());
    }

    #[test]
    fn test_stats() {
        let stats = create_sample_dataset().stats();
        assert_eq!(stats.document_count, 4);
        assert_eq!(stats.query_count, 4);
        assert!((stats.avg_relevant_per_query - 1.25).abs() < 1e-9);
        assert_eq!(stats.queries_by_difficulty[&Difficulty::Easy], 2);
        assert!(stats.avg_document_tokens > 0.0);
    }

    #[test]
    fn test_difficulty_parsing() {
        assert_eq!("HARD".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("extreme".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_estimate_tokens() {
        let tokens = estimate_tokens("one two three four five six seven eight");
        assert!((10..=12).contains(&tokens));
    }
}
