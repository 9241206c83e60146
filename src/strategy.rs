//! Strategy configuration and its flat, versioned descriptor form.
//!
//! A [`StrategyConfig`] names one chunker + embedder combination. Before it
//! crosses a worker boundary it is lowered to a [`StrategyDescriptor`]: a
//! kind tag plus a flat parameter map per component, encoded with bincode.
//! Workers rebuild the typed config from the descriptor and construct their
//! own collaborators from it.

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current descriptor layout version.
pub const DESCRIPTOR_VERSION: u32 = 1;

/// Chunking algorithm family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkerKind {
    Recursive,
    Hierarchical,
    Semantic,
    LateChunking,
}

impl ChunkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkerKind::Recursive => "recursive",
            ChunkerKind::Hierarchical => "hierarchical",
            ChunkerKind::Semantic => "semantic",
            ChunkerKind::LateChunking => "late_chunking",
        }
    }

    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "recursive" => Ok(ChunkerKind::Recursive),
            "hierarchical" => Ok(ChunkerKind::Hierarchical),
            "semantic" => Ok(ChunkerKind::Semantic),
            "late_chunking" => Ok(ChunkerKind::LateChunking),
            other => Err(BenchError::Descriptor(format!(
                "unknown chunker kind '{}'",
                other
            ))),
        }
    }
}

/// Embedding backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbedderKind {
    Hashing,
    OpenAi,
    SentenceTransformer,
}

impl EmbedderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedderKind::Hashing => "hashing",
            EmbedderKind::OpenAi => "open_ai",
            EmbedderKind::SentenceTransformer => "sentence_transformer",
        }
    }

    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "hashing" => Ok(EmbedderKind::Hashing),
            "open_ai" => Ok(EmbedderKind::OpenAi),
            "sentence_transformer" => Ok(EmbedderKind::SentenceTransformer),
            other => Err(BenchError::Descriptor(format!(
                "unknown embedder kind '{}'",
                other
            ))),
        }
    }
}

fn default_overlap() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    32
}

/// Chunker parameters, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkerConfig {
    Recursive {
        chunk_size: usize,
        #[serde(default = "default_overlap")]
        chunk_overlap: usize,
    },
    Hierarchical {
        parent_chunk_size: usize,
        child_chunk_size: usize,
        #[serde(default = "default_overlap")]
        chunk_overlap: usize,
    },
    Semantic {
        similarity_threshold: f64,
        max_chunk_size: usize,
    },
    LateChunking {
        chunk_size: usize,
        model: String,
    },
}

impl ChunkerConfig {
    pub fn kind(&self) -> ChunkerKind {
        match self {
            ChunkerConfig::Recursive { .. } => ChunkerKind::Recursive,
            ChunkerConfig::Hierarchical { .. } => ChunkerKind::Hierarchical,
            ChunkerConfig::Semantic { .. } => ChunkerKind::Semantic,
            ChunkerConfig::LateChunking { .. } => ChunkerKind::LateChunking,
        }
    }

    pub fn to_descriptor(&self) -> ComponentDescriptor {
        let mut params = BTreeMap::new();
        match self {
            ChunkerConfig::Recursive {
                chunk_size,
                chunk_overlap,
            } => {
                params.insert("chunk_size".to_string(), ParamValue::from_usize(*chunk_size));
                params.insert(
                    "chunk_overlap".to_string(),
                    ParamValue::from_usize(*chunk_overlap),
                );
            }
            ChunkerConfig::Hierarchical {
                parent_chunk_size,
                child_chunk_size,
                chunk_overlap,
            } => {
                params.insert(
                    "parent_chunk_size".to_string(),
                    ParamValue::from_usize(*parent_chunk_size),
                );
                params.insert(
                    "child_chunk_size".to_string(),
                    ParamValue::from_usize(*child_chunk_size),
                );
                params.insert(
                    "chunk_overlap".to_string(),
                    ParamValue::from_usize(*chunk_overlap),
                );
            }
            ChunkerConfig::Semantic {
                similarity_threshold,
                max_chunk_size,
            } => {
                params.insert(
                    "similarity_threshold".to_string(),
                    ParamValue::Float(*similarity_threshold),
                );
                params.insert(
                    "max_chunk_size".to_string(),
                    ParamValue::from_usize(*max_chunk_size),
                );
            }
            ChunkerConfig::LateChunking { chunk_size, model } => {
                params.insert("chunk_size".to_string(), ParamValue::from_usize(*chunk_size));
                params.insert("model".to_string(), ParamValue::Text(model.clone()));
            }
        }
        ComponentDescriptor {
            kind: self.kind().as_str().to_string(),
            params,
        }
    }

    pub fn from_descriptor(descriptor: &ComponentDescriptor) -> Result<Self> {
        let d = descriptor;
        Ok(match ChunkerKind::parse(&d.kind)? {
            ChunkerKind::Recursive => ChunkerConfig::Recursive {
                chunk_size: d.get_usize("chunk_size")?,
                chunk_overlap: d.get_usize("chunk_overlap")?,
            },
            ChunkerKind::Hierarchical => ChunkerConfig::Hierarchical {
                parent_chunk_size: d.get_usize("parent_chunk_size")?,
                child_chunk_size: d.get_usize("child_chunk_size")?,
                chunk_overlap: d.get_usize("chunk_overlap")?,
            },
            ChunkerKind::Semantic => ChunkerConfig::Semantic {
                similarity_threshold: d.get_float("similarity_threshold")?,
                max_chunk_size: d.get_usize("max_chunk_size")?,
            },
            ChunkerKind::LateChunking => ChunkerConfig::LateChunking {
                chunk_size: d.get_usize("chunk_size")?,
                model: d.get_text("model")?,
            },
        })
    }
}

/// Embedder parameters, tagged by kind.
///
/// Every variant determines its vector dimension explicitly: either as a
/// parameter or from the model's own configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbedderConfig {
    /// Deterministic feature-hashing embedder, no model required.
    Hashing {
        dimension: usize,
        #[serde(default = "default_true")]
        normalize: bool,
    },
    /// OpenAI-compatible `/v1/embeddings` endpoint.
    OpenAi {
        model: String,
        dimension: usize,
        #[serde(default = "default_batch_size")]
        batch_size: usize,
    },
    /// Local sentence-transformers model (feature `local-embeddings`).
    SentenceTransformer { model_id: String },
}

impl EmbedderConfig {
    pub fn kind(&self) -> EmbedderKind {
        match self {
            EmbedderConfig::Hashing { .. } => EmbedderKind::Hashing,
            EmbedderConfig::OpenAi { .. } => EmbedderKind::OpenAi,
            EmbedderConfig::SentenceTransformer { .. } => EmbedderKind::SentenceTransformer,
        }
    }

    pub fn to_descriptor(&self) -> ComponentDescriptor {
        let mut params = BTreeMap::new();
        match self {
            EmbedderConfig::Hashing {
                dimension,
                normalize,
            } => {
                params.insert("dimension".to_string(), ParamValue::from_usize(*dimension));
                params.insert("normalize".to_string(), ParamValue::Bool(*normalize));
            }
            EmbedderConfig::OpenAi {
                model,
                dimension,
                batch_size,
            } => {
                params.insert("model".to_string(), ParamValue::Text(model.clone()));
                params.insert("dimension".to_string(), ParamValue::from_usize(*dimension));
                params.insert("batch_size".to_string(), ParamValue::from_usize(*batch_size));
            }
            EmbedderConfig::SentenceTransformer { model_id } => {
                params.insert("model_id".to_string(), ParamValue::Text(model_id.clone()));
            }
        }
        ComponentDescriptor {
            kind: self.kind().as_str().to_string(),
            params,
        }
    }

    pub fn from_descriptor(descriptor: &ComponentDescriptor) -> Result<Self> {
        let d = descriptor;
        Ok(match EmbedderKind::parse(&d.kind)? {
            EmbedderKind::Hashing => EmbedderConfig::Hashing {
                dimension: d.get_usize("dimension")?,
                normalize: d.get_bool("normalize")?,
            },
            EmbedderKind::OpenAi => EmbedderConfig::OpenAi {
                model: d.get_text("model")?,
                dimension: d.get_usize("dimension")?,
                batch_size: d.get_usize("batch_size")?,
            },
            EmbedderKind::SentenceTransformer => EmbedderConfig::SentenceTransformer {
                model_id: d.get_text("model_id")?,
            },
        })
    }
}

/// One named strategy under evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    pub chunker: ChunkerConfig,
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub description: String,
}

impl StrategyConfig {
    pub fn new(name: impl Into<String>, chunker: ChunkerConfig, embedder: EmbedderConfig) -> Self {
        Self {
            name: name.into(),
            chunker,
            embedder,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Lower to the flat descriptor form.
    pub fn to_descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor {
            version: DESCRIPTOR_VERSION,
            name: self.name.clone(),
            description: self.description.clone(),
            chunker: self.chunker.to_descriptor(),
            embedder: self.embedder.to_descriptor(),
        }
    }

    /// Rebuild a typed config from a descriptor.
    pub fn from_descriptor(descriptor: &StrategyDescriptor) -> Result<Self> {
        if descriptor.version != DESCRIPTOR_VERSION {
            return Err(BenchError::Descriptor(format!(
                "unsupported descriptor version {} (expected {})",
                descriptor.version, DESCRIPTOR_VERSION
            )));
        }
        Ok(Self {
            name: descriptor.name.clone(),
            chunker: ChunkerConfig::from_descriptor(&descriptor.chunker)?,
            embedder: EmbedderConfig::from_descriptor(&descriptor.embedder)?,
            description: descriptor.description.clone(),
        })
    }
}

/// A flat parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    fn from_usize(value: usize) -> Self {
        ParamValue::Int(value as i64)
    }

    fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Bool(_) => "bool",
            ParamValue::Text(_) => "text",
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Kind tag plus flat parameters for one collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub kind: String,
    pub params: BTreeMap<String, ParamValue>,
}

impl ComponentDescriptor {
    fn get(&self, key: &str) -> Result<&ParamValue> {
        self.params.get(key).ok_or_else(|| {
            BenchError::Descriptor(format!("{} is missing parameter '{}'", self.kind, key))
        })
    }

    fn mismatch(&self, key: &str, expected: &str, got: &ParamValue) -> BenchError {
        BenchError::Descriptor(format!(
            "{} parameter '{}' must be {}, got {}",
            self.kind,
            key,
            expected,
            got.type_name()
        ))
    }

    fn get_usize(&self, key: &str) -> Result<usize> {
        match self.get(key)? {
            ParamValue::Int(v) if *v >= 0 => Ok(*v as usize),
            other => Err(self.mismatch(key, "a non-negative int", other)),
        }
    }

    fn get_float(&self, key: &str) -> Result<f64> {
        match self.get(key)? {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            other => Err(self.mismatch(key, "a float", other)),
        }
    }

    fn get_bool(&self, key: &str) -> Result<bool> {
        match self.get(key)? {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(self.mismatch(key, "a bool", other)),
        }
    }

    fn get_text(&self, key: &str) -> Result<String> {
        match self.get(key)? {
            ParamValue::Text(v) => Ok(v.clone()),
            other => Err(self.mismatch(key, "text", other)),
        }
    }

    /// Stable `kind(k=v,...)` rendering, keys in sorted order.
    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}({})", self.kind, params)
    }
}

/// Self-contained form of a [`StrategyConfig`] that carries no live objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    pub version: u32,
    pub name: String,
    pub description: String,
    pub chunker: ComponentDescriptor,
    pub embedder: ComponentDescriptor,
}

impl StrategyDescriptor {
    /// Encode to bytes for transfer to a worker.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| BenchError::Descriptor(e.to_string()))
    }

    /// Decode bytes produced by [`StrategyDescriptor::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (descriptor, _): (StrategyDescriptor, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| BenchError::Descriptor(e.to_string()))?;
        Ok(descriptor)
    }
}
