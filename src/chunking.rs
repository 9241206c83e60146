//! Document chunkers.
//!
//! Only the character-window chunkers are implemented locally. Semantic and
//! late chunking depend on model inference and are rejected by
//! [`build_chunker`] with [`BenchError::Unsupported`].

use crate::dataset::{EvaluationDocument, Metadata};
use crate::error::{BenchError, Result};
use crate::strategy::ChunkerConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A chunk of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    /// Position within the document, starting at 0 with no gaps.
    pub chunk_index: usize,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Splits a document into ordered chunks.
pub trait Chunker: Send + Sync {
    /// Chunk a document. An empty result is valid.
    fn chunk(&self, document: &EvaluationDocument) -> Result<Vec<Chunk>>;

    /// Short human-readable name.
    fn name(&self) -> &str;
}

/// Build a chunker from its configuration.
pub fn build_chunker(config: &ChunkerConfig) -> Result<Arc<dyn Chunker>> {
    match config {
        ChunkerConfig::Recursive {
            chunk_size,
            chunk_overlap,
        } => Ok(Arc::new(RecursiveChunker::new(*chunk_size, *chunk_overlap)?)),
        ChunkerConfig::Hierarchical {
            parent_chunk_size,
            child_chunk_size,
            chunk_overlap,
        } => Ok(Arc::new(HierarchicalChunker::new(
            *parent_chunk_size,
            *child_chunk_size,
            *chunk_overlap,
        )?)),
        ChunkerConfig::Semantic { .. } | ChunkerConfig::LateChunking { .. } => {
            Err(BenchError::Unsupported(format!(
                "{} chunking requires an embedding model and is not built in",
                config.kind().as_str()
            )))
        }
    }
}

/// A span of the source text, in character offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

/// Character-window splitting that prefers sentence boundaries.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(BenchError::InvalidConfig(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(BenchError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split `chars` into overlapping windows of at most `chunk_size`.
    fn windows(&self, chars: &[char]) -> Vec<Span> {
        let len = chars.len();
        let mut spans = Vec::new();
        let mut start = 0;

        while start < len {
            let end = (start + self.chunk_size).min(len);
            let end = if end < len {
                sentence_break(chars, start, end)
            } else {
                end
            };

            spans.push(Span { start, end });
            if end >= len {
                break;
            }

            let next = end.saturating_sub(self.chunk_overlap);
            start = if next <= start { end } else { next };
        }

        spans
    }
}

/// Last sentence end within the final 100 chars of `[start, end)`, or `end`.
fn sentence_break(chars: &[char], start: usize, end: usize) -> usize {
    let search_start = end.saturating_sub(100).max(start);
    chars[search_start..end]
        .iter()
        .rposition(|c| matches!(c, '.' | '!' | '?'))
        .map(|pos| search_start + pos + 1)
        .filter(|&candidate| candidate > start)
        .unwrap_or(end)
}

fn collect_chunks(chars: &[char], spans: impl Iterator<Item = (Span, Metadata)>) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for (span, metadata) in spans {
        let text: String = chars[span.start..span.end].iter().collect();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        chunks.push(Chunk {
            content: text.to_string(),
            chunk_index: chunks.len(),
            metadata,
        });
    }
    chunks
}

fn span_metadata(span: Span) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("start_char".to_string(), span.start.into());
    metadata.insert("end_char".to_string(), span.end.into());
    metadata
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &EvaluationDocument) -> Result<Vec<Chunk>> {
        let chars: Vec<char> = document.content.chars().collect();
        let spans = self.windows(&chars);
        Ok(collect_chunks(
            &chars,
            spans.into_iter().map(|span| (span, span_metadata(span))),
        ))
    }

    fn name(&self) -> &str {
        "recursive"
    }
}

/// Two-level chunking: paragraph-aligned parent sections, each split into
/// child windows. Only the children are emitted; each records its parent.
#[derive(Debug, Clone)]
pub struct HierarchicalChunker {
    parent_chunk_size: usize,
    child: RecursiveChunker,
}

impl HierarchicalChunker {
    pub fn new(parent_chunk_size: usize, child_chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if parent_chunk_size < child_chunk_size {
            return Err(BenchError::InvalidConfig(format!(
                "parent_chunk_size ({}) must be at least child_chunk_size ({})",
                parent_chunk_size, child_chunk_size
            )));
        }
        Ok(Self {
            parent_chunk_size,
            child: RecursiveChunker::new(child_chunk_size, chunk_overlap)?,
        })
    }

    /// Group paragraphs (blank-line separated) into parents of at most
    /// `parent_chunk_size` chars. An oversized paragraph becomes its own parent.
    fn parents(&self, chars: &[char]) -> Vec<Span> {
        let mut paragraphs = Vec::new();
        let mut start = 0;
        let mut i = 0;
        while i + 1 < chars.len() {
            if chars[i] == '\n' && chars[i + 1] == '\n' {
                if i > start {
                    paragraphs.push(Span { start, end: i });
                }
                start = i + 2;
                i += 2;
            } else {
                i += 1;
            }
        }
        if start < chars.len() {
            paragraphs.push(Span {
                start,
                end: chars.len(),
            });
        }

        let mut parents: Vec<Span> = Vec::new();
        for paragraph in paragraphs {
            match parents.last_mut() {
                Some(last) if paragraph.end - last.start <= self.parent_chunk_size => {
                    last.end = paragraph.end;
                }
                _ => parents.push(paragraph),
            }
        }
        parents
    }
}

impl Chunker for HierarchicalChunker {
    fn chunk(&self, document: &EvaluationDocument) -> Result<Vec<Chunk>> {
        let chars: Vec<char> = document.content.chars().collect();
        let mut spans = Vec::new();

        for (parent_index, parent) in self.parents(&chars).into_iter().enumerate() {
            for child in self.child.windows(&chars[parent.start..parent.end]) {
                let span = Span {
                    start: parent.start + child.start,
                    end: parent.start + child.end,
                };
                let mut metadata = span_metadata(span);
                metadata.insert("parent_index".to_string(), parent_index.into());
                spans.push((span, metadata));
            }
        }

        Ok(collect_chunks(&chars, spans.into_iter()))
    }

    fn name(&self) -> &str {
        "hierarchical"
    }
}
