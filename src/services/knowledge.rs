//! Knowledge base ingestion: load Markdown documents, chunk them, embed the
//! chunks and upsert them into the vector store.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::services::chroma::{ChromaClient, ChromaError, ChromaRecord};
use crate::services::llm::{Embedder, LlmError};

const EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// A source document, keyed by its path relative to the knowledge root.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub chunk_size: usize,
    pub overlap: usize,
    pub batch_size: usize,
    pub max_workers: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            overlap: 300,
            batch_size: 10,
            max_workers: 8,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub documents: usize,
    pub chunks: usize,
}

/// Read every Markdown or text file under `root`, skipping blank ones.
pub fn load_documents(root: &Path) -> Result<Vec<Document>, KnowledgeError> {
    if !root.is_dir() {
        return Err(KnowledgeError::MissingDirectory(root.to_path_buf()));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if !supported {
            continue;
        }

        let text = std::fs::read_to_string(path).map_err(|source| KnowledgeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if text.trim().is_empty() {
            tracing::warn!(path = %path.display(), "Skipping empty document");
            continue;
        }
        let source = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        documents.push(Document { source, text });
    }

    tracing::info!(root = %root.display(), documents = documents.len(), "Documents loaded");
    Ok(documents)
}

/// Split `text` into chunks of at most `chunk_size` characters.
///
/// Paragraphs are packed greedily. Each new chunk starts with the last
/// `overlap` characters of the previous one when that still fits. Paragraphs
/// longer than a chunk are cut at character boundaries.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, KnowledgeError> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(KnowledgeError::InvalidChunking { chunk_size, overlap });
    }

    let pieces = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .flat_map(|p| hard_split(p, chunk_size));

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        if current.is_empty() {
            current = piece;
            continue;
        }
        if char_len(&current) + 2 + char_len(&piece) <= chunk_size {
            current.push_str("\n\n");
            current.push_str(&piece);
            continue;
        }

        let tail = tail_chars(&current, overlap).to_string();
        chunks.push(std::mem::take(&mut current));
        current = if !tail.is_empty() && char_len(&tail) + 1 + char_len(&piece) <= chunk_size {
            format!("{tail}\n{piece}")
        } else {
            piece
        };
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn hard_split(paragraph: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|c| c.iter().collect::<String>().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let len = char_len(s);
    if len <= n {
        return s.trim_start();
    }
    let start = s.char_indices().nth(len - n).map(|(i, _)| i).unwrap_or(0);
    s[start..].trim_start()
}

/// Chunk, embed and upsert `documents`. Chunk ids are `{source}#{n}`, so a
/// re-run overwrites instead of duplicating.
pub async fn ingest(
    chroma: &ChromaClient,
    embedder: Arc<dyn Embedder>,
    documents: &[Document],
    options: IngestOptions,
) -> Result<IngestSummary, KnowledgeError> {
    let mut pending: Vec<(String, String, String)> = Vec::new();
    for doc in documents {
        for (n, chunk) in split_text(&doc.text, options.chunk_size, options.overlap)?
            .into_iter()
            .enumerate()
        {
            pending.push((format!("{}#{n}", doc.source), doc.source.clone(), chunk));
        }
    }
    tracing::info!(
        documents = documents.len(),
        chunks = pending.len(),
        chunk_size = options.chunk_size,
        overlap = options.overlap,
        "Documents split"
    );

    let collection_id = chroma.get_or_create_collection().await?;
    let batches: Vec<Vec<(String, String, String)>> = pending
        .chunks(options.batch_size.max(1))
        .map(<[_]>::to_vec)
        .collect();
    let total_batches = batches.len();

    let records: Vec<Vec<ChromaRecord>> = stream::iter(batches)
        .map(|batch| {
            let embedder = embedder.clone();
            async move {
                let texts: Vec<String> = batch.iter().map(|(_, _, text)| text.clone()).collect();
                let embeddings = embedder.embed(&texts).await?;
                Ok::<_, KnowledgeError>(
                    batch
                        .into_iter()
                        .zip(embeddings)
                        .map(|((id, source, document), embedding)| ChromaRecord {
                            id,
                            document,
                            source,
                            embedding,
                        })
                        .collect(),
                )
            }
        })
        .buffer_unordered(options.max_workers.max(1))
        .try_collect()
        .await?;

    let mut stored = 0;
    for (i, batch) in records.into_iter().enumerate() {
        stored += batch.len();
        chroma.upsert(&collection_id, batch).await?;
        tracing::debug!(batch = i + 1, total_batches, "Batch stored");
    }

    Ok(IngestSummary {
        documents: documents.len(),
        chunks: stored,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("knowledge directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk knowledge directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid chunking: overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidChunking { chunk_size: usize, overlap: usize },

    #[error("embedding failed: {0}")]
    Embedding(#[from] LlmError),

    #[error(transparent)]
    Store(#[from] ChromaError),
}
