use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::{check_pairs, check_top_k, rank};
use crate::domain::{ports::VectorStore, DocumentChunk, DomainError, Embedding, SearchResult};

const MANIFEST_FILE: &str = "manifest.json";
const ENTRIES_FILE: &str = "entries.jsonl";

/// Which embedding model produced the vectors in this index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub model: String,
    pub dimension: usize,
}

#[derive(Serialize, Deserialize)]
struct Entry {
    chunk: DocumentChunk,
    embedding: Embedding,
}

#[derive(Default)]
struct State {
    manifest: Option<Manifest>,
    entries: Vec<Entry>,
}

/// File-backed index: a manifest plus one JSON line per chunk, loaded fully
/// into memory on open. Written by the indexer, read by the API.
pub struct LocalVectorStore {
    dir: PathBuf,
    model: String,
    state: RwLock<State>,
}

impl LocalVectorStore {
    /// Opens an existing index for querying with `model`'s embeddings.
    pub fn open(dir: impl Into<PathBuf>, model: impl Into<String>) -> Result<Self, DomainError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(DomainError::retrieval(format!(
                "vector store not found at {}",
                dir.display()
            )));
        }
        Self::load(dir, model.into())
    }

    /// Opens the index at `dir`, creating the directory if needed.
    pub fn create(dir: impl Into<PathBuf>, model: impl Into<String>) -> Result<Self, DomainError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        Self::load(dir, model.into())
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Deletes the index files under `dir`, leaving the directory itself.
    pub fn remove_files(dir: &Path) -> Result<(), DomainError> {
        for name in [MANIFEST_FILE, ENTRIES_FILE] {
            let path = dir.join(name);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(&path, e)),
            }
        }
        Ok(())
    }

    fn load(dir: PathBuf, model: String) -> Result<Self, DomainError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest: Option<Manifest> = if manifest_path.exists() {
            let raw = std::fs::read_to_string(&manifest_path)
                .map_err(|e| io_error(&manifest_path, e))?;
            Some(serde_json::from_str(&raw).map_err(|e| {
                DomainError::retrieval(format!("corrupt {}: {e}", manifest_path.display()))
            })?)
        } else {
            None
        };

        if let Some(manifest) = &manifest {
            if manifest.model != model {
                return Err(DomainError::retrieval(format!(
                    "index at {} was built with embedding model {}, not {}",
                    dir.display(),
                    manifest.model,
                    model
                )));
            }
        }

        let entries_path = dir.join(ENTRIES_FILE);
        let mut entries = Vec::new();
        if entries_path.exists() {
            let file = std::fs::File::open(&entries_path).map_err(|e| io_error(&entries_path, e))?;
            for (line_no, line) in BufReader::new(file).lines().enumerate() {
                let line = line.map_err(|e| io_error(&entries_path, e))?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry: Entry = serde_json::from_str(&line).map_err(|e| {
                    DomainError::retrieval(format!(
                        "corrupt entry at {}:{}: {e}",
                        entries_path.display(),
                        line_no + 1
                    ))
                })?;
                entries.push(entry);
            }
        }

        tracing::info!(path = %dir.display(), entries = entries.len(), "opened vector store");
        Ok(Self {
            dir,
            model,
            state: RwLock::new(State { manifest, entries }),
        })
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<(), DomainError> {
        let path = self.dir.join(MANIFEST_FILE);
        let raw = serde_json::to_string_pretty(manifest)
            .map_err(|e| DomainError::internal(e.to_string()))?;
        std::fs::write(&path, raw).map_err(|e| io_error(&path, e))
    }

    fn append_entries(&self, entries: &[Entry]) -> Result<(), DomainError> {
        let path = self.dir.join(ENTRIES_FILE);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_error(&path, e))?;

        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)
                .map_err(|e| DomainError::internal(e.to_string()))?;
            buf.push(b'\n');
        }
        file.write_all(&buf).map_err(|e| io_error(&path, e))?;
        file.sync_all().map_err(|e| io_error(&path, e))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> DomainError {
    DomainError::retrieval(format!("{}: {e}", path.display()))
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn add(
        &self,
        chunks: &[DocumentChunk],
        embeddings: &[Embedding],
    ) -> Result<(), DomainError> {
        check_pairs(chunks, embeddings)?;
        let Some(first) = embeddings.first() else {
            return Ok(());
        };

        let mut state = self.state.write().await;
        let dimension = match &state.manifest {
            Some(manifest) => manifest.dimension,
            None => first.dimension(),
        };
        if let Some(bad) = embeddings.iter().find(|e| e.dimension() != dimension) {
            return Err(DomainError::retrieval(format!(
                "embedding dimension {} does not match index dimension {dimension}",
                bad.dimension()
            )));
        }

        if state.manifest.is_none() {
            let manifest = Manifest {
                model: self.model.clone(),
                dimension,
            };
            self.write_manifest(&manifest)?;
            state.manifest = Some(manifest);
        }

        let entries: Vec<Entry> = chunks
            .iter()
            .cloned()
            .zip(embeddings.iter().cloned())
            .map(|(chunk, embedding)| Entry { chunk, embedding })
            .collect();
        self.append_entries(&entries)?;
        state.entries.extend(entries);
        Ok(())
    }

    async fn similarity_search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        check_top_k(top_k)?;
        let state = self.state.read().await;
        if let Some(manifest) = &state.manifest {
            if manifest.dimension != query.dimension() {
                return Err(DomainError::retrieval(format!(
                    "query dimension {} does not match index dimension {}",
                    query.dimension(),
                    manifest.dimension
                )));
            }
        }

        Ok(rank(
            query,
            state.entries.iter().map(|e| (&e.chunk, &e.embedding)),
            top_k,
        ))
    }

    async fn count(&self) -> Result<usize, DomainError> {
        Ok(self.state.read().await.entries.len())
    }

    async fn clear(&self) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        Self::remove_files(&self.dir)?;
        *state = State::default();
        tracing::info!(path = %self.dir.display(), "cleared vector store");
        Ok(())
    }
}
