//! Memory store
//!
//! The engine talks to memory through the [`MemoryStore`] trait only; the
//! persistence schema belongs to external collaborators. The in-memory
//! implementation scores entries by term overlap with exponential time
//! decay and can snapshot itself to a JSONL file for the CLI.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::generate_id;

/// One remembered fact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A recalled entry with its relevance score
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub entry: MemoryEntry,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    pub entries: usize,
    pub recalls: u64,
    pub stores: u64,
}

/// Recall/store interface the engine depends on
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn recall(&self, query: &str, limit: usize) -> eyre::Result<Vec<MemoryHit>>;

    async fn store(&self, text: String, tags: Vec<String>) -> eyre::Result<String>;

    async fn stats(&self) -> MemoryStats;

    async fn clear(&self) -> eyre::Result<usize>;
}

/// Store that remembers nothing (memory disabled)
pub struct DisabledMemory;

#[async_trait]
impl MemoryStore for DisabledMemory {
    async fn recall(&self, _query: &str, _limit: usize) -> eyre::Result<Vec<MemoryHit>> {
        Ok(Vec::new())
    }

    async fn store(&self, _text: String, _tags: Vec<String>) -> eyre::Result<String> {
        Ok(String::new())
    }

    async fn stats(&self) -> MemoryStats {
        MemoryStats::default()
    }

    async fn clear(&self) -> eyre::Result<usize> {
        Ok(0)
    }
}

struct InMemoryInner {
    entries: Vec<MemoryEntry>,
    recalls: u64,
    stores: u64,
}

/// Term-overlap store with half-life decay and optional JSONL snapshot
pub struct InMemoryStore {
    half_life_days: f64,
    /// When set, entries are loaded from and saved to this file
    snapshot_path: Option<PathBuf>,
    inner: Mutex<InMemoryInner>,
}

impl InMemoryStore {
    pub fn new(half_life_days: f64) -> Self {
        Self {
            half_life_days: half_life_days.max(0.01),
            snapshot_path: None,
            inner: Mutex::new(InMemoryInner {
                entries: Vec::new(),
                recalls: 0,
                stores: 0,
            }),
        }
    }

    /// Store backed by a JSONL snapshot file, loaded now and saved on writes
    pub fn with_snapshot(half_life_days: f64, path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut entries = Vec::new();
        if path.exists() {
            for line in std::fs::read_to_string(&path)?.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<MemoryEntry>(line) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!(error = %e, "skipping unparseable memory line"),
                }
            }
        }
        debug!(count = entries.len(), ?path, "memory snapshot loaded");

        Ok(Self {
            half_life_days: half_life_days.max(0.01),
            snapshot_path: Some(path),
            inner: Mutex::new(InMemoryInner {
                entries,
                recalls: 0,
                stores: 0,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn save_snapshot(&self, entries: &[MemoryEntry]) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let mut body = String::new();
        for entry in entries {
            match serde_json::to_string(entry) {
                Ok(line) => {
                    body.push_str(&line);
                    body.push('\n');
                }
                Err(e) => warn!(error = %e, "failed to serialize memory entry"),
            }
        }
        if let Err(e) = std::fs::write(path, body) {
            warn!(error = %e, ?path, "failed to save memory snapshot");
        }
    }

    fn score(&self, entry: &MemoryEntry, query_terms: &[&str], now: DateTime<Utc>) -> f64 {
        let text = entry.text.to_lowercase();
        let matched = query_terms.iter().filter(|t| text.contains(**t)).count();
        if matched == 0 {
            return 0.0;
        }
        let overlap = matched as f64 / query_terms.len() as f64;

        let age_days = (now - entry.created_at).num_seconds().max(0) as f64 / 86_400.0;
        let decay = 0.5_f64.powf(age_days / self.half_life_days);

        overlap * decay
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn recall(&self, query: &str, limit: usize) -> eyre::Result<Vec<MemoryHit>> {
        let lower = query.to_lowercase();
        let terms: Vec<&str> = lower.split_whitespace().filter(|t| t.len() > 2).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut inner = self.lock();
        inner.recalls += 1;

        let mut hits: Vec<MemoryHit> = inner
            .entries
            .iter()
            .map(|entry| MemoryHit {
                score: self.score(entry, &terms, now),
                entry: entry.clone(),
            })
            .filter(|hit| hit.score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);

        debug!(query, hits = hits.len(), "memory recall");
        Ok(hits)
    }

    async fn store(&self, text: String, tags: Vec<String>) -> eyre::Result<String> {
        let entry = MemoryEntry {
            id: generate_id("mem", &text),
            text,
            tags,
            created_at: Utc::now(),
        };
        let id = entry.id.clone();

        let entries_snapshot = {
            let mut inner = self.lock();
            inner.stores += 1;
            inner.entries.push(entry);
            inner.entries.clone()
        };
        self.save_snapshot(&entries_snapshot);
        Ok(id)
    }

    async fn stats(&self) -> MemoryStats {
        let inner = self.lock();
        MemoryStats {
            entries: inner.entries.len(),
            recalls: inner.recalls,
            stores: inner.stores,
        }
    }

    async fn clear(&self) -> eyre::Result<usize> {
        let removed = {
            let mut inner = self.lock();
            let removed = inner.entries.len();
            inner.entries.clear();
            removed
        };
        self.save_snapshot(&[]);
        Ok(removed)
    }
}
