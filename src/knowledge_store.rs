//! Embedding-indexed knowledge repository.
//!
//! Two typed collections (UI navigation patterns, material presets) persisted
//! as pretty JSON files under the storage dir and cached in memory. Search is
//! a brute-force cosine scan; collections are small and read-mostly, writes
//! (seeding, explicit adds) are rare and coarsely serialized.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::llm_gateway::LanguageBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    UiPatterns,
    Materials,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::UiPatterns => "ui_patterns",
            Collection::Materials => "materials",
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            Collection::UiPatterns => "ui-patterns.json",
            Collection::Materials => "materials.json",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ui_patterns" | "ui_pattern" => Some(Collection::UiPatterns),
            "materials" | "material" => Some(Collection::Materials),
            _ => None,
        }
    }
}

const ALL_COLLECTIONS: [Collection; 2] = [Collection::UiPatterns, Collection::Materials];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// A search result with the entry's embedding stripped and similarity
/// reported as a distance in [0, 2].
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub tags: HashMap<String, String>,
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStats {
    pub ui_patterns: usize,
    pub materials: usize,
    pub total: usize,
}

/// Cosine similarity, defined as 0 for zero-norm or mismatched-length
/// vectors so it never propagates NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

pub struct KnowledgeStore {
    dir: PathBuf,
    collections: RwLock<HashMap<Collection, Vec<KnowledgeEntry>>>,
    embedder: Arc<dyn LanguageBackend>,
}

impl KnowledgeStore {
    /// Open the store, loading existing collection files from `dir` (created
    /// on demand).
    pub fn open(dir: impl Into<PathBuf>, embedder: Arc<dyn LanguageBackend>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut collections = HashMap::new();
        for collection in ALL_COLLECTIONS {
            let path = dir.join(collection.file_name());
            let entries = if path.exists() {
                let raw = fs::read_to_string(&path)?;
                serde_json::from_str(&raw)
                    .map_err(|e| AppError::Storage(format!("corrupt {}: {}", collection.as_str(), e)))?
            } else {
                Vec::new()
            };
            collections.insert(collection, entries);
        }

        Ok(Self {
            dir,
            collections: RwLock::new(collections),
            embedder,
        })
    }

    /// Embed `text` and upsert the entry by id.
    pub async fn add(
        &self,
        collection: Collection,
        id: &str,
        text: &str,
        tags: HashMap<String, String>,
    ) -> Result<()> {
        let embedding = self.embedder.embed(text).await?;
        self.upsert(
            collection,
            KnowledgeEntry {
                id: id.to_string(),
                text: text.to_string(),
                embedding,
                tags,
            },
        )
        .await
    }

    /// Upsert an entry whose embedding was computed elsewhere.
    pub async fn upsert(&self, collection: Collection, entry: KnowledgeEntry) -> Result<()> {
        let mut guard = self.collections.write().await;
        let entries = guard.entry(collection).or_default();
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        self.persist(collection, entries)
    }

    /// Top-`k` entries by descending cosine similarity to `query`, ties
    /// broken by insertion order. `k == 0` and empty collections yield an
    /// empty result. An optional `(tag, value)` filter restricts candidates
    /// before scoring.
    pub async fn search(
        &self,
        collection: Collection,
        query: &str,
        k: usize,
        tag_filter: Option<(&str, &str)>,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let guard = self.collections.read().await;
        let entries = match guard.get(&collection) {
            Some(e) if !e.is_empty() => e,
            _ => return Ok(Vec::new()),
        };

        let query_embedding = self.embedder.embed(query).await?;

        let mut scored: Vec<(&KnowledgeEntry, f32)> = entries
            .iter()
            .filter(|e| match tag_filter {
                Some((tag, value)) => e.tags.get(tag).map(String::as_str) == Some(value),
                None => true,
            })
            .map(|e| (e, cosine_similarity(&query_embedding, &e.embedding)))
            .collect();

        // Stable sort keeps insertion order for equal similarities.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(entry, sim)| SearchHit {
                id: entry.id.clone(),
                text: entry.text.clone(),
                tags: entry.tags.clone(),
                distance: (1.0 - sim).clamp(0.0, 2.0),
            })
            .collect())
    }

    /// Remove every entry in the collection. Idempotent.
    pub async fn clear(&self, collection: Collection) -> Result<()> {
        let mut guard = self.collections.write().await;
        let entries = guard.entry(collection).or_default();
        entries.clear();
        self.persist(collection, entries)
    }

    pub async fn stats(&self) -> KnowledgeStats {
        let guard = self.collections.read().await;
        let ui_patterns = guard.get(&Collection::UiPatterns).map_or(0, Vec::len);
        let materials = guard.get(&Collection::Materials).map_or(0, Vec::len);
        KnowledgeStats {
            ui_patterns,
            materials,
            total: ui_patterns + materials,
        }
    }

    /// Load the built-in seed corpus into any empty collection. Individual
    /// embedding failures skip seeding rather than fail startup.
    pub async fn seed_defaults(&self) -> Result<usize> {
        let mut seeded = 0;

        if self.count(Collection::UiPatterns).await == 0 {
            for seed in crate::seed_data::ui_patterns() {
                let mut tags = HashMap::new();
                tags.insert("page".to_string(), seed.page.to_string());
                tags.insert("selector".to_string(), seed.selector.to_string());
                tags.insert("category".to_string(), seed.category.to_string());
                match self
                    .add(Collection::UiPatterns, seed.id, seed.description, tags)
                    .await
                {
                    Ok(()) => seeded += 1,
                    Err(e) => warn!(id = seed.id, error = %e, "skipping seed entry"),
                }
            }
        }

        if self.count(Collection::Materials).await == 0 {
            for seed in crate::seed_data::materials() {
                let mut tags = HashMap::new();
                tags.insert("name".to_string(), seed.name.to_string());
                tags.insert("type".to_string(), seed.kind.to_string());
                tags.insert("color".to_string(), seed.color.to_string());
                tags.insert("source".to_string(), "manual-seed".to_string());
                match self
                    .add(Collection::Materials, seed.id, seed.description, tags)
                    .await
                {
                    Ok(()) => seeded += 1,
                    Err(e) => warn!(id = seed.id, error = %e, "skipping seed entry"),
                }
            }
        }

        if seeded > 0 {
            info!(seeded, "seeded knowledge store defaults");
        }
        Ok(seeded)
    }

    async fn count(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .await
            .get(&collection)
            .map_or(0, Vec::len)
    }

    fn persist(&self, collection: Collection, entries: &[KnowledgeEntry]) -> Result<()> {
        let path = self.dir.join(collection.file_name());
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| AppError::Storage(e.to_string()))?;
        fs::write(&path, json)?;
        Ok(())
    }
}
