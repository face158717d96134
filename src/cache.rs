//! Content-addressed on-disk cache of built retrieval sessions.
//!
//! Each cache entry is one directory named by a 12-hex-char key derived from
//! the source identifier and document text. An entry holds exactly four
//! artifacts: `chunks.txt` (one chunk per line), `embeddings.bin`,
//! `index.bin`, and `metadata.json`. An entry is either fully present or
//! treated as absent — partial or corrupt entries report absent so the engine
//! rebuilds. Entries are never mutated in place; a rebuild stages a fresh
//! directory and renames it over the old one.
//!
//! A store-wide `file_mapping.json` registry mirrors per-entry metadata for
//! listing. It is a best-effort listing aid, not the source of truth: the
//! artifacts decide whether an entry exists.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::document::CacheMetadata;
use crate::error::{Result, RetrievalError};
use crate::index::{EmbeddingMatrix, FlatL2Index};

const REGISTRY_FILE: &str = "file_mapping.json";
const CHUNKS_FILE: &str = "chunks.txt";
const EMBEDDINGS_FILE: &str = "embeddings.bin";
const INDEX_FILE: &str = "index.bin";
const METADATA_FILE: &str = "metadata.json";

/// Hex characters kept from the digest. Must stay fixed: keys are directory
/// names and appear in the registry and legacy filenames.
const KEY_LEN: usize = 12;

/// Suffix of the staging directory used for all-or-nothing publication.
const STAGING_SUFFIX: &str = ".staging";

/// Legacy flat-file artifact names: `{key}{suffix}` loose at the cache root.
const LEGACY_SUFFIXES: [(&str, &str); 3] = [
    ("_chunks.txt", CHUNKS_FILE),
    ("_embeds.bin", EMBEDDINGS_FILE),
    ("_index.bin", INDEX_FILE),
];

/// The artifacts of one cache entry, loaded and validated.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Chunk texts in document order.
    pub chunks: Vec<String>,
    /// The embedding matrix, row `i` belonging to `chunks[i]`.
    pub embeddings: EmbeddingMatrix,
    /// The vector index built over the matrix.
    pub index: FlatL2Index,
    /// Entry metadata.
    pub metadata: CacheMetadata,
}

/// On-disk store of built retrieval sessions.
pub struct CacheStore {
    root: PathBuf,
    registry: RwLock<HashMap<String, CacheMetadata>>,
}

impl CacheStore {
    /// Open (and create if needed) a cache store rooted at `root`.
    ///
    /// Performs the one-time legacy flat-file migration, then reconciles the
    /// registry against the entries actually on disk.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let mut registry = load_registry(&root).await;
        migrate_legacy_layout(&root, &registry).await?;

        // Drop registry rows whose artifacts are gone; best-effort, the
        // artifacts are the source of truth.
        let mut dangling = Vec::new();
        for key in registry.keys() {
            if !entry_complete(&root.join(key)).await {
                dangling.push(key.clone());
            }
        }
        if !dangling.is_empty() {
            warn!(count = dangling.len(), "dropping registry rows without artifacts");
            for key in &dangling {
                registry.remove(key);
            }
            persist_registry(&root, &registry).await?;
        }

        debug!(root = %root.display(), entries = registry.len(), "opened cache store");
        Ok(Self { root, registry: RwLock::new(registry) })
    }

    /// Derive the cache key for a (source id, document content) pair.
    ///
    /// Stable across calls and processes; different content under the same
    /// source id produces a different key with overwhelming probability.
    pub fn key_for(source_id: &str, content: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(source_id.as_bytes());
        hasher.update(b"_");
        hasher.update(content.as_bytes());
        hasher.finalize().to_hex().as_str()[..KEY_LEN].to_string()
    }

    fn entry_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Whether a complete entry exists for `key`.
    pub async fn exists(&self, key: &str) -> bool {
        entry_complete(&self.entry_dir(key)).await
    }

    /// Load the entry for `key`, or `None` if it is absent, incomplete,
    /// corrupt, or internally inconsistent. Corruption is not an error here:
    /// the caller's recovery is always the same — rebuild.
    pub async fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let dir = self.entry_dir(key);

        let Ok(chunks_raw) = fs::read_to_string(dir.join(CHUNKS_FILE)).await else {
            return Ok(None);
        };
        let Ok(embeddings_raw) = fs::read(dir.join(EMBEDDINGS_FILE)).await else {
            return Ok(None);
        };
        let Ok(index_raw) = fs::read(dir.join(INDEX_FILE)).await else {
            return Ok(None);
        };
        let Ok(metadata_raw) = fs::read_to_string(dir.join(METADATA_FILE)).await else {
            return Ok(None);
        };

        let chunks: Vec<String> = chunks_raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        let embeddings = match EmbeddingMatrix::from_bytes(&embeddings_raw) {
            Ok(matrix) => matrix,
            Err(e) => {
                warn!(key, error = %e, "corrupt embeddings artifact; treating entry as absent");
                return Ok(None);
            }
        };
        let index = match FlatL2Index::from_bytes(&index_raw) {
            Ok(index) => index,
            Err(e) => {
                warn!(key, error = %e, "corrupt index artifact; treating entry as absent");
                return Ok(None);
            }
        };
        let metadata: CacheMetadata = match serde_json::from_str(&metadata_raw) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(key, error = %e, "corrupt metadata artifact; treating entry as absent");
                return Ok(None);
            }
        };

        let consistent = chunks.len() == embeddings.rows()
            && index.len() == embeddings.rows()
            && index.dim() == embeddings.dim()
            && metadata.chunk_count == chunks.len();
        if !consistent {
            warn!(
                key,
                chunk_count = chunks.len(),
                matrix_rows = embeddings.rows(),
                index_len = index.len(),
                "inconsistent cache entry; treating as absent"
            );
            return Ok(None);
        }

        debug!(key, chunk_count = chunks.len(), "loaded cache entry");
        Ok(Some(CacheEntry { chunks, embeddings, index, metadata }))
    }

    /// Persist a freshly built entry under `key`.
    ///
    /// Artifacts are written to a staging directory and renamed into place,
    /// so readers never observe a partially written entry and a failed or
    /// timed-out build leaves nothing behind at the final path.
    pub async fn save(
        &self,
        key: &str,
        chunks: &[String],
        embeddings: &EmbeddingMatrix,
        index: &FlatL2Index,
        metadata: &CacheMetadata,
    ) -> Result<()> {
        let staging = self.root.join(format!("{key}{STAGING_SUFFIX}"));
        let _ = fs::remove_dir_all(&staging).await;
        fs::create_dir_all(&staging).await?;

        // One chunk per line; embedded newlines are normalized to spaces to
        // preserve the line-per-chunk framing.
        let mut chunk_lines = String::new();
        for chunk in chunks {
            chunk_lines.push_str(&chunk.replace(['\n', '\r'], " "));
            chunk_lines.push('\n');
        }
        fs::write(staging.join(CHUNKS_FILE), chunk_lines).await?;
        fs::write(staging.join(EMBEDDINGS_FILE), embeddings.to_bytes()).await?;
        fs::write(staging.join(INDEX_FILE), index.to_bytes()).await?;
        let metadata_json = serde_json::to_vec_pretty(metadata)
            .map_err(|e| RetrievalError::Cache(format!("failed to encode metadata: {e}")))?;
        fs::write(staging.join(METADATA_FILE), metadata_json).await?;

        let dir = self.entry_dir(key);
        let _ = fs::remove_dir_all(&dir).await;
        fs::rename(&staging, &dir).await?;

        let mut registry = self.registry.write().await;
        registry.insert(key.to_string(), metadata.clone());
        persist_registry(&self.root, &registry).await?;

        info!(key, chunk_count = chunks.len(), "persisted cache entry");
        Ok(())
    }

    /// Delete the entry for `key`. Returns whether anything was removed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let dir = self.entry_dir(key);
        let existed_on_disk = match fs::remove_dir_all(&dir).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                return Err(RetrievalError::Cache(format!(
                    "failed to delete entry {key}: {e}"
                )));
            }
        };

        let mut registry = self.registry.write().await;
        let existed_in_registry = registry.remove(key).is_some();
        if existed_in_registry {
            persist_registry(&self.root, &registry).await?;
        }

        if existed_on_disk {
            info!(key, "deleted cache entry");
        }
        Ok(existed_on_disk || existed_in_registry)
    }

    /// List metadata for all registered entries.
    pub async fn list(&self) -> Vec<CacheMetadata> {
        let registry = self.registry.read().await;
        let mut entries: Vec<CacheMetadata> = registry.values().cloned().collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        entries
    }

    /// Find the entry registered for `source_filename`, if any.
    pub async fn find_by_filename(&self, source_filename: &str) -> Option<CacheMetadata> {
        let registry = self.registry.read().await;
        registry.values().find(|m| m.source_filename == source_filename).cloned()
    }

    /// Remove entry directories not present in the registry, and stray loose
    /// files at the cache root other than the registry itself (for example
    /// legacy artifacts the migration could not claim). Explicit maintenance
    /// call, not run automatically. Returns the number removed.
    pub async fn cleanup_orphans(&self) -> Result<usize> {
        let registry = self.registry.read().await;
        let mut removed = 0;

        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() {
                if registry.contains_key(&name) {
                    continue;
                }
                warn!(entry = %name, "removing orphaned cache directory");
                fs::remove_dir_all(entry.path()).await?;
                removed += 1;
            } else if name != REGISTRY_FILE {
                warn!(entry = %name, "removing stray cache file");
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

async fn entry_complete(dir: &Path) -> bool {
    for file in [CHUNKS_FILE, EMBEDDINGS_FILE, INDEX_FILE, METADATA_FILE] {
        if !fs::try_exists(dir.join(file)).await.unwrap_or(false) {
            return false;
        }
    }
    true
}

async fn load_registry(root: &Path) -> HashMap<String, CacheMetadata> {
    let path = root.join(REGISTRY_FILE);
    match fs::read_to_string(&path).await {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(registry) => registry,
            Err(e) => {
                warn!(error = %e, "registry file unreadable; starting empty");
                HashMap::new()
            }
        },
        Err(_) => HashMap::new(),
    }
}

async fn persist_registry(root: &Path, registry: &HashMap<String, CacheMetadata>) -> Result<()> {
    let encoded = serde_json::to_vec_pretty(registry)
        .map_err(|e| RetrievalError::Cache(format!("failed to encode registry: {e}")))?;
    fs::write(root.join(REGISTRY_FILE), encoded).await?;
    Ok(())
}

/// One-time reconciliation: move loose `{key}_chunks.txt`-style artifacts
/// from an earlier cache generation into per-key entry directories. When the
/// registry still has the key's metadata, `metadata.json` is restored from it
/// so the migrated entry is complete.
async fn migrate_legacy_layout(
    root: &Path,
    registry: &HashMap<String, CacheMetadata>,
) -> Result<()> {
    let mut migrated_keys = Vec::new();

    let mut dir = fs::read_dir(root).await?;
    while let Some(entry) = dir.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some((key, canonical)) = LEGACY_SUFFIXES.iter().find_map(|(suffix, canonical)| {
            name.strip_suffix(suffix).map(|key| (key.to_string(), *canonical))
        }) else {
            continue;
        };
        if key.len() != KEY_LEN || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            continue;
        }

        let target_dir = root.join(&key);
        fs::create_dir_all(&target_dir).await?;
        let target = target_dir.join(canonical);
        if fs::try_exists(&target).await.unwrap_or(false) {
            continue;
        }
        fs::rename(entry.path(), &target).await?;
        if !migrated_keys.contains(&key) {
            migrated_keys.push(key);
        }
    }

    for key in &migrated_keys {
        let metadata_path = root.join(key).join(METADATA_FILE);
        if let Some(metadata) = registry.get(key) {
            if !fs::try_exists(&metadata_path).await.unwrap_or(false) {
                let encoded = serde_json::to_vec_pretty(metadata).map_err(|e| {
                    RetrievalError::Cache(format!("failed to encode metadata: {e}"))
                })?;
                fs::write(metadata_path, encoded).await?;
            }
        }
    }

    if !migrated_keys.is_empty() {
        info!(entries = migrated_keys.len(), "migrated legacy cache artifacts");
    }
    Ok(())
}
