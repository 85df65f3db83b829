//! Score store trait and implementations

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::record::{EntityScoreDocument, EntityScoreKey, TeamScoreDocument, TeamScoreKey};
use siphasher::sip::SipHasher13;
use std::collections::HashMap;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Persistence sink for computed scores
///
/// Every write is an upsert on the document's natural key: rewriting a key
/// replaces the previous document, it never appends a second one.
#[async_trait::async_trait]
pub trait ScoreStore: Send + Sync {
    /// Prepare the backend (create directories, run migrations)
    async fn initialize(&mut self) -> Result<()>;

    /// Upsert the authoritative score of one team for one period
    async fn upsert_team_score(&self, document: &TeamScoreDocument) -> Result<()>;

    /// Upsert a batch of entity score breakdowns
    async fn upsert_entity_scores(&self, documents: &[EntityScoreDocument]) -> Result<()>;

    /// Load a team score by key
    async fn load_team_score(&self, key: &TeamScoreKey) -> Result<Option<TeamScoreDocument>>;

    /// Load an entity score by key
    async fn load_entity_score(&self, key: &EntityScoreKey) -> Result<Option<EntityScoreDocument>>;

    /// All team scores stored for a period, ordered by team id
    async fn list_team_scores(&self, period: &str) -> Result<Vec<TeamScoreDocument>>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// In-memory score store (for testing and dry runs)
#[derive(Default)]
pub struct InMemoryScoreStore {
    team_scores: Arc<RwLock<HashMap<TeamScoreKey, TeamScoreDocument>>>,
    entity_scores: Arc<RwLock<HashMap<EntityScoreKey, EntityScoreDocument>>>,
}

impl InMemoryScoreStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored team score documents
    pub async fn team_score_count(&self) -> usize {
        self.team_scores.read().await.len()
    }

    /// Number of stored entity score documents
    pub async fn entity_score_count(&self) -> usize {
        self.entity_scores.read().await.len()
    }
}

#[async_trait::async_trait]
impl ScoreStore for InMemoryScoreStore {
    async fn initialize(&mut self) -> Result<()> {
        tracing::info!("In-memory score store initialized");
        Ok(())
    }

    async fn upsert_team_score(&self, document: &TeamScoreDocument) -> Result<()> {
        let mut scores = self.team_scores.write().await;
        scores.insert(document.key.clone(), document.clone());
        Ok(())
    }

    async fn upsert_entity_scores(&self, documents: &[EntityScoreDocument]) -> Result<()> {
        let mut scores = self.entity_scores.write().await;
        for document in documents {
            scores.insert(document.key.clone(), document.clone());
        }
        Ok(())
    }

    async fn load_team_score(&self, key: &TeamScoreKey) -> Result<Option<TeamScoreDocument>> {
        Ok(self.team_scores.read().await.get(key).cloned())
    }

    async fn load_entity_score(&self, key: &EntityScoreKey) -> Result<Option<EntityScoreDocument>> {
        Ok(self.entity_scores.read().await.get(key).cloned())
    }

    async fn list_team_scores(&self, period: &str) -> Result<Vec<TeamScoreDocument>> {
        let scores = self.team_scores.read().await;
        let mut documents: Vec<_> =
            scores.values().filter(|d| d.key.period == period).cloned().collect();
        documents.sort_by(|a, b| a.key.team_id.cmp(&b.key.team_id));
        Ok(documents)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Longest encoded key component kept verbatim as a file name
const MAX_STEM_LEN: usize = 200;

/// File-name form of a key component
///
/// Ids are percent-encoded (dots and tildes included, so `.`/`..` cannot
/// escape the directory). Components whose encoding is too long for a file
/// name become `~` plus a SipHash digest; `~` never appears in an encoding.
pub(crate) fn file_stem(value: &str) -> String {
    let encoded = urlencoding::encode(value).replace('.', "%2E").replace('~', "%7E");
    if encoded.is_empty() {
        "%".to_string()
    } else if encoded.len() > MAX_STEM_LEN {
        let mut hasher = SipHasher13::new_with_keys(0x5C0E_5709, 0xCA77_A1EA);
        hasher.write(value.as_bytes());
        format!("~{:016x}", hasher.finish())
    } else {
        encoded
    }
}

/// Local file-based score store: one JSON document per key
///
/// Layout: `team_scores/<period>/<team>.json` and
/// `entity_scores/<period>/<type>/<entity>.json`, each component passed
/// through `file_stem`. Any id the other backends accept is storable.
pub struct LocalScoreStore {
    config: StoreConfig,
    initialized: bool,
}

impl LocalScoreStore {
    /// Create a new local store
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate().map_err(StoreError::config)?;
        Ok(Self { config, initialized: false })
    }

    /// Create a new local store with default settings under `data_dir`
    pub fn with_default_config(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::new(StoreConfig::local(data_dir))
    }

    /// Base directory
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(StoreError::config("local score store not initialized"))
        }
    }

    fn team_path(&self, key: &TeamScoreKey) -> PathBuf {
        self.config
            .team_scores_dir()
            .join(file_stem(&key.period))
            .join(format!("{}.json", file_stem(&key.team_id)))
    }

    fn entity_path(&self, key: &EntityScoreKey) -> PathBuf {
        self.config
            .entity_scores_dir()
            .join(file_stem(&key.period))
            .join(file_stem(&key.entity_type))
            .join(format!("{}.json", file_stem(&key.entity_id)))
    }

    /// Write via a unique temp file and rename, so readers never see a torn document
    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let suffix = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.{suffix}.tmp", std::process::id()));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

#[async_trait::async_trait]
impl ScoreStore for LocalScoreStore {
    async fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        tokio::fs::create_dir_all(self.config.team_scores_dir()).await?;
        tokio::fs::create_dir_all(self.config.entity_scores_dir()).await?;

        self.initialized = true;

        tracing::info!("Local score store initialized at: {:?}", self.config.data_dir);

        Ok(())
    }

    async fn upsert_team_score(&self, document: &TeamScoreDocument) -> Result<()> {
        self.ensure_initialized()?;
        let path = self.team_path(&document.key);
        let bytes = serde_json::to_vec_pretty(document)?;
        Self::write_atomic(&path, &bytes).await
    }

    async fn upsert_entity_scores(&self, documents: &[EntityScoreDocument]) -> Result<()> {
        self.ensure_initialized()?;

        for document in documents {
            let bytes = serde_json::to_vec_pretty(document)?;
            Self::write_atomic(&self.entity_path(&document.key), &bytes).await?;
        }

        Ok(())
    }

    async fn load_team_score(&self, key: &TeamScoreKey) -> Result<Option<TeamScoreDocument>> {
        self.ensure_initialized()?;
        Self::read_document(&self.team_path(key)).await
    }

    async fn load_entity_score(&self, key: &EntityScoreKey) -> Result<Option<EntityScoreDocument>> {
        self.ensure_initialized()?;
        Self::read_document(&self.entity_path(key)).await
    }

    async fn list_team_scores(&self, period: &str) -> Result<Vec<TeamScoreDocument>> {
        self.ensure_initialized()?;
        let dir = self.config.team_scores_dir().join(file_stem(period));
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(document) = Self::read_document::<TeamScoreDocument>(&path).await? {
                documents.push(document);
            }
        }

        documents.sort_by(|a, b| a.key.team_id.cmp(&b.key.team_id));
        Ok(documents)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
