//! SQLite-backed module store and score ledger.
//!
//! Module rows hold the source and metadata; bundle resources live in a
//! separate `module_assets` table keyed by `(module_id, path)`.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use playgate_core::{
    traits::{ModuleStore, ScoreSink},
    types::{
        BundleManifest, BundlePayload, BundleTier, Dimensionality, EndReason, ModuleRecord,
        ModuleSummary, Settlement, SharedCapability, SourceMode, SubmissionMetadata,
    },
    Error, Result,
};

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> Error + '_ {
    move |e| Error::storage(format!("{}: {}", context, e))
}

fn join_err(e: tokio::task::JoinError) -> Error {
    Error::internal(format!("storage task failed: {}", e))
}

fn open(path: &Path, schema: &str) -> Result<Connection> {
    let conn = Connection::open(path).map_err(db_err("open"))?;
    // Module store and ledger may share one file.
    conn.busy_timeout(Duration::from_secs(5))
        .map_err(db_err("busy_timeout"))?;
    conn.execute_batch(schema).map_err(db_err("schema"))?;
    Ok(conn)
}

// =============================================================================
// Module Store
// =============================================================================

const MODULE_SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS modules (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        genre TEXT NOT NULL,
        mode TEXT NOT NULL,
        dimensionality TEXT NOT NULL,
        tier TEXT,
        capabilities TEXT NOT NULL, -- JSON array
        source TEXT NOT NULL,
        thumbnail BLOB,
        manifest TEXT,              -- JSON, bundles only
        digest TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_modules_created ON modules (created_at);
    CREATE TABLE IF NOT EXISTS module_assets (
        module_id TEXT NOT NULL REFERENCES modules (id) ON DELETE CASCADE,
        path TEXT NOT NULL,
        data BLOB NOT NULL,
        PRIMARY KEY (module_id, path)
    );
";

/// Persistent module store.
pub struct SqliteModuleStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteModuleStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = open(path.as_ref(), MODULE_SCHEMA)?;
        tracing::info!(path = %path.as_ref().display(), "SQLite module store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// Columns of a `modules` row before conversion.
struct ModuleRow {
    id: String,
    agent_id: String,
    title: String,
    description: String,
    genre: String,
    mode: String,
    dimensionality: String,
    tier: Option<String>,
    capabilities: String,
    source: String,
    thumbnail: Option<Vec<u8>>,
    manifest: Option<String>,
    digest: String,
    created_at: String,
}

impl ModuleRow {
    fn into_record(self, files: BTreeMap<String, Bytes>) -> Result<ModuleRecord> {
        let corrupt = |what: &str, e: String| {
            Error::storage(format!("module {} has invalid {}: {}", self.id, what, e))
        };
        let shared_capabilities: BTreeSet<SharedCapability> =
            serde_json::from_str(&self.capabilities).map_err(|e| corrupt("capabilities", e.to_string()))?;
        let bundle = match &self.manifest {
            Some(json) => {
                let manifest: BundleManifest =
                    serde_json::from_str(json).map_err(|e| corrupt("manifest", e.to_string()))?;
                Some(BundlePayload { manifest, files })
            }
            None => None,
        };
        Ok(ModuleRecord {
            mode: self
                .mode
                .parse::<SourceMode>()
                .map_err(|e| corrupt("mode", e))?,
            dimensionality: self
                .dimensionality
                .parse::<Dimensionality>()
                .map_err(|e| corrupt("dimensionality", e))?,
            tier: self
                .tier
                .as_deref()
                .map(str::parse::<BundleTier>)
                .transpose()
                .map_err(|e| corrupt("tier", e))?,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .map_err(|e| corrupt("created_at", e.to_string()))?
                .with_timezone(&Utc),
            metadata: SubmissionMetadata {
                title: self.title,
                description: self.description,
                genre: self.genre,
            },
            shared_capabilities,
            bundle,
            thumbnail: self.thumbnail.map(Bytes::from),
            id: self.id,
            agent_id: self.agent_id,
            source: self.source,
            digest: self.digest,
        })
    }
}

const SELECT_MODULE: &str = "SELECT id, agent_id, title, description, genre, mode, dimensionality,
    tier, capabilities, source, thumbnail, manifest, digest, created_at FROM modules";

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ModuleRow> {
    Ok(ModuleRow {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        genre: row.get(4)?,
        mode: row.get(5)?,
        dimensionality: row.get(6)?,
        tier: row.get(7)?,
        capabilities: row.get(8)?,
        source: row.get(9)?,
        thumbnail: row.get(10)?,
        manifest: row.get(11)?,
        digest: row.get(12)?,
        created_at: row.get(13)?,
    })
}

#[async_trait]
impl ModuleStore for SqliteModuleStore {
    async fn save(&self, record: &ModuleRecord) -> Result<()> {
        let conn = self.conn.clone();
        let record = record.clone();
        let capabilities = serde_json::to_string(&record.shared_capabilities)?;
        let manifest = record
            .bundle
            .as_ref()
            .map(|b| serde_json::to_string(&b.manifest))
            .transpose()?;

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            let tx = conn.transaction().map_err(db_err("begin"))?;
            tx.execute("DELETE FROM modules WHERE id = ?1", params![record.id])
                .map_err(db_err("replace"))?;
            tx.execute(
                "INSERT INTO modules (id, agent_id, title, description, genre, mode, dimensionality,
                    tier, capabilities, source, thumbnail, manifest, digest, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    record.id,
                    record.agent_id,
                    record.metadata.title,
                    record.metadata.description,
                    record.metadata.genre,
                    record.mode.as_str(),
                    record.dimensionality.as_str(),
                    record.tier.map(|t| t.as_str()),
                    capabilities,
                    record.source,
                    record.thumbnail.as_deref(),
                    manifest,
                    record.digest,
                    record.created_at.to_rfc3339(),
                ],
            )
            .map_err(db_err("insert module"))?;

            if let Some(bundle) = &record.bundle {
                let mut stmt = tx
                    .prepare("INSERT INTO module_assets (module_id, path, data) VALUES (?1, ?2, ?3)")
                    .map_err(db_err("prepare asset insert"))?;
                for (path, data) in &bundle.files {
                    stmt.execute(params![record.id, path, data.as_ref()])
                        .map_err(db_err("insert asset"))?;
                }
            }
            tx.commit().map_err(db_err("commit"))?;
            tracing::debug!(game_id = %record.id, "Module persisted");
            Ok(())
        })
        .await
        .map_err(join_err)?
    }

    async fn load(&self, id: &str) -> Result<Option<ModuleRecord>> {
        let conn = self.conn.clone();
        let id = id.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let row = conn
                .query_row(&format!("{} WHERE id = ?1", SELECT_MODULE), params![id], read_row)
                .optional()
                .map_err(db_err("load module"))?;
            let Some(row) = row else {
                return Ok(None);
            };

            let mut files = BTreeMap::new();
            if row.manifest.is_some() {
                let mut stmt = conn
                    .prepare("SELECT path, data FROM module_assets WHERE module_id = ?1")
                    .map_err(db_err("prepare asset query"))?;
                let assets = stmt
                    .query_map(params![id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, Vec<u8>>(1)?)))
                    .map_err(db_err("query assets"))?;
                for asset in assets {
                    let (path, data) = asset.map_err(db_err("read asset"))?;
                    files.insert(path, Bytes::from(data));
                }
            }
            row.into_record(files).map(Some)
        })
        .await
        .map_err(join_err)?
    }

    async fn list(&self, limit: usize) -> Result<Vec<ModuleSummary>> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&format!("{} ORDER BY created_at DESC LIMIT ?1", SELECT_MODULE))
                .map_err(db_err("prepare list"))?;
            let rows = stmt
                .query_map(params![limit as i64], read_row)
                .map_err(db_err("list modules"))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err("read module"))?;

            // Summaries need the asset count only, which the manifest carries.
            rows.into_iter()
                .map(|row| row.into_record(BTreeMap::new()).map(|r| r.summary()))
                .collect()
        })
        .await
        .map_err(join_err)?
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn.clone();
        let id = id.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let removed = conn
                .execute("DELETE FROM modules WHERE id = ?1", params![id])
                .map_err(db_err("delete module"))?;
            Ok(removed > 0)
        })
        .await
        .map_err(join_err)?
    }
}

// =============================================================================
// Score Ledger
// =============================================================================

const LEDGER_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS settlements (
        session_id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        game_id TEXT NOT NULL,
        score REAL NOT NULL,
        reason TEXT NOT NULL,
        settled_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_settlements_game ON settlements (game_id, score DESC);
";

/// Persistent score ledger. The primary key on `session_id` makes a second
/// settlement of the same session fail.
pub struct SqliteScoreLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteScoreLedger {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = open(path.as_ref(), LEDGER_SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Highest settled scores for a game, best first.
    pub async fn leaderboard(&self, game_id: &str, limit: usize) -> Result<Vec<Settlement>> {
        let conn = self.conn.clone();
        let game_id = game_id.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, agent_id, game_id, score, reason, settled_at
                     FROM settlements WHERE game_id = ?1 ORDER BY score DESC LIMIT ?2",
                )
                .map_err(db_err("prepare leaderboard"))?;
            let rows = stmt
                .query_map(params![game_id, limit as i64], |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, f64>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, String>(5)?,
                    ))
                })
                .map_err(db_err("query leaderboard"))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err("read settlement"))?;

            rows.into_iter()
                .map(|(session_id, agent_id, game_id, score, reason, settled_at)| -> Result<Settlement> {
                    let reason: EndReason = serde_json::from_value(serde_json::Value::String(reason))?;
                    let settled_at = DateTime::parse_from_rfc3339(&settled_at)
                        .map_err(|e| Error::storage(format!("invalid settled_at: {}", e)))?
                        .with_timezone(&Utc);
                    Ok(Settlement {
                        session_id,
                        agent_id,
                        game_id,
                        score,
                        reason,
                        settled_at,
                    })
                })
                .collect()
        })
        .await
        .map_err(join_err)?
    }
}

#[async_trait]
impl ScoreSink for SqliteScoreLedger {
    async fn settle(&self, settlement: &Settlement) -> Result<()> {
        let conn = self.conn.clone();
        let s = settlement.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO settlements (session_id, agent_id, game_id, score, reason, settled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    s.session_id,
                    s.agent_id,
                    s.game_id,
                    s.score,
                    s.reason.to_string(),
                    s.settled_at.to_rfc3339(),
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Error::invalid_request(format!("session {} is already settled", s.session_id))
                }
                other => Error::storage(format!("insert settlement: {}", other)),
            })?;
            Ok(())
        })
        .await
        .map_err(join_err)?
    }
}
