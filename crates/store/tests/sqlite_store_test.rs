//! SQLite store tests against a temporary database file.

use chrono::Utc;

use playgate_core::traits::{ModuleStore, ScoreSink};
use playgate_core::types::{
    AssetCategory, BundleManifest, BundlePayload, BundleTier, Dimensionality, EndReason,
    ManifestEntry, ModuleRecord, Settlement, SharedCapability, Submission, SubmissionMetadata,
};
use playgate_core::Error;
use playgate_store::{SqliteModuleStore, SqliteScoreLedger};

fn bundled_record() -> ModuleRecord {
    let level = br#"{"rows": 3}"#.to_vec();
    let manifest = BundleManifest {
        entries: vec![ManifestEntry {
            path: "data/level.json".into(),
            category: AssetCategory::Data,
            size: level.len() as u64,
        }],
    };
    ModuleRecord::from_submission(
        Submission::inline("agent-7", "function init() {}", Dimensionality::ThreeD)
            .with_metadata(SubmissionMetadata {
                title: "Cubes".into(),
                description: "Stack cubes".into(),
                genre: "puzzle".into(),
            })
            .with_thumbnail(vec![1u8, 2, 3])
            .with_shared_capability(SharedCapability::Renderer3d)
            .with_bundle(
                BundleTier::Medium,
                BundlePayload::new(manifest).with_file("data/level.json", level),
            ),
    )
}

#[tokio::test]
async fn test_module_round_trip_with_assets() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteModuleStore::new(dir.path().join("modules.db")).unwrap();
    let record = bundled_record();
    store.save(&record).await.unwrap();

    let loaded = store.load(&record.id).await.unwrap().unwrap();
    assert_eq!(loaded.metadata, record.metadata);
    assert_eq!(loaded.mode, record.mode);
    assert_eq!(loaded.dimensionality, Dimensionality::ThreeD);
    assert_eq!(loaded.tier, Some(BundleTier::Medium));
    assert_eq!(loaded.shared_capabilities, record.shared_capabilities);
    assert_eq!(loaded.bundle, record.bundle);
    assert_eq!(loaded.thumbnail, record.thumbnail);
    assert_eq!(loaded.digest, record.digest);

    let summaries = store.list(10).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].asset_count, 1);
    assert_eq!(summaries[0].title, "Cubes");
}

#[tokio::test]
async fn test_save_replaces_and_delete_cascades() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("modules.db");
    let store = SqliteModuleStore::new(&path).unwrap();

    let mut record = bundled_record();
    store.save(&record).await.unwrap();
    record.metadata.title = "Cubes II".into();
    store.save(&record).await.unwrap();
    assert_eq!(
        store.load(&record.id).await.unwrap().unwrap().metadata.title,
        "Cubes II"
    );

    assert!(store.delete(&record.id).await.unwrap());
    assert!(!store.delete(&record.id).await.unwrap());
    assert!(store.load(&record.id).await.unwrap().is_none());

    // Reopen: the schema is idempotent and the data stays deleted.
    let reopened = SqliteModuleStore::new(&path).unwrap();
    assert!(reopened.list(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ledger_rejects_second_settlement() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = SqliteScoreLedger::new(dir.path().join("ledger.db")).unwrap();

    let settlement = Settlement {
        session_id: "s-1".into(),
        agent_id: "agent-7".into(),
        game_id: "g-1".into(),
        score: 42.0,
        reason: EndReason::IdleTimeout,
        settled_at: Utc::now(),
    };
    ledger.settle(&settlement).await.unwrap();

    let again = Settlement {
        score: 1_000.0,
        ..settlement.clone()
    };
    assert!(matches!(
        ledger.settle(&again).await,
        Err(Error::InvalidRequest(_))
    ));

    let board = ledger.leaderboard("g-1", 5).await.unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].score, 42.0);
    assert_eq!(board[0].reason, EndReason::IdleTimeout);
}
