use std::io::Cursor;
use std::sync::Arc;

use playgate_assets::{AssetLoader, InMemoryBundle, Resource};
use playgate_core::{AssetCategory, BundleManifest, BundlePayload, BundleTier, ManifestEntry};

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::new(width, height);
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

#[tokio::test]
async fn test_preload_partial_failure_does_not_abort_other_items() {
    let sprite = png(16, 16);
    let payload = BundlePayload::new(BundleManifest {
        entries: vec![ManifestEntry {
            path: "sprites/hero.png".into(),
            category: AssetCategory::Image,
            size: sprite.len() as u64,
        }],
    })
    .with_file("sprites/hero.png", sprite)
    .with_file("levels/one.json", br#"{"tiles": [1, 2, 3]}"#.to_vec())
    .with_file("broken.json", b"{not json".to_vec());

    let loader = AssetLoader::new(
        Arc::new(InMemoryBundle::from_payload(&payload)),
        BundleTier::Small,
    );

    let items = vec![
        (AssetCategory::Image, "sprites/hero.png".to_string()),
        (AssetCategory::Data, "broken.json".to_string()),
        (AssetCategory::Audio, "missing.ogg".to_string()),
        (AssetCategory::Data, "./levels/one.json".to_string()),
    ];
    let outcomes = loader.preload(&items).await;

    assert_eq!(outcomes.len(), 4);
    assert!(matches!(
        outcomes[0].result,
        Ok(Resource::Image { width: 16, height: 16, .. })
    ));
    assert!(outcomes[1].result.is_err());
    assert!(outcomes[2].result.is_err());
    assert!(outcomes[3].result.is_ok());
    assert_eq!(outcomes[3].path, "./levels/one.json");
}

#[tokio::test]
async fn test_directory_bundle_traversal_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.json"), b"[]").unwrap();

    let loader = AssetLoader::new(
        Arc::new(playgate_assets::DirectoryBundle::new(dir.path())),
        BundleTier::Medium,
    );
    assert!(loader.load(AssetCategory::Data, "a.json").await.is_ok());
    assert!(loader.load(AssetCategory::Data, "../a.json").await.is_err());
}
