//! Submission intake: multipart parsing, quota, validation, persistence.

use axum::extract::Multipart;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use playgate_core::{
    BundleManifest, BundlePayload, BundleTier, Dimensionality, Error, LimitKind, ModuleRecord,
    ModuleStore, RateLimiter, Result, SharedCapability, SourceMode, Submission,
    SubmissionMetadata,
};
use playgate_governance::track_validation;
use playgate_validator::Validator;

/// Multipart part prefix for bundle resources (`asset:<path>`).
pub const ASSET_PART_PREFIX: &str = "asset:";

/// Accepts submissions and promotes passing ones to module records.
pub struct SubmissionService {
    validator: Validator,
    store: Arc<dyn ModuleStore>,
    limiter: Arc<dyn RateLimiter>,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn ModuleStore>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            validator: Validator::new().with_required_thumbnail(true),
            store,
            limiter,
        }
    }

    /// Quota check, full validation, then persistence.
    ///
    /// The daily submission quota is charged before validation, so
    /// rejected submissions count against it.
    pub async fn submit(&self, submission: Submission) -> Result<ModuleRecord> {
        self.limiter
            .check_and_increment(&submission.agent_id, LimitKind::SubmissionsPerDay)
            .await?;

        let report = self.validator.validate(&submission);
        track_validation(report.issues());
        report.into_result()?;

        let record = ModuleRecord::from_submission(submission);
        self.store.save(&record).await?;
        tracing::info!(
            game_id = %record.id,
            agent_id = %record.agent_id,
            mode = %record.mode,
            digest = %record.digest,
            "Module accepted"
        );
        Ok(record)
    }
}

fn multipart_err(e: axum::extract::multipart::MultipartError) -> Error {
    Error::invalid_request(format!("malformed multipart body: {}", e))
}

fn parse_field<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::invalid_request(format!("field '{}': {}", name, e)))
}

/// Build a [`Submission`] from a multipart form.
///
/// Text parts: `title`, `description`, `genre`, `mode`, `dimensionality`,
/// `tier`, `capabilities` (comma separated), `source`, `manifest` (JSON).
/// Binary parts: `thumbnail` and one `asset:<path>` part per resource.
pub async fn read_submission(agent_id: &str, mut multipart: Multipart) -> Result<Submission> {
    let mut metadata = SubmissionMetadata::default();
    let mut source = None;
    let mut mode = SourceMode::InlineScript;
    let mut dimensionality = Dimensionality::TwoD;
    let mut tier: Option<BundleTier> = None;
    let mut capabilities = BTreeSet::new();
    let mut thumbnail: Option<Bytes> = None;
    let mut manifest: Option<BundleManifest> = None;
    let mut files = BTreeMap::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_err)? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(path) = name.strip_prefix(ASSET_PART_PREFIX) {
            let data = field.bytes().await.map_err(multipart_err)?;
            files.insert(path.to_string(), data);
            continue;
        }
        if name == "thumbnail" {
            thumbnail = Some(field.bytes().await.map_err(multipart_err)?);
            continue;
        }

        let text = field.text().await.map_err(multipart_err)?;
        match name.as_str() {
            "title" => metadata.title = text,
            "description" => metadata.description = text,
            "genre" => metadata.genre = text,
            "source" => source = Some(text),
            "mode" => mode = parse_field(&name, &text)?,
            "dimensionality" => dimensionality = parse_field(&name, &text)?,
            "tier" => tier = Some(parse_field(&name, &text)?),
            "capabilities" => {
                for item in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    capabilities.insert(parse_field::<SharedCapability>(&name, item)?);
                }
            }
            "manifest" => {
                manifest = Some(serde_json::from_str(&text).map_err(|e| {
                    Error::invalid_request(format!("field 'manifest': {}", e))
                })?)
            }
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    let source = source.ok_or_else(|| Error::invalid_request("missing 'source' field"))?;
    if mode == SourceMode::PackagedBundle && tier.is_none() {
        return Err(Error::invalid_request(
            "packaged-bundle submissions need a 'tier' field",
        ));
    }

    // Files without a manifest still travel as a bundle so the audit can
    // report them.
    let bundle = match manifest {
        Some(manifest) => Some(BundlePayload { manifest, files }),
        None if !files.is_empty() => Some(BundlePayload {
            manifest: BundleManifest::default(),
            files,
        }),
        None => None,
    };

    Ok(Submission {
        agent_id: agent_id.to_string(),
        metadata,
        source,
        mode,
        dimensionality,
        tier,
        shared_capabilities: capabilities,
        thumbnail,
        bundle,
    })
}
