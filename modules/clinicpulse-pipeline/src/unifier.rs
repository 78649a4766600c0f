//! Unifier stage: map raw per-platform reviews onto the common schema.
//!
//! The mapping is a pure function of the raw row, so replays are idempotent:
//! the same RawReview always yields the same UnifiedReview.

use anyhow::{Context, Result};
use tracing::info;
use uuid::Uuid;

use clinicpulse_common::{RawReview, UnifiedReview};
use clinicpulse_engine::select_pending;
use clinicpulse_store::Store;

#[derive(Debug, Default)]
pub struct UnifyStats {
    pub selected: u32,
    pub unified: u32,
}

impl std::fmt::Display for UnifyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Unify Run Complete ===")?;
        writeln!(f, "Selected: {}", self.selected)?;
        writeln!(f, "Unified:  {}", self.unified)
    }
}

/// Map one raw review onto the common schema.
pub fn unify_review(raw: &RawReview) -> UnifiedReview {
    let mut content = String::new();
    if let Some(title) = raw.title.as_deref() {
        content.push_str(title.trim());
    }
    if let Some(body) = raw.body.as_deref() {
        if !content.is_empty() && !body.trim().is_empty() {
            content.push(' ');
        }
        content.push_str(body.trim());
    }

    UnifiedReview {
        review_id: raw.id,
        establishment_id: raw.establishment_id,
        platform: raw.platform,
        rating: normalize_rating(raw.rating),
        content,
        language: raw.language.clone(),
        published_at: raw.published_at,
        owner_response: raw
            .owner_response
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
    }
}

/// Both platforms already rate on a 1-5 star scale; normalization clamps to
/// the common [0, 5] range and drops non-positive placeholder values.
fn normalize_rating(raw: Option<f64>) -> Option<f64> {
    raw.filter(|r| *r > 0.0).map(|r| r.min(5.0))
}

pub struct Unifier<'a> {
    store: &'a Store,
    batch_size: usize,
}

impl<'a> Unifier<'a> {
    pub fn new(store: &'a Store, batch_size: usize) -> Self {
        Self { store, batch_size }
    }

    /// Unify raw reviews not yet present downstream. `force` reprocesses
    /// everything in scope; `quick` caps the batch.
    pub async fn run(
        &self,
        establishments: Option<&[Uuid]>,
        force: bool,
        quick: bool,
    ) -> Result<UnifyStats> {
        let upstream = self
            .store
            .raw_review_keys(establishments)
            .await
            .context("Failed to list raw review keys")?;
        let downstream = self
            .store
            .unified_ids()
            .await
            .context("Failed to list unified review ids")?;

        let limit = quick.then_some(self.batch_size);
        let pending = select_pending(upstream, &downstream, force, limit);
        info!(count = pending.len(), "Reviews selected for unification");

        let mut stats = UnifyStats {
            selected: pending.len() as u32,
            ..Default::default()
        };

        for chunk in pending.chunks(self.batch_size.max(1)) {
            let raws = self.store.raw_reviews_by_ids(chunk).await?;
            let unified: Vec<UnifiedReview> = raws.iter().map(unify_review).collect();
            stats.unified += self.store.upsert_unified(&unified).await? as u32;
        }

        info!("{stats}");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use clinicpulse_common::Platform;

    fn raw(platform: Platform, rating: Option<f64>, title: Option<&str>, body: Option<&str>) -> RawReview {
        RawReview {
            id: Uuid::from_u128(1),
            establishment_id: Uuid::from_u128(2),
            platform,
            native_id: "r-1".into(),
            rating,
            title: title.map(str::to_string),
            body: body.map(str::to_string),
            language: Some("en".into()),
            published_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()),
            owner_response: None,
            owner_responded_at: None,
            is_local_guide: false,
            verification_level: None,
            payload: serde_json::json!({}),
            scraped_at: Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn unification_is_deterministic() {
        let r = raw(Platform::Trustpilot, Some(4.0), Some("Great"), Some("Friendly staff."));
        assert_eq!(unify_review(&r), unify_review(&r));
    }

    #[test]
    fn title_and_body_merge_into_content() {
        let r = raw(Platform::Trustpilot, Some(5.0), Some(" Great "), Some(" Friendly staff. "));
        assert_eq!(unify_review(&r).content, "Great Friendly staff.");

        let r = raw(Platform::Maps, Some(5.0), None, Some("Clean facility"));
        assert_eq!(unify_review(&r).content, "Clean facility");

        let r = raw(Platform::Trustpilot, Some(5.0), Some("Headline only"), None);
        assert_eq!(unify_review(&r).content, "Headline only");
    }

    #[test]
    fn rating_normalization_clamps_and_drops_placeholders() {
        assert_eq!(normalize_rating(Some(4.0)), Some(4.0));
        assert_eq!(normalize_rating(Some(7.0)), Some(5.0));
        assert_eq!(normalize_rating(Some(0.0)), None);
        assert_eq!(normalize_rating(Some(-1.0)), None);
        assert_eq!(normalize_rating(None), None);
    }

    #[test]
    fn unified_review_keeps_the_raw_identity() {
        let r = raw(Platform::Maps, Some(3.0), None, Some("ok"));
        let unified = unify_review(&r);
        assert_eq!(unified.review_id, r.id);
        assert_eq!(unified.establishment_id, r.establishment_id);
        assert_eq!(unified.platform, Platform::Maps);
        assert_eq!(unified.published_at, r.published_at);
    }

    #[test]
    fn blank_owner_response_is_dropped() {
        let mut r = raw(Platform::Maps, Some(3.0), None, Some("ok"));
        r.owner_response = Some("   ".into());
        assert!(!unify_review(&r).has_owner_response());

        r.owner_response = Some("Thank you!".into());
        assert!(unify_review(&r).has_owner_response());
    }
}
