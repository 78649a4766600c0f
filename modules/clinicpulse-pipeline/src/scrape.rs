//! Scrape stage: pull reviews for each establishment through the Apify
//! actors and append them to the raw store. A failed platform scrape is
//! logged and skipped; the other platform and the other establishments
//! continue.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use apify_client::{ApifyClient, GoogleReview, TrustpilotReview};
use clinicpulse_common::{Establishment, Platform, RawReview};
use clinicpulse_store::Store;

#[derive(Debug, Default)]
pub struct ScrapeStats {
    pub establishments: u32,
    pub google_reviews: u32,
    pub trustpilot_reviews: u32,
    pub failed_scrapes: u32,
}

impl std::fmt::Display for ScrapeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Scrape Run Complete ===")?;
        writeln!(f, "Establishments:     {}", self.establishments)?;
        writeln!(f, "Google reviews:     {} new", self.google_reviews)?;
        writeln!(f, "Trustpilot reviews: {} new", self.trustpilot_reviews)?;
        writeln!(f, "Failed scrapes:     {}", self.failed_scrapes)
    }
}

pub struct ScrapeRun<'a> {
    store: &'a Store,
    apify: &'a ApifyClient,
    max_reviews: u32,
}

impl<'a> ScrapeRun<'a> {
    pub fn new(store: &'a Store, apify: &'a ApifyClient, max_reviews: u32) -> Self {
        Self {
            store,
            apify,
            max_reviews,
        }
    }

    pub async fn run(&self, targets: Option<&[Uuid]>) -> Result<ScrapeStats> {
        let establishments = self
            .store
            .establishments(targets)
            .await
            .context("Failed to list establishments")?;
        info!(count = establishments.len(), "Establishments to scrape");

        let mut stats = ScrapeStats::default();
        for establishment in &establishments {
            stats.establishments += 1;

            match self.scrape_google(establishment).await {
                Ok(inserted) => stats.google_reviews += inserted,
                Err(e) => {
                    warn!(
                        establishment = establishment.display_name.as_str(),
                        error = %e,
                        "Google scrape failed"
                    );
                    stats.failed_scrapes += 1;
                }
            }

            match self.scrape_trustpilot(establishment).await {
                Ok(inserted) => stats.trustpilot_reviews += inserted,
                Err(e) => {
                    warn!(
                        establishment = establishment.display_name.as_str(),
                        error = %e,
                        "Trustpilot scrape failed"
                    );
                    stats.failed_scrapes += 1;
                }
            }
        }

        info!("{stats}");
        Ok(stats)
    }

    async fn scrape_google(&self, establishment: &Establishment) -> Result<u32> {
        let items = self
            .apify
            .scrape_google_reviews(&establishment.google_url, self.max_reviews)
            .await?;

        let scraped_at = Utc::now();
        let reviews: Vec<RawReview> = items
            .into_iter()
            .filter_map(|item| raw_from_google(establishment.id, item, scraped_at))
            .collect();

        let inserted = self.store.insert_raw_reviews(&reviews).await?;
        self.store
            .mark_scraped(establishment.id, Platform::Maps, scraped_at)
            .await?;
        Ok(inserted as u32)
    }

    async fn scrape_trustpilot(&self, establishment: &Establishment) -> Result<u32> {
        let items = self
            .apify
            .scrape_trustpilot_reviews(&establishment.trustpilot_domain, self.max_reviews)
            .await?;

        let scraped_at = Utc::now();
        let reviews: Vec<RawReview> = items
            .into_iter()
            .filter_map(|item| raw_from_trustpilot(establishment.id, item, scraped_at))
            .collect();

        let inserted = self.store.insert_raw_reviews(&reviews).await?;
        self.store
            .mark_scraped(establishment.id, Platform::Trustpilot, scraped_at)
            .await?;
        Ok(inserted as u32)
    }
}

/// Map a Google dataset item to a raw review. Items without a stable review
/// id cannot be deduplicated and are dropped.
fn raw_from_google(
    establishment_id: Uuid,
    item: GoogleReview,
    scraped_at: chrono::DateTime<Utc>,
) -> Option<RawReview> {
    let native_id = item.review_id.clone()?;
    let payload = serde_json::to_value(&item).unwrap_or_default();

    Some(RawReview {
        id: Uuid::new_v4(),
        establishment_id,
        platform: Platform::Maps,
        native_id,
        rating: item.stars,
        title: None, // Google reviews have no titles
        body: item.text,
        language: item.original_language.or(item.language),
        published_at: item.published_at_date,
        owner_response: item.response_from_owner_text,
        owner_responded_at: item.response_from_owner_date,
        is_local_guide: item.is_local_guide.unwrap_or(false),
        verification_level: None,
        payload,
        scraped_at,
    })
}

/// Map a Trustpilot dataset item to a raw review. The review URL doubles as
/// the stable native id.
fn raw_from_trustpilot(
    establishment_id: Uuid,
    item: TrustpilotReview,
    scraped_at: chrono::DateTime<Utc>,
) -> Option<RawReview> {
    let native_id = item.native_id()?.to_string();
    let payload = serde_json::to_value(&item).unwrap_or_default();

    Some(RawReview {
        id: Uuid::new_v4(),
        establishment_id,
        platform: Platform::Trustpilot,
        native_id,
        rating: item.rating_value,
        title: item.review_headline,
        body: item.review_body,
        language: item.review_language,
        published_at: item.date_published,
        owner_response: None,
        owner_responded_at: None,
        is_local_guide: false,
        verification_level: item.verification_level,
        payload,
        scraped_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_item_without_review_id_is_dropped() {
        let item = GoogleReview {
            review_id: None,
            stars: Some(5.0),
            text: Some("great".into()),
            text_translated: None,
            language: None,
            original_language: None,
            published_at_date: None,
            name: None,
            reviewer_id: None,
            reviewer_number_of_reviews: None,
            is_local_guide: None,
            likes_count: None,
            response_from_owner_text: None,
            response_from_owner_date: None,
            place_id: None,
        };
        assert!(raw_from_google(Uuid::new_v4(), item, Utc::now()).is_none());
    }

    #[test]
    fn google_item_maps_onto_raw_review() {
        let item = GoogleReview {
            review_id: Some("abc123".into()),
            stars: Some(4.0),
            text: Some("Friendly staff".into()),
            text_translated: None,
            language: Some("en".into()),
            original_language: Some("de".into()),
            published_at_date: None,
            name: None,
            reviewer_id: None,
            reviewer_number_of_reviews: None,
            is_local_guide: Some(true),
            likes_count: None,
            response_from_owner_text: Some("Danke!".into()),
            response_from_owner_date: None,
            place_id: None,
        };
        let raw = raw_from_google(Uuid::from_u128(1), item, Utc::now()).unwrap();

        assert_eq!(raw.platform, Platform::Maps);
        assert_eq!(raw.native_id, "abc123");
        assert_eq!(raw.rating, Some(4.0));
        assert_eq!(raw.title, None);
        // The pre-translation language wins when both are present.
        assert_eq!(raw.language.as_deref(), Some("de"));
        assert!(raw.is_local_guide);
        assert_eq!(raw.owner_response.as_deref(), Some("Danke!"));
    }

    #[test]
    fn trustpilot_review_url_is_the_native_id() {
        let item = TrustpilotReview {
            review_url: Some("https://trustpilot.com/reviews/xyz".into()),
            rating_value: Some(2.0),
            review_headline: Some("Disappointed".into()),
            review_body: Some("Long waits.".into()),
            review_language: Some("en".into()),
            date_published: None,
            experience_date: None,
            number_of_reviews: None,
            verification_level: Some("verified".into()),
            likes: None,
            consumer_country_code: None,
        };
        let raw = raw_from_trustpilot(Uuid::from_u128(1), item, Utc::now()).unwrap();

        assert_eq!(raw.platform, Platform::Trustpilot);
        assert_eq!(raw.native_id, "https://trustpilot.com/reviews/xyz");
        assert_eq!(raw.title.as_deref(), Some("Disappointed"));
        assert_eq!(raw.verification_level.as_deref(), Some("verified"));
    }
}
