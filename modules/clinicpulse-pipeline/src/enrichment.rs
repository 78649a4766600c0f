//! Enrichment stage: annotate unified reviews through the sentiment oracle.
//!
//! Oracle calls fan out up to the configured concurrency; each review is
//! annotated group by group (sentiment, complaint, then the owner response
//! when a complaint has one). Transient oracle failures retry with bounded
//! backoff; permanent ones mark the review failed-enrichment so it stays out
//! of selection until explicitly forced. One review never blocks the batch.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use clinicpulse_common::file_config::FileConfig;
use clinicpulse_common::{EnrichedReview, EnrichmentStatus, UnifiedReview};
use clinicpulse_engine::select_pending;
use clinicpulse_store::Store;

use crate::oracle::{OracleError, OracleResult, SentimentOracle};

/// Max attempts per oracle call before giving up on a transient failure.
const ORACLE_MAX_ATTEMPTS: u32 = 3;
/// Base backoff duration. Actual delay is base * 3^attempt + jitter.
const ORACLE_RETRY_BASE: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
pub struct EnrichStats {
    pub selected: u32,
    pub enriched: u32,
    pub marked_failed: u32,
    pub retry_later: u32,
    pub skipped_short: u32,
}

impl std::fmt::Display for EnrichStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Enrichment Run Complete ===")?;
        writeln!(f, "Selected:      {}", self.selected)?;
        writeln!(f, "Enriched:      {}", self.enriched)?;
        writeln!(f, "Marked failed: {}", self.marked_failed)?;
        writeln!(f, "Retry later:   {} (transient oracle failures)", self.retry_later)?;
        writeln!(f, "Skipped short: {}", self.skipped_short)
    }
}

/// Per-review outcome of one annotation attempt.
pub(crate) enum ReviewOutcome {
    Enriched(EnrichedReview),
    /// Permanent oracle failure, persisted so the review stays deselected.
    Failed(EnrichedReview),
    /// Transient failure that survived all retries; the next run retries it.
    RetryLater(Uuid, OracleError),
}

pub struct EnrichmentRun<'a> {
    store: &'a Store,
    oracle: &'a dyn SentimentOracle,
    config: &'a FileConfig,
}

impl<'a> EnrichmentRun<'a> {
    pub fn new(store: &'a Store, oracle: &'a dyn SentimentOracle, config: &'a FileConfig) -> Self {
        Self {
            store,
            oracle,
            config,
        }
    }

    pub async fn run(
        &self,
        establishments: Option<&[Uuid]>,
        published_after: Option<DateTime<Utc>>,
        force: bool,
        quick: bool,
    ) -> Result<EnrichStats> {
        let upstream = self
            .store
            .unified_keys(establishments, published_after)
            .await
            .context("Failed to list unified review keys")?;
        let downstream = self
            .store
            .enriched_ids()
            .await
            .context("Failed to list enriched review ids")?;

        let batch_size = self.config.processing.batch_size;
        let limit = quick.then_some(batch_size);
        let pending = select_pending(upstream, &downstream, force, limit);
        info!(count = pending.len(), "Reviews selected for enrichment");

        let mut stats = EnrichStats {
            selected: pending.len() as u32,
            ..Default::default()
        };

        for chunk in pending.chunks(batch_size.max(1)) {
            let reviews = self.store.unified_by_ids(chunk).await?;

            // Reviews too short to say anything get no oracle call. They are
            // re-filtered (not persisted) so a later edit can surface them.
            let (analyzable, short): (Vec<_>, Vec<_>) = reviews
                .into_iter()
                .partition(|r| r.content.trim().len() >= self.config.processing.min_review_length);
            stats.skipped_short += short.len() as u32;

            // Annotate in parallel, write sequentially.
            let outcomes: Vec<ReviewOutcome> = stream::iter(
                analyzable
                    .iter()
                    .map(|review| self.annotate_review(review)),
            )
            .buffer_unordered(self.config.processing.oracle_concurrency.max(1))
            .collect()
            .await;

            for outcome in outcomes {
                match outcome {
                    ReviewOutcome::Enriched(enriched) => {
                        self.store.upsert_enriched(&enriched).await?;
                        stats.enriched += 1;
                    }
                    ReviewOutcome::Failed(enriched) => {
                        warn!(
                            review_id = %enriched.review_id,
                            reason = enriched.failure.as_deref().unwrap_or(""),
                            "Review marked failed-enrichment"
                        );
                        self.store.upsert_enriched(&enriched).await?;
                        stats.marked_failed += 1;
                    }
                    ReviewOutcome::RetryLater(review_id, error) => {
                        warn!(review_id = %review_id, error = %error, "Review skipped this run, will retry");
                        stats.retry_later += 1;
                    }
                }
            }
        }

        info!("{stats}");
        Ok(stats)
    }

    async fn annotate_review(&self, review: &UnifiedReview) -> ReviewOutcome {
        annotate(self.oracle, review).await
    }
}

/// Annotate one review through all attribute groups. Free-standing so tests
/// can drive it with a mock oracle and no store.
pub(crate) async fn annotate(
    oracle: &dyn SentimentOracle,
    review: &UnifiedReview,
) -> ReviewOutcome {
    let result = annotate_inner(oracle, review).await;
    match result {
        Ok(enriched) => ReviewOutcome::Enriched(enriched),
        Err(error) if error.is_transient() => ReviewOutcome::RetryLater(review.review_id, error),
        Err(error) => ReviewOutcome::Failed(EnrichedReview {
            review_id: review.review_id,
            establishment_id: review.establishment_id,
            attributes: Default::default(),
            is_complaint: false,
            has_response: review.has_owner_response(),
            response_quality: None,
            oracle_model: oracle.model().to_string(),
            status: EnrichmentStatus::Failed,
            failure: Some(error.to_string()),
            published_at: review.published_at,
        }),
    }
}

async fn annotate_inner(
    oracle: &dyn SentimentOracle,
    review: &UnifiedReview,
) -> OracleResult<EnrichedReview> {
    let content = review.content.as_str();

    let attributes = with_backoff(|| oracle.sentiment(content)).await?;
    let is_complaint = with_backoff(|| oracle.complaint(content)).await?;

    let has_response = review.has_owner_response();
    let response_quality = if is_complaint && has_response {
        let owner_response = review.owner_response.as_deref().unwrap_or_default();
        Some(with_backoff(|| oracle.response_quality(content, owner_response)).await?)
    } else {
        None
    };

    Ok(EnrichedReview {
        review_id: review.review_id,
        establishment_id: review.establishment_id,
        attributes,
        is_complaint,
        has_response,
        response_quality,
        oracle_model: oracle.model().to_string(),
        status: EnrichmentStatus::Enriched,
        failure: None,
        published_at: review.published_at,
    })
}

/// Retry a transient-failing oracle call up to ORACLE_MAX_ATTEMPTS with
/// exponential backoff (2s, 6s) plus random jitter (0-1s). Permanent errors
/// return immediately.
async fn with_backoff<T, F, Fut>(mut op: F) -> OracleResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = OracleResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt + 1 < ORACLE_MAX_ATTEMPTS => {
                let backoff = ORACLE_RETRY_BASE * 3u32.pow(attempt);
                let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
                warn!(
                    error = %error,
                    attempt = attempt + 1,
                    backoff_secs = backoff.as_secs(),
                    "Transient oracle failure, retrying after backoff"
                );
                tokio::time::sleep(backoff + jitter).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use clinicpulse_common::{Attribute, Platform, ResponseQuality};

    /// Scripted oracle: fails the first `fail_first` sentiment calls with the
    /// given error kind, then succeeds.
    struct MockOracle {
        fail_first: u32,
        transient: bool,
        is_complaint: bool,
        calls: AtomicU32,
    }

    impl MockOracle {
        fn ok() -> Self {
            Self {
                fail_first: 0,
                transient: false,
                is_complaint: false,
                calls: AtomicU32::new(0),
            }
        }

        fn error(&self) -> OracleError {
            if self.transient {
                OracleError::RateLimited
            } else {
                OracleError::ContentFiltered("declined".into())
            }
        }
    }

    #[async_trait]
    impl SentimentOracle for MockOracle {
        async fn sentiment(&self, _content: &str) -> OracleResult<BTreeMap<Attribute, u8>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(self.error());
            }
            Ok([(Attribute::Facility, 3u8)].into_iter().collect())
        }

        async fn complaint(&self, _content: &str) -> OracleResult<bool> {
            Ok(self.is_complaint)
        }

        async fn response_quality(
            &self,
            _content: &str,
            _owner_response: &str,
        ) -> OracleResult<ResponseQuality> {
            Ok(ResponseQuality::Constructive)
        }

        fn model(&self) -> &str {
            "mock-oracle"
        }
    }

    fn review(owner_response: Option<&str>) -> UnifiedReview {
        UnifiedReview {
            review_id: Uuid::from_u128(1),
            establishment_id: Uuid::from_u128(2),
            platform: Platform::Maps,
            rating: Some(4.0),
            content: "The facility was spotless and modern.".into(),
            language: Some("en".into()),
            published_at: None,
            owner_response: owner_response.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn successful_annotation_produces_enriched_row() {
        let oracle = MockOracle::ok();
        let outcome = annotate(&oracle, &review(None)).await;

        let ReviewOutcome::Enriched(enriched) = outcome else {
            panic!("expected enriched outcome");
        };
        assert_eq!(enriched.status, EnrichmentStatus::Enriched);
        assert_eq!(enriched.attributes[&Attribute::Facility], 3);
        assert!(!enriched.is_complaint);
        assert_eq!(enriched.response_quality, None);
        assert_eq!(enriched.oracle_model, "mock-oracle");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_retries_then_succeeds() {
        let oracle = MockOracle {
            fail_first: 2,
            transient: true,
            ..MockOracle::ok()
        };
        let outcome = annotate(&oracle, &review(None)).await;

        assert!(matches!(outcome, ReviewOutcome::Enriched(_)));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_exhausting_retries_is_deferred_not_marked() {
        let oracle = MockOracle {
            fail_first: 10,
            transient: true,
            ..MockOracle::ok()
        };
        let outcome = annotate(&oracle, &review(None)).await;

        let ReviewOutcome::RetryLater(review_id, error) = outcome else {
            panic!("expected retry-later outcome");
        };
        assert_eq!(review_id, Uuid::from_u128(1));
        assert!(error.is_transient());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), ORACLE_MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn permanent_failure_marks_the_review_failed() {
        let oracle = MockOracle {
            fail_first: 1,
            transient: false,
            ..MockOracle::ok()
        };
        let outcome = annotate(&oracle, &review(None)).await;

        let ReviewOutcome::Failed(enriched) = outcome else {
            panic!("expected failed outcome");
        };
        assert_eq!(enriched.status, EnrichmentStatus::Failed);
        assert!(enriched.attributes.is_empty());
        assert!(enriched.failure.unwrap().contains("declined"));
        // Exactly one attempt: permanent errors are not retried.
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn complaint_with_response_gets_a_quality_assessment() {
        let oracle = MockOracle {
            is_complaint: true,
            ..MockOracle::ok()
        };
        let outcome = annotate(&oracle, &review(Some("We are sorry, please call us."))).await;

        let ReviewOutcome::Enriched(enriched) = outcome else {
            panic!("expected enriched outcome");
        };
        assert!(enriched.is_complaint);
        assert!(enriched.has_response);
        assert_eq!(enriched.response_quality, Some(ResponseQuality::Constructive));
    }

    #[tokio::test]
    async fn complaint_without_response_gets_no_assessment() {
        let oracle = MockOracle {
            is_complaint: true,
            ..MockOracle::ok()
        };
        let outcome = annotate(&oracle, &review(None)).await;

        let ReviewOutcome::Enriched(enriched) = outcome else {
            panic!("expected enriched outcome");
        };
        assert!(enriched.is_complaint);
        assert!(!enriched.has_response);
        assert_eq!(enriched.response_quality, None);
    }
}
