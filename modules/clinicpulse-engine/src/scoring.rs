//! Scoring run orchestration.
//!
//! One run: a corpus-wide prior pass (a synchronization barrier; every
//! establishment's adjustment reads the same immutable priors), then
//! embarrassingly parallel per-establishment computation over a bounded
//! worker pool. Each establishment is an independent read + one atomic score
//! upsert; a failure there is a tagged outcome in the summary, never an abort
//! of the batch.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use clinicpulse_common::file_config::{FileConfig, ResponseRules};
use clinicpulse_common::{Attribute, AttributeStats, EnrichedReview, EstablishmentScore};

use crate::bayes::{adjusted_rating, compute_priors, raw_mean, Prior};
use crate::composite::composite_score;
use crate::nps::nps_score;
use crate::samples::{gather_samples, AttributeSamples};

/// Store operations the scoring run needs. Behind a trait so the orchestrator
/// tests run against an in-memory mock, with no network and no database.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Establishments with at least one successful enrichment.
    async fn enriched_establishments(&self) -> Result<Vec<Uuid>>;

    /// The full successful-enrichment corpus, for the prior pass.
    async fn corpus_enriched(
        &self,
        published_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<EnrichedReview>>;

    /// One establishment's successful enrichments.
    async fn enriched_for_establishment(
        &self,
        establishment_id: Uuid,
        published_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<EnrichedReview>>;

    /// Atomically replace one establishment's score record.
    async fn upsert_score(&self, score: &EstablishmentScore) -> Result<()>;
}

/// Immutable scoring parameters, validated once at run start.
#[derive(Debug, Clone)]
pub struct ScoringParams {
    pub prior_weight: f64,
    pub threshold_low: f64,
    pub threshold_high: f64,
    pub service_quality_weights: BTreeMap<Attribute, f64>,
    pub communication_weights: BTreeMap<Attribute, f64>,
    pub response_rules: ResponseRules,
    pub published_after: Option<DateTime<Utc>>,
    /// Bounded worker pool size for per-establishment computation.
    pub concurrency: usize,
    /// Quick-mode cap on establishments per run.
    pub batch_size: usize,
}

impl ScoringParams {
    pub fn from_config(config: &FileConfig) -> Self {
        Self {
            prior_weight: config.bayesian.prior_weight,
            threshold_low: config.nps.threshold_low,
            threshold_high: config.nps.threshold_high,
            service_quality_weights: config.scoring.service_quality_weights.clone(),
            communication_weights: config.scoring.communication_weights.clone(),
            response_rules: config.response_rules.clone(),
            published_after: config.published_after,
            concurrency: config.processing.score_concurrency.max(1),
            batch_size: config.processing.batch_size,
        }
    }
}

/// Per-establishment outcome, collected into the run summary.
#[derive(Debug)]
pub enum EstablishmentOutcome {
    Scored,
    /// Malformed sample data. Recovered locally, this establishment only.
    Skipped { reason: String },
    /// Store read/write failure for this establishment.
    Failed { error: String },
}

/// Structured end-of-run summary. Emitted regardless of partial failures.
#[derive(Debug, Default)]
pub struct ScoringSummary {
    pub scored: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl ScoringSummary {
    fn record(&mut self, establishment_id: Uuid, outcome: &EstablishmentOutcome) {
        match outcome {
            EstablishmentOutcome::Scored => self.scored += 1,
            EstablishmentOutcome::Skipped { reason } => {
                warn!(establishment_id = %establishment_id, reason = %reason, "Establishment skipped");
                self.skipped += 1;
            }
            EstablishmentOutcome::Failed { error } => {
                warn!(establishment_id = %establishment_id, error = %error, "Establishment scoring failed");
                self.failed += 1;
            }
        }
    }
}

impl std::fmt::Display for ScoringSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Scoring Run Complete ===")?;
        writeln!(f, "Scored:  {}", self.scored)?;
        writeln!(f, "Skipped: {} (data errors)", self.skipped)?;
        writeln!(f, "Failed:  {} (store errors)", self.failed)
    }
}

/// Compute one establishment's full score record from its samples and the
/// run's priors. Pure: same inputs always produce the same record, so re-runs
/// over unchanged data rewrite byte-identical rows.
pub fn compute_establishment_score(
    establishment_id: Uuid,
    samples: &AttributeSamples,
    total_reviews: u32,
    priors: &BTreeMap<Attribute, Prior>,
    params: &ScoringParams,
) -> EstablishmentScore {
    let mut attributes: BTreeMap<Attribute, AttributeStats> = BTreeMap::new();
    let mut nps_values: BTreeMap<Attribute, f64> = BTreeMap::new();

    for (&attribute, observations) in samples {
        let Some(mean) = raw_mean(observations) else {
            continue;
        };
        // The corpus pass covers every attribute observed anywhere, so a
        // missing prior can only mean this attribute is new to the corpus;
        // fall back to the unshrunk mean.
        let (prior_mean, prior_weight) = match priors.get(&attribute) {
            Some(prior) => (prior.mean, params.prior_weight),
            None => (0.0, 0.0),
        };
        let Some(adjusted) = adjusted_rating(observations, prior_mean, prior_weight) else {
            continue;
        };
        let Some(nps) = nps_score(observations, params.threshold_low, params.threshold_high)
        else {
            continue;
        };

        nps_values.insert(attribute, nps);
        attributes.insert(
            attribute,
            AttributeStats {
                raw_mean: mean,
                adjusted,
                nps,
                sample_size: observations.len() as u32,
            },
        );
    }

    let service_quality = composite_score(&nps_values, &params.service_quality_weights);
    let communication = composite_score(&nps_values, &params.communication_weights);

    EstablishmentScore {
        establishment_id,
        attributes,
        service_quality,
        communication,
        total_reviews,
    }
}

/// The scoring run orchestrator.
pub struct ScoringRun {
    params: ScoringParams,
}

impl ScoringRun {
    pub fn new(params: ScoringParams) -> Self {
        Self { params }
    }

    /// Score the targeted establishments (all enriched ones when `targets` is
    /// None). `quick` caps the batch at `batch_size`.
    ///
    /// Fatal errors are limited to store-level failures outside any single
    /// establishment (the corpus pass, the target listing). Everything
    /// per-establishment lands in the summary.
    pub async fn run(
        &self,
        store: &dyn ScoreStore,
        targets: Option<Vec<Uuid>>,
        quick: bool,
    ) -> Result<ScoringSummary> {
        // Prior pass: one corpus-wide read, before any per-establishment work.
        // The allow-list deliberately does not narrow this: priors are a
        // property of the whole corpus.
        let corpus = store
            .corpus_enriched(self.params.published_after)
            .await
            .context("Failed to read enrichment corpus for prior pass")?;

        let mut by_establishment: BTreeMap<Uuid, Vec<EnrichedReview>> = BTreeMap::new();
        for review in corpus {
            by_establishment
                .entry(review.establishment_id)
                .or_default()
                .push(review);
        }

        let mut corpus_samples: BTreeMap<Uuid, AttributeSamples> = BTreeMap::new();
        for (establishment_id, reviews) in &by_establishment {
            match gather_samples(reviews, &self.params.response_rules) {
                Ok(samples) => {
                    corpus_samples.insert(*establishment_id, samples);
                }
                // A malformed establishment must not poison the prior; it
                // will be skipped again, visibly, in its own scoring step.
                Err(e) => warn!(
                    establishment_id = %establishment_id,
                    error = %e,
                    "Excluding establishment from prior pass"
                ),
            }
        }
        let priors = compute_priors(&corpus_samples);
        info!(
            attributes = priors.len(),
            establishments = corpus_samples.len(),
            "Computed corpus priors"
        );

        let mut establishments = match targets {
            Some(ids) => ids,
            None => store
                .enriched_establishments()
                .await
                .context("Failed to list enriched establishments")?,
        };
        establishments.sort();
        establishments.dedup();
        if quick && establishments.len() > self.params.batch_size {
            info!(
                total = establishments.len(),
                cap = self.params.batch_size,
                "Quick mode: capping establishments this run"
            );
            establishments.truncate(self.params.batch_size);
        }
        info!(count = establishments.len(), "Scoring establishments");

        let outcomes: Vec<(Uuid, EstablishmentOutcome)> =
            stream::iter(establishments.into_iter().map(|establishment_id| {
                let priors = &priors;
                async move {
                    let outcome = self.score_one(store, establishment_id, priors).await;
                    (establishment_id, outcome)
                }
            }))
            .buffer_unordered(self.params.concurrency)
            .collect()
            .await;

        let mut summary = ScoringSummary::default();
        for (establishment_id, outcome) in &outcomes {
            summary.record(*establishment_id, outcome);
        }
        Ok(summary)
    }

    /// One establishment: independent read, pure computation, atomic write.
    async fn score_one(
        &self,
        store: &dyn ScoreStore,
        establishment_id: Uuid,
        priors: &BTreeMap<Attribute, Prior>,
    ) -> EstablishmentOutcome {
        let reviews = match store
            .enriched_for_establishment(establishment_id, self.params.published_after)
            .await
        {
            Ok(reviews) => reviews,
            Err(e) => {
                return EstablishmentOutcome::Failed {
                    error: format!("reading samples: {e:#}"),
                }
            }
        };

        let samples = match gather_samples(&reviews, &self.params.response_rules) {
            Ok(samples) => samples,
            Err(e) => {
                return EstablishmentOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        };

        let score = compute_establishment_score(
            establishment_id,
            &samples,
            reviews.len() as u32,
            priors,
            &self.params,
        );

        match store.upsert_score(&score).await {
            Ok(()) => EstablishmentOutcome::Scored,
            Err(e) => EstablishmentOutcome::Failed {
                error: format!("writing score: {e:#}"),
            },
        }
    }
}
