use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::types::Attribute;

/// TOML-backed tunables loaded from disk. Secrets (API keys, DB URL) stay as
/// env vars. Validated into an immutable structure at run start; any invalid
/// combination is fatal before a run begins.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bayesian: BayesianConfig,
    pub nps: NpsConfig,
    pub scoring: CompositeConfig,
    pub response_rules: ResponseRules,
    pub processing: ProcessingConfig,
    pub oracle: OracleConfig,
    /// Optional allow-list of establishments; empty/absent means all.
    #[serde(default)]
    pub target_establishments: Vec<Uuid>,
    /// Optional RFC3339 lower bound for attribute-sample inclusion.
    #[serde(default)]
    pub published_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BayesianConfig {
    /// How many observations of prior-strength evidence equal one real review.
    pub prior_weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NpsConfig {
    /// Observations below this score count as detractors.
    pub threshold_low: f64,
    /// Observations at or above this score count as promoters.
    pub threshold_high: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompositeConfig {
    pub service_quality_weights: BTreeMap<Attribute, f64>,
    pub communication_weights: BTreeMap<Attribute, f64>,
}

/// Ordinal observation values derived for `online_communication` from the
/// complaint/response assessment. Non-complaints contribute no observation.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseRules {
    pub complaint_no_response: u8,
    pub complaint_response_poor: u8,
    pub complaint_response_good: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    /// Quick-mode cap on the number of records processed per stage run.
    pub batch_size: usize,
    /// Concurrent in-flight oracle calls.
    pub oracle_concurrency: usize,
    /// Worker pool size for per-establishment scoring.
    pub score_concurrency: usize,
    /// Reviews shorter than this (chars) are not worth an oracle call.
    pub min_review_length: usize,
    /// Per-establishment review cap passed to the scraping actors.
    pub scrape_max_reviews: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Anthropic model id.
    pub model: String,
}

impl FileConfig {
    /// Fail-fast validation of cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        if !self.bayesian.prior_weight.is_finite() || self.bayesian.prior_weight < 0.0 {
            bail!(
                "bayesian.prior_weight must be a finite float >= 0, got {}",
                self.bayesian.prior_weight
            );
        }

        let (low, high) = (self.nps.threshold_low, self.nps.threshold_high);
        if !(0.0..=3.0).contains(&low) || !(0.0..=3.0).contains(&high) {
            bail!("nps thresholds must lie in [0, 3], got low={low} high={high}");
        }
        if low >= high {
            bail!("nps.threshold_low must be strictly below threshold_high, got low={low} high={high}");
        }

        validate_weights("service_quality_weights", &self.scoring.service_quality_weights)?;
        validate_weights("communication_weights", &self.scoring.communication_weights)?;

        for (name, value) in [
            ("complaint_no_response", self.response_rules.complaint_no_response),
            ("complaint_response_poor", self.response_rules.complaint_response_poor),
            ("complaint_response_good", self.response_rules.complaint_response_good),
        ] {
            if value > 3 {
                bail!("response_rules.{name} must be an ordinal in 0..=3, got {value}");
            }
        }

        if self.processing.batch_size == 0 {
            bail!("processing.batch_size must be >= 1");
        }
        if self.processing.oracle_concurrency == 0 {
            bail!("processing.oracle_concurrency must be >= 1");
        }
        if self.processing.score_concurrency == 0 {
            bail!("processing.score_concurrency must be >= 1");
        }

        if self.oracle.model.trim().is_empty() {
            bail!("oracle.model must not be empty");
        }

        Ok(())
    }
}

fn validate_weights(name: &str, weights: &BTreeMap<Attribute, f64>) -> Result<()> {
    if weights.is_empty() {
        bail!("scoring.{name} must weight at least one attribute");
    }
    for (attr, w) in weights {
        if !w.is_finite() || *w < 0.0 {
            bail!("scoring.{name}.{attr} must be a finite float >= 0, got {w}");
        }
    }
    if weights.values().all(|w| *w == 0.0) {
        bail!("scoring.{name} must have at least one positive weight");
    }
    Ok(())
}

/// Load, parse and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config: {}", path.display()))?;
    Ok(config)
}
