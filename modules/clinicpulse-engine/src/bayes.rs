//! Bayesian shrinkage: stabilize small-sample attribute ratings by blending
//! them with a corpus-wide prior.

use std::collections::BTreeMap;

use uuid::Uuid;

use clinicpulse_common::Attribute;

use crate::samples::AttributeSamples;

/// A per-attribute prior computed fresh each run from the full enriched
/// corpus. Immutable for the duration of a scoring run; every establishment's
/// adjustment reads the same value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prior {
    /// Mean of per-establishment raw means, each establishment weighted equally.
    pub mean: f64,
    /// Establishments with at least one observation of this attribute.
    pub establishments: u32,
}

/// Compute per-attribute priors from per-establishment samples.
///
/// Only establishments with at least one observation of an attribute count
/// toward that attribute's prior.
pub fn compute_priors(corpus: &BTreeMap<Uuid, AttributeSamples>) -> BTreeMap<Attribute, Prior> {
    let mut means: BTreeMap<Attribute, Vec<f64>> = BTreeMap::new();

    for samples in corpus.values() {
        for (&attribute, observations) in samples {
            if observations.is_empty() {
                continue;
            }
            let sum: f64 = observations.iter().map(|&v| v as f64).sum();
            means
                .entry(attribute)
                .or_default()
                .push(sum / observations.len() as f64);
        }
    }

    means
        .into_iter()
        .map(|(attribute, establishment_means)| {
            let mean =
                establishment_means.iter().sum::<f64>() / establishment_means.len() as f64;
            (
                attribute,
                Prior {
                    mean,
                    establishments: establishment_means.len() as u32,
                },
            )
        })
        .collect()
}

/// Shrink a raw sample toward the prior: small samples land near the prior
/// mean, large samples near their own mean.
///
/// `adjusted = (prior_weight * prior_mean + Σ observed) / (prior_weight + n)`
///
/// Returns None for an empty sample; the attribute is absent for this
/// establishment, not zero. The result is always within [0, 3]: a weighted
/// average of values in that range.
pub fn adjusted_rating(observations: &[u8], prior_mean: f64, prior_weight: f64) -> Option<f64> {
    if observations.is_empty() {
        return None;
    }
    let n = observations.len() as f64;
    let sum: f64 = observations.iter().map(|&v| v as f64).sum();
    Some((prior_weight * prior_mean + sum) / (prior_weight + n))
}

/// Raw sample mean, None for an empty sample.
pub fn raw_mean(observations: &[u8]) -> Option<f64> {
    if observations.is_empty() {
        return None;
    }
    let sum: f64 = observations.iter().map(|&v| v as f64).sum();
    Some(sum / observations.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sample_yields_no_adjusted_rating() {
        assert_eq!(adjusted_rating(&[], 2.0, 100.0), None);
        assert_eq!(raw_mean(&[]), None);
    }

    #[test]
    fn zero_prior_weight_equals_raw_mean() {
        let observations = [3, 1, 2, 2];
        let adjusted = adjusted_rating(&observations, 2.7, 0.0).unwrap();
        let mean = raw_mean(&observations).unwrap();
        assert!((adjusted - mean).abs() < 1e-12);
        assert!((adjusted - 2.0).abs() < 1e-12);
    }

    #[test]
    fn closed_form_hand_check() {
        // Observations [3,3,2], prior 2.0, weight 100:
        // (100*2.0 + 8) / 103 = 208/103.
        let adjusted = adjusted_rating(&[3, 3, 2], 2.0, 100.0).unwrap();
        assert!((adjusted - 208.0 / 103.0).abs() < 1e-12);
        assert!((adjusted - 2.0194).abs() < 1e-4);
    }

    #[test]
    fn converges_to_sample_mean_as_n_grows() {
        // Constant raw mean 2.5 (alternating 2s and 3s), prior far away at 1.0.
        for n in [10usize, 1_000, 100_000] {
            let observations: Vec<u8> = (0..n).map(|i| if i % 2 == 0 { 2 } else { 3 }).collect();
            let adjusted = adjusted_rating(&observations, 1.0, 500.0).unwrap();
            let distance = (adjusted - 2.5).abs();
            // Shrinkage error decays as prior_weight / (prior_weight + n).
            assert!(distance <= 1.5 * 500.0 / (500.0 + n as f64) + 1e-12);
        }
        let observations: Vec<u8> = (0..1_000_000).map(|i| if i % 2 == 0 { 2 } else { 3 }).collect();
        let adjusted = adjusted_rating(&observations, 1.0, 500.0).unwrap();
        assert!((adjusted - 2.5).abs() < 1e-3);
    }

    #[test]
    fn small_sample_shrinks_toward_prior() {
        // One glowing review should not beat an established 2.0 prior by much.
        let adjusted = adjusted_rating(&[3], 2.0, 100.0).unwrap();
        assert!(adjusted < 2.02);
        assert!(adjusted > 2.0);
    }

    #[test]
    fn adjusted_stays_within_scale() {
        for observations in [vec![0u8; 5], vec![3u8; 5], vec![0, 3, 0, 3]] {
            for prior_mean in [0.0, 1.5, 3.0] {
                for prior_weight in [0.0, 1.0, 1000.0] {
                    let adjusted =
                        adjusted_rating(&observations, prior_mean, prior_weight).unwrap();
                    assert!((0.0..=3.0).contains(&adjusted));
                }
            }
        }
    }

    #[test]
    fn prior_is_mean_of_establishment_means() {
        // Establishment A: facility mean 3.0 (one review).
        // Establishment B: facility mean 1.0 (three reviews).
        // Each establishment weighs equally: prior = 2.0, not the pooled 1.5.
        let mut corpus: BTreeMap<Uuid, AttributeSamples> = BTreeMap::new();
        corpus.insert(
            Uuid::from_u128(1),
            [(Attribute::Facility, vec![3])].into_iter().collect(),
        );
        corpus.insert(
            Uuid::from_u128(2),
            [(Attribute::Facility, vec![1, 1, 1])].into_iter().collect(),
        );

        let priors = compute_priors(&corpus);
        let prior = priors[&Attribute::Facility];
        assert!((prior.mean - 2.0).abs() < 1e-12);
        assert_eq!(prior.establishments, 2);
    }

    #[test]
    fn establishments_without_observations_do_not_count() {
        let mut corpus: BTreeMap<Uuid, AttributeSamples> = BTreeMap::new();
        corpus.insert(
            Uuid::from_u128(1),
            [(Attribute::Facility, vec![2, 2])].into_iter().collect(),
        );
        corpus.insert(Uuid::from_u128(2), BTreeMap::new());

        let priors = compute_priors(&corpus);
        assert_eq!(priors[&Attribute::Facility].establishments, 1);
        assert!(!priors.contains_key(&Attribute::Scheduling));
    }
}
