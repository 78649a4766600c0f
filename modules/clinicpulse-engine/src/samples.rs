//! Per-establishment sample assembly from enriched review rows.

use std::collections::BTreeMap;

use thiserror::Error;
use uuid::Uuid;

use clinicpulse_common::file_config::ResponseRules;
use clinicpulse_common::{Attribute, EnrichedReview};

/// Ordinal observations per attribute for one establishment.
pub type AttributeSamples = BTreeMap<Attribute, Vec<u8>>;

/// A malformed sample. Recovered locally: the establishment it belongs to is
/// skipped with a logged reason, the rest of the run continues.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataError {
    #[error("review {review_id}: {attribute} score {value} outside ordinal range 0..=3")]
    OutOfRange {
        review_id: Uuid,
        attribute: Attribute,
        value: u8,
    },
}

/// Collect one establishment's attribute observations.
///
/// Absent attributes contribute nothing: they are excluded from the sample,
/// never zero-filled. The `online_communication` observation is derived from
/// the complaint/response assessment via the configured rule values; the
/// oracle never scores it directly, and non-complaints contribute no
/// observation for it.
pub fn gather_samples(
    reviews: &[EnrichedReview],
    rules: &ResponseRules,
) -> Result<AttributeSamples, DataError> {
    let mut samples: AttributeSamples = BTreeMap::new();

    for review in reviews {
        for (&attribute, &value) in &review.attributes {
            if value > 3 {
                return Err(DataError::OutOfRange {
                    review_id: review.review_id,
                    attribute,
                    value,
                });
            }
            if attribute == Attribute::OnlineCommunication {
                // Derived below, never taken from the oracle map.
                continue;
            }
            samples.entry(attribute).or_default().push(value);
        }

        if let Some(value) = online_communication(review, rules) {
            samples
                .entry(Attribute::OnlineCommunication)
                .or_default()
                .push(value);
        }
    }

    Ok(samples)
}

fn online_communication(review: &EnrichedReview, rules: &ResponseRules) -> Option<u8> {
    use clinicpulse_common::ResponseQuality;

    if !review.is_complaint {
        return None;
    }
    if !review.has_response {
        return Some(rules.complaint_no_response);
    }
    match review.response_quality {
        Some(ResponseQuality::Constructive) => Some(rules.complaint_response_good),
        _ => Some(rules.complaint_response_poor),
    }
}
