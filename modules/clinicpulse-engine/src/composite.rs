//! Composite scores: weighted combinations of per-attribute values with
//! renormalization over the attributes actually present.

use std::collections::BTreeMap;

use clinicpulse_common::Attribute;

/// Combine attribute-level values into one composite.
///
/// `composite = Σ(wᵢ·vᵢ) / Σ(wᵢ)` over the weighted attributes present in
/// `values`. Renormalizing over the present set is what lets an establishment
/// with no data for one dimension still get a composite from the rest,
/// instead of having the missing weight silently drag it toward zero.
/// Returns None when no weighted attribute carries a value.
pub fn composite_score(
    values: &BTreeMap<Attribute, f64>,
    weights: &BTreeMap<Attribute, f64>,
) -> Option<f64> {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for (attribute, &weight) in weights {
        if let Some(&value) = values.get(attribute) {
            weighted_sum += value * weight;
            total_weight += weight;
        }
    }

    if total_weight == 0.0 {
        return None;
    }
    Some(weighted_sum / total_weight)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(Attribute, f64)]) -> BTreeMap<Attribute, f64> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn no_present_attributes_yields_no_composite() {
        let values = BTreeMap::new();
        let w = weights(&[(Attribute::Facility, 0.5), (Attribute::PostOp, 0.5)]);
        assert_eq!(composite_score(&values, &w), None);
    }

    #[test]
    fn missing_attribute_renormalizes_to_the_present_one() {
        // Two weighted attributes, one missing: composite equals the present
        // attribute's value exactly.
        let values = weights(&[(Attribute::Facility, 62.5)]);
        let w = weights(&[(Attribute::Facility, 0.2), (Attribute::PostOp, 0.8)]);
        assert_eq!(composite_score(&values, &w), Some(62.5));
    }

    #[test]
    fn full_coverage_weighted_mean() {
        let values = weights(&[
            (Attribute::TreatmentSatisfaction, 80.0),
            (Attribute::StaffSatisfaction, 40.0),
        ]);
        let w = weights(&[
            (Attribute::TreatmentSatisfaction, 0.3),
            (Attribute::StaffSatisfaction, 0.1),
        ]);
        // (80*0.3 + 40*0.1) / 0.4 = 70.
        let composite = composite_score(&values, &w).unwrap();
        assert!((composite - 70.0).abs() < 1e-12);
    }

    #[test]
    fn weights_need_not_sum_to_one() {
        let values = weights(&[
            (Attribute::Scheduling, 10.0),
            (Attribute::OnsiteCommunication, 30.0),
        ]);
        let halves = weights(&[
            (Attribute::Scheduling, 0.5),
            (Attribute::OnsiteCommunication, 0.5),
        ]);
        let fives = weights(&[
            (Attribute::Scheduling, 5.0),
            (Attribute::OnsiteCommunication, 5.0),
        ]);
        assert_eq!(
            composite_score(&values, &halves),
            composite_score(&values, &fives)
        );
    }

    #[test]
    fn zero_weight_attribute_contributes_nothing() {
        let values = weights(&[
            (Attribute::Facility, -100.0),
            (Attribute::PostOp, 50.0),
        ]);
        let w = weights(&[(Attribute::Facility, 0.0), (Attribute::PostOp, 1.0)]);
        assert_eq!(composite_score(&values, &w), Some(50.0));
    }

    #[test]
    fn only_zero_weight_attributes_present_yields_none() {
        let values = weights(&[(Attribute::Facility, 50.0)]);
        let w = weights(&[(Attribute::Facility, 0.0), (Attribute::PostOp, 1.0)]);
        assert_eq!(composite_score(&values, &w), None);
    }

    #[test]
    fn unweighted_attributes_are_ignored() {
        let values = weights(&[
            (Attribute::Facility, 10.0),
            (Attribute::Affordability, 90.0),
        ]);
        let w = weights(&[(Attribute::Facility, 1.0)]);
        assert_eq!(composite_score(&values, &w), Some(10.0));
    }
}
