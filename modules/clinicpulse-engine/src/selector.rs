//! Incremental selection: the minimal correct input set for any stage.
//!
//! A stage's pending work is the set of upstream keys with no corresponding
//! downstream row. Returned in deterministic order (oldest publication first,
//! ties broken by key) so repeated runs over unchanged data produce
//! comparable, diffable logs.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Select upstream keys not yet present downstream.
///
/// `force` ignores the downstream set entirely (explicit reprocessing).
/// `limit` caps the batch (quick mode). It is a cap only, applied after ordering,
/// never a different selection algorithm.
///
/// Keys without a publication timestamp sort after all dated ones.
pub fn select_pending(
    upstream: Vec<(Uuid, Option<DateTime<Utc>>)>,
    downstream: &HashSet<Uuid>,
    force: bool,
    limit: Option<usize>,
) -> Vec<Uuid> {
    let mut pending: Vec<(Uuid, Option<DateTime<Utc>>)> = upstream
        .into_iter()
        .filter(|(id, _)| force || !downstream.contains(id))
        .collect();

    pending.sort_by(|a, b| match (a.1, b.1) {
        (Some(ta), Some(tb)) => ta.cmp(&tb).then(a.0.cmp(&b.0)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.0.cmp(&b.0),
    });

    let mut keys: Vec<Uuid> = pending.into_iter().map(|(id, _)| id).collect();
    if let Some(limit) = limit {
        keys.truncate(limit);
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap())
    }

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn selects_only_unprocessed_keys_in_publication_order() {
        // 100 already enriched, 5 new: exactly the 5 come back, oldest first.
        let mut upstream = Vec::new();
        let mut downstream = HashSet::new();
        for n in 0..100u128 {
            upstream.push((id(n), ts(1)));
            downstream.insert(id(n));
        }
        // New ones with out-of-order timestamps.
        upstream.push((id(204), ts(9)));
        upstream.push((id(201), ts(3)));
        upstream.push((id(203), ts(7)));
        upstream.push((id(200), ts(2)));
        upstream.push((id(202), ts(5)));

        let selected = select_pending(upstream, &downstream, false, None);
        assert_eq!(
            selected,
            vec![id(200), id(201), id(202), id(203), id(204)]
        );
    }

    #[test]
    fn ties_break_by_key() {
        let upstream = vec![(id(5), ts(1)), (id(2), ts(1)), (id(9), ts(1))];
        let selected = select_pending(upstream, &HashSet::new(), false, None);
        assert_eq!(selected, vec![id(2), id(5), id(9)]);
    }

    #[test]
    fn undated_keys_sort_last() {
        let upstream = vec![(id(1), None), (id(2), ts(28)), (id(3), None)];
        let selected = select_pending(upstream, &HashSet::new(), false, None);
        assert_eq!(selected, vec![id(2), id(1), id(3)]);
    }

    #[test]
    fn force_ignores_downstream() {
        let upstream = vec![(id(1), ts(1)), (id(2), ts(2))];
        let downstream: HashSet<Uuid> = [id(1), id(2)].into();

        assert!(select_pending(upstream.clone(), &downstream, false, None).is_empty());
        assert_eq!(
            select_pending(upstream, &downstream, true, None),
            vec![id(1), id(2)]
        );
    }

    #[test]
    fn limit_caps_after_ordering() {
        let upstream = vec![(id(3), ts(3)), (id(1), ts(1)), (id(2), ts(2))];
        let selected = select_pending(upstream, &HashSet::new(), false, Some(2));
        assert_eq!(selected, vec![id(1), id(2)]);
    }

    #[test]
    fn deterministic_across_runs() {
        let upstream = vec![(id(7), ts(2)), (id(4), ts(2)), (id(9), None), (id(1), ts(5))];
        let first = select_pending(upstream.clone(), &HashSet::new(), false, None);
        let second = select_pending(upstream, &HashSet::new(), false, None);
        assert_eq!(first, second);
    }
}
