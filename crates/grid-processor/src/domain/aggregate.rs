//! Phase 1: aggregation along one axis at a time.

use std::collections::HashMap;

use tracing::trace;

use super::Domain;
use crate::axis_manager::{AxisManager, SetId};

/// Grouping key: opener plus every (name, set) pair, with the aggregated
/// axis masked to `None`.
type MaskedKey = (String, Vec<(String, Option<SetId>)>);

fn masked_key(domain: &Domain, masked: &str) -> MaskedKey {
    (
        domain.opener().to_string(),
        domain
            .axes()
            .iter()
            .map(|a| {
                let set = if a.name == masked { None } else { Some(a.set) };
                (a.name.clone(), set)
            })
            .collect(),
    )
}

/// Aggregate `domains` along each axis of `order` in turn.
pub fn aggregate(domains: Vec<Domain>, order: &[String], ctx: &AxisManager) -> Vec<Domain> {
    order
        .iter()
        .fold(domains, |current, name| aggregate_along(current, name, ctx))
}

/// Group domains that agree everywhere except on `name` and replace each
/// group with one domain carrying the union of its `name` values. Groups
/// keep the position of their first member.
fn aggregate_along(domains: Vec<Domain>, name: &str, ctx: &AxisManager) -> Vec<Domain> {
    let before = domains.len();
    let mut groups: Vec<Vec<Domain>> = Vec::new();
    let mut index: HashMap<MaskedKey, usize> = HashMap::new();

    for domain in domains {
        let key = masked_key(&domain, name);
        match index.get(&key) {
            Some(&g) => groups[g].push(domain),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![domain]);
            }
        }
    }

    let result: Vec<Domain> = groups
        .into_iter()
        .map(|group| {
            let first = &group[0];
            if group.len() == 1 || !first.has_axis(name) {
                return first.clone();
            }
            let sets: Vec<SetId> = group.iter().filter_map(|d| d.set(name)).collect();
            first.with_set(name, ctx.union(&sets))
        })
        .collect();

    trace!(axis = name, before, after = result.len(), "Aggregated along axis");
    result
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{row, values};
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use gridcat_common::{Axis, AxisValue};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_aggregates_disjoint_days() {
        let ctx = AxisManager::new();
        let domains: Vec<Domain> = (1..=3)
            .map(|d| {
                row(
                    &ctx,
                    "/f",
                    "X",
                    vec![Axis::time("time", [day(d)]), Axis::numeric("lat", [0.0, 1.0])],
                )
                .raw_domain(&ctx)
            })
            .collect();

        let out = aggregate(domains, &["time".to_string()], &ctx);
        assert_eq!(out.len(), 1);
        assert_eq!(
            values(&ctx, &out[0], "time"),
            vec![
                AxisValue::Time(day(1)),
                AxisValue::Time(day(2)),
                AxisValue::Time(day(3)),
            ]
        );
    }

    #[test]
    fn test_does_not_group_across_differing_axes() {
        let ctx = AxisManager::new();
        let a = row(
            &ctx,
            "/a",
            "X",
            vec![Axis::time("time", [day(1)]), Axis::numeric("lat", [0.0])],
        )
        .raw_domain(&ctx);
        let b = row(
            &ctx,
            "/b",
            "X",
            vec![Axis::time("time", [day(2)]), Axis::numeric("lat", [5.0])],
        )
        .raw_domain(&ctx);

        let out = aggregate(vec![a.clone(), b.clone()], &["time".to_string()], &ctx);
        assert_eq!(out, vec![a, b]);
    }

    #[test]
    fn test_domains_without_the_axis_pass_through() {
        let ctx = AxisManager::new();
        let a = row(&ctx, "/a", "X", vec![Axis::numeric("lat", [0.0])]).raw_domain(&ctx);
        let out = aggregate(vec![a.clone()], &["time".to_string()], &ctx);
        assert_eq!(out, vec![a]);
    }
}
