//! Phase 2: cross-domain merging and subsumption removal.

use std::collections::HashSet;

use tracing::{debug, warn};

use gridcat_common::{GridcatError, GridcatResult};

use super::Domain;
use crate::axis_manager::{AxisManager, SetId};

/// Candidate domains from merging `d2` into `d1`.
///
/// Requires the same opener and every axis name of `d2` to exist in `d1`.
/// For each shared axis whose union strictly enlarges both sides, the new
/// domain takes that union, the intersection on every other shared axis and
/// `d1`'s values on axes only `d1` has. A merge is discarded when any shared
/// axis other than the merged one has an empty intersection.
fn merge_pair(d1: &Domain, d2: &Domain, ctx: &AxisManager) -> Vec<Domain> {
    if d1.opener() != d2.opener() || !d2.names_subset_of(d1) {
        return Vec::new();
    }

    let mut shared: Vec<(&str, SetId, SetId, SetId)> = Vec::with_capacity(d2.axes().len());
    let mut empty = Vec::new();
    for axis in d2.axes() {
        let Some(s1) = d1.set(&axis.name) else {
            return Vec::new();
        };
        let common = ctx.intersect(&[s1, axis.set]);
        if ctx.set_len(common) == 0 {
            empty.push(axis.name.as_str());
        }
        shared.push((axis.name.as_str(), s1, axis.set, common));
    }
    if empty.len() > 1 {
        return Vec::new();
    }

    let mut out = Vec::new();
    for &(name, s1, s2, _) in &shared {
        if empty.first().is_some_and(|&e| e != name) {
            continue;
        }
        let union = ctx.union(&[s1, s2]);
        if union == s1 || union == s2 {
            continue;
        }

        let mut merged = d1.with_set(name, union);
        for &(other, _, _, common) in &shared {
            if other != name {
                merged = merged.with_set(other, common);
            }
        }
        out.push(merged);
    }
    out
}

/// Merge ordered pairs of domains until no new domain appears.
///
/// Each productive round counts against `limit`; a run that would need more
/// rounds fails with [`GridcatError::MergeLimitExceeded`].
pub fn merge(domains: Vec<Domain>, ctx: &AxisManager, limit: usize) -> GridcatResult<Vec<Domain>> {
    let mut all = domains;
    let mut seen: HashSet<Domain> = all.iter().cloned().collect();
    let mut rounds = 0usize;

    loop {
        let mut fresh = Vec::new();
        for i in 0..all.len() {
            for j in 0..all.len() {
                if i == j {
                    continue;
                }
                for candidate in merge_pair(&all[i], &all[j], ctx) {
                    if seen.insert(candidate.clone()) {
                        fresh.push(candidate);
                    }
                }
            }
        }

        if fresh.is_empty() {
            break;
        }
        if rounds >= limit {
            warn!(rounds, domains = all.len() + fresh.len(), "Domain merge did not converge");
            return Err(GridcatError::MergeLimitExceeded {
                rounds,
                domains: all.len() + fresh.len(),
            });
        }
        rounds += 1;
        debug!(round = rounds, added = fresh.len(), "Merged domains");
        all.extend(fresh);
    }

    Ok(all)
}

/// Drop every domain covered by another domain of the same schema.
pub fn remove_subsumed(domains: Vec<Domain>, ctx: &AxisManager) -> Vec<Domain> {
    let keep: Vec<bool> = domains
        .iter()
        .enumerate()
        .map(|(i, d)| {
            !domains
                .iter()
                .enumerate()
                .any(|(j, other)| i != j && other != d && other.covers(d, ctx))
        })
        .collect();

    domains
        .into_iter()
        .zip(keep)
        .filter_map(|(d, keep)| keep.then_some(d))
        .collect()
}
