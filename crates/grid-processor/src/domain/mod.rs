//! Domain algebra.
//!
//! A [`Domain`] is one coverage pattern: for each axis name, the set of
//! values some variable(s) exist at. The `varlist` axis carries the variable
//! names, so "which variable" is reasoned about like any other dimension.
//!
//! [`compute_domains`] reduces the per-(file, variable) raw domains of a
//! catalog table to a small non-redundant set in two phases: aggregation one
//! axis at a time ([`aggregate`]), then pairwise merging of partially
//! overlapping domains followed by subsumption removal ([`merge`]).

mod aggregate;
mod merge;

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use tracing::{debug, info};

use gridcat_common::{Attributes, Axis, AxisValue, GridcatResult, VARLIST_AXIS};
use storage::CatalogEntry;

use crate::axis_manager::{AxisId, AxisManager, SetId};

pub use aggregate::aggregate;
pub use merge::{merge, remove_subsumed};

/// One axis of a domain: a sample axis (for reconstruction) and a value set.
#[derive(Debug, Clone)]
pub struct DomainAxis {
    pub name: String,
    pub sample: AxisId,
    pub set: SetId,
}

/// A named combination of axis value sets, tied to one opener.
///
/// Equality and hashing consider the opener, axis names and value sets; the
/// sample axes are reconstruction hints only.
#[derive(Debug, Clone)]
pub struct Domain {
    opener: String,
    axes: Vec<DomainAxis>,
}

impl PartialEq for Domain {
    fn eq(&self, other: &Self) -> bool {
        self.opener == other.opener
            && self.axes.len() == other.axes.len()
            && self
                .axes
                .iter()
                .zip(&other.axes)
                .all(|(a, b)| a.name == b.name && a.set == b.set)
    }
}

impl Eq for Domain {}

impl Hash for Domain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.opener.hash(state);
        for axis in &self.axes {
            axis.name.hash(state);
            axis.set.hash(state);
        }
    }
}

impl Domain {
    /// Axes are kept sorted by name.
    pub fn new(opener: impl Into<String>, mut axes: Vec<DomainAxis>) -> Self {
        axes.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            opener: opener.into(),
            axes,
        }
    }

    pub fn opener(&self) -> &str {
        &self.opener
    }

    pub fn axes(&self) -> &[DomainAxis] {
        &self.axes
    }

    pub fn get(&self, name: &str) -> Option<&DomainAxis> {
        self.axes
            .binary_search_by(|a| a.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.axes[i])
    }

    pub fn set(&self, name: &str) -> Option<SetId> {
        self.get(name).map(|a| a.set)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.axes.iter().map(|a| a.name.as_str())
    }

    pub fn has_axis(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether every axis name of `self` also appears in `other`.
    pub fn names_subset_of(&self, other: &Domain) -> bool {
        self.names().all(|n| other.has_axis(n))
    }

    pub fn same_schema(&self, other: &Domain) -> bool {
        self.opener == other.opener
            && self.axes.len() == other.axes.len()
            && self.names().zip(other.names()).all(|(a, b)| a == b)
    }

    /// Copy with the value set of `name` replaced.
    pub(crate) fn with_set(&self, name: &str, set: SetId) -> Domain {
        let mut next = self.clone();
        if let Some(axis) = next.axes.iter_mut().find(|a| a.name == name) {
            axis.set = set;
        }
        next
    }

    /// Variable names on the varlist axis, sorted.
    pub fn variables(&self, ctx: &AxisManager) -> Vec<String> {
        self.set(VARLIST_AXIS)
            .map(|set| {
                ctx.set(set)
                    .iter()
                    .filter_map(|t| t.first().and_then(AxisValue::as_label).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains_variable(&self, ctx: &AxisManager, name: &str) -> bool {
        self.variables(ctx).iter().any(|v| v == name)
    }

    /// Whether `self` covers `other`: same schema and every value set of
    /// `other` is a subset of the matching one here.
    pub fn covers(&self, other: &Domain, ctx: &AxisManager) -> bool {
        self.same_schema(other)
            && self
                .axes
                .iter()
                .zip(&other.axes)
                .all(|(mine, theirs)| ctx.is_subset(theirs.set, mine.set))
    }

    /// Number of coordinate points claimed, excluding the varlist axis.
    pub fn extent(&self, ctx: &AxisManager) -> usize {
        self.axes
            .iter()
            .filter(|a| a.name != VARLIST_AXIS)
            .map(|a| ctx.set_len(a.set))
            .product()
    }
}

/// One (file, variable) row of a catalog table, with axes resolved to
/// canonical handles.
#[derive(Debug, Clone)]
pub struct SourceRow {
    pub path: PathBuf,
    pub opener: String,
    pub variable: String,
    /// In the file's own dimension order.
    pub axes: Vec<AxisId>,
    pub attrs: Attributes,
}

impl SourceRow {
    /// Rows for every variable of every entry, in table order.
    pub fn from_table(table: &[CatalogEntry], ctx: &AxisManager) -> Vec<SourceRow> {
        let mut rows = Vec::new();
        for entry in table {
            for var in &entry.variables {
                rows.push(SourceRow {
                    path: entry.path.clone(),
                    opener: entry.opener.clone(),
                    variable: var.name.clone(),
                    axes: var.axes.iter().map(|a| ctx.intern(a.clone())).collect(),
                    attrs: var.attrs.clone(),
                });
            }
        }
        rows
    }

    /// The single-file, single-variable domain of this row.
    pub fn raw_domain(&self, ctx: &AxisManager) -> Domain {
        let mut axes: Vec<DomainAxis> = self
            .axes
            .iter()
            .map(|&id| DomainAxis {
                name: ctx.axis(id).name().to_string(),
                sample: id,
                set: ctx.settify(id),
            })
            .collect();
        let varlist = ctx.intern(Axis::varlist([self.variable.as_str()]));
        axes.push(DomainAxis {
            name: VARLIST_AXIS.to_string(),
            sample: varlist,
            set: ctx.settify(varlist),
        });
        Domain::new(self.opener.clone(), axes)
    }

    /// Whether every axis of this row is a non-varlist axis of the domain.
    /// A merged domain can have more axes than some of its variables.
    pub fn matches_schema(&self, domain: &Domain, ctx: &AxisManager) -> bool {
        domain.opener() == self.opener
            && self.axes.len() < domain.axes().len()
            && self.axes.iter().all(|&id| {
                let axis = ctx.axis(id);
                axis.name() != VARLIST_AXIS && domain.has_axis(axis.name())
            })
    }

    /// Axis names in file order.
    pub fn axis_names(&self, ctx: &AxisManager) -> Vec<String> {
        self.axes
            .iter()
            .map(|&id| ctx.axis(id).name().to_string())
            .collect()
    }

    /// Whether this row contributes at least one point to `domain`.
    pub fn overlaps(&self, domain: &Domain, ctx: &AxisManager) -> bool {
        self.matches_schema(domain, ctx)
            && domain.contains_variable(ctx, &self.variable)
            && self.axes.iter().all(|&id| {
                let name = ctx.axis(id).name().to_string();
                domain.set(&name).is_some_and(|set| {
                    let common = ctx.intersect(&[ctx.settify(id), set]);
                    ctx.set_len(common) > 0
                })
            })
    }
}

/// Axis processing order for aggregation: temporal axes first, then every
/// other name (varlist included) in first-seen order.
pub fn aggregation_order(rows: &[SourceRow], ctx: &AxisManager) -> Vec<String> {
    let mut temporal = Vec::new();
    let mut rest = Vec::new();
    let mut seen = HashSet::new();
    for row in rows {
        for &id in &row.axes {
            let axis = ctx.axis(id);
            if seen.insert(axis.name().to_string()) {
                if axis.is_temporal() {
                    temporal.push(axis.name().to_string());
                } else {
                    rest.push(axis.name().to_string());
                }
            }
        }
        if seen.insert(VARLIST_AXIS.to_string()) {
            rest.push(VARLIST_AXIS.to_string());
        }
    }
    temporal.extend(rest);
    temporal
}

/// Minimal covering set of domains for the given rows.
pub fn compute_domains(
    rows: &[SourceRow],
    ctx: &AxisManager,
    merge_limit: usize,
) -> GridcatResult<Vec<Domain>> {
    let mut seen = HashSet::new();
    let mut raw = Vec::new();
    for row in rows {
        let domain = row.raw_domain(ctx);
        if seen.insert(domain.clone()) {
            raw.push(domain);
        }
    }
    if raw.is_empty() {
        return Ok(raw);
    }

    let order = aggregation_order(rows, ctx);
    debug!(rows = rows.len(), raw = raw.len(), order = ?order, "Aggregating domains");

    let raw_count = raw.len();
    let aggregated = aggregate(raw, &order, ctx);
    let aggregated_count = aggregated.len();
    let merged = merge(aggregated, ctx, merge_limit)?;
    let merged_count = merged.len();
    let domains = remove_subsumed(merged, ctx);

    info!(
        raw = raw_count,
        aggregated = aggregated_count,
        merged = merged_count,
        domains = domains.len(),
        "Computed domains"
    );
    Ok(domains)
}
