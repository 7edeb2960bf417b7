//! Sub-range selections for virtual array reads.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

use gridcat_common::{Axis, AxisValue, GridcatError, GridcatResult};

/// How one axis is restricted.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisSelector {
    /// Exactly these values, in this order. Values absent from the axis
    /// still get an output position (filled with NaN).
    Values(Vec<AxisValue>),
    /// Every axis value `v` with `low <= v <= high`, in axis order.
    Range { low: AxisValue, high: AxisValue },
    /// Axis positions `start..end`.
    Index(Range<usize>),
}

/// Per-axis restrictions; axes not named select their full extent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    selectors: Vec<(String, AxisSelector)>,
}

/// A selection applied to one axis: the output axis and a value → output
/// position map.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedAxis {
    pub axis: Axis,
    pub lookup: HashMap<AxisValue, usize>,
}

impl Selection {
    /// Everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn values<V: Into<AxisValue>>(
        self,
        axis: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.with(
            axis,
            AxisSelector::Values(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn value(self, axis: &str, value: impl Into<AxisValue>) -> Self {
        self.with(axis, AxisSelector::Values(vec![value.into()]))
    }

    pub fn range(self, axis: &str, low: impl Into<AxisValue>, high: impl Into<AxisValue>) -> Self {
        self.with(
            axis,
            AxisSelector::Range {
                low: low.into(),
                high: high.into(),
            },
        )
    }

    pub fn index(self, axis: &str, range: Range<usize>) -> Self {
        self.with(axis, AxisSelector::Index(range))
    }

    /// Set the selector for `axis`, replacing any earlier one.
    pub fn with(mut self, axis: &str, selector: AxisSelector) -> Self {
        self.selectors.retain(|(name, _)| name != axis);
        self.selectors.push((axis.to_string(), selector));
        self
    }

    pub fn get(&self, axis: &str) -> Option<&AxisSelector> {
        self.selectors
            .iter()
            .find(|(name, _)| name == axis)
            .map(|(_, s)| s)
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// Apply to a variable's axes, in their order.
    pub(crate) fn resolve(&self, axes: &[Arc<Axis>]) -> GridcatResult<Vec<ResolvedAxis>> {
        for (name, _) in &self.selectors {
            if !axes.iter().any(|a| a.name() == name) {
                return Err(GridcatError::invalid_selection(format!(
                    "unknown axis '{}'",
                    name
                )));
            }
        }

        axes.iter()
            .map(|axis| {
                let out = match self.get(axis.name()) {
                    None => axis.as_ref().clone(),
                    Some(selector) => select_axis(axis, selector)?,
                };
                let lookup = out
                    .values()
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (v.clone(), i))
                    .collect();
                Ok(ResolvedAxis { axis: out, lookup })
            })
            .collect()
    }
}

fn select_axis(axis: &Axis, selector: &AxisSelector) -> GridcatResult<Axis> {
    match selector {
        AxisSelector::Index(range) => {
            if range.start > range.end || range.end > axis.len() {
                return Err(GridcatError::invalid_selection(format!(
                    "index range {:?} out of bounds for axis '{}' of length {}",
                    range,
                    axis.name(),
                    axis.len()
                )));
            }
            let indices: Vec<usize> = range.clone().collect();
            Ok(axis.select(&indices))
        }
        AxisSelector::Range { low, high } => {
            if low > high {
                return Err(GridcatError::invalid_selection(format!(
                    "empty range {}..={} on axis '{}'",
                    low,
                    high,
                    axis.name()
                )));
            }
            let indices: Vec<usize> = axis
                .values()
                .iter()
                .enumerate()
                .filter(|(_, v)| *v >= low && *v <= high)
                .map(|(i, _)| i)
                .collect();
            Ok(axis.select(&indices))
        }
        AxisSelector::Values(values) => {
            let mut unique = HashSet::with_capacity(values.len());
            if let Some(dup) = values.iter().find(|v| !unique.insert(*v)) {
                return Err(GridcatError::invalid_selection(format!(
                    "value {} selected twice on axis '{}'",
                    dup,
                    axis.name()
                )));
            }

            Ok(axis.pick(values))
        }
    }
}
