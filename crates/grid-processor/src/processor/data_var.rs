//! Virtual arrays assembled on demand from the files of one domain.

use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use gridcat_common::{Attributes, Axis, GridcatError, GridcatResult, Progress, ProgressFn};
use storage::OpenerRegistry;

use super::selection::Selection;
use super::{ArrayBlock, Variable};
use crate::axis_manager::{AxisId, AxisManager};
use crate::domain::{Domain, SourceRow};

/// Where one file dimension lands in the output.
struct DimPlan {
    out_dim: usize,
    /// (position in the file axis, position in the output axis), file order.
    pairs: Vec<(usize, usize)>,
}

impl DimPlan {
    fn local_range(&self) -> Range<usize> {
        let min = self.pairs.iter().map(|p| p.0).min().unwrap_or(0);
        let max = self.pairs.iter().map(|p| p.0).max().unwrap_or(0);
        min..max + 1
    }

    /// Consecutive in both the file and the output.
    fn is_contiguous(&self) -> bool {
        self.pairs
            .windows(2)
            .all(|w| w[1].0 == w[0].0 + 1 && w[1].1 == w[0].1 + 1)
    }
}

#[derive(Default)]
struct ScatterStats {
    written: u64,
    overwritten: u64,
}

/// A lazily evaluated variable over one domain.
///
/// Axes are the variable's own axes, each rebuilt from the domain's value
/// set, in the dimension order of the first contributing file. Contributing files are
/// visited in catalog order, so where two files supply the same point the
/// later one wins.
pub struct DataVar {
    name: String,
    domain: Domain,
    axes: Vec<Arc<Axis>>,
    axis_ids: Vec<AxisId>,
    attrs: Attributes,
    rows: Vec<SourceRow>,
    ctx: Arc<AxisManager>,
    registry: Arc<OpenerRegistry>,
    progress_interval: u64,
}

impl DataVar {
    /// Build the virtual array for `name` over `domain`, from every row that
    /// contributes at least one point. Returns `None` when no row does.
    pub fn new(
        name: &str,
        domain: &Domain,
        rows: &[SourceRow],
        ctx: Arc<AxisManager>,
        registry: Arc<OpenerRegistry>,
        progress_interval: u64,
    ) -> Option<Self> {
        let overlapping: Vec<&SourceRow> = rows
            .iter()
            .filter(|r| r.variable == name && r.overlaps(domain, &ctx))
            .collect();

        // The variable spans its own axes, which may be fewer than the
        // domain's. Rows with another axis set belong to another array.
        let widest = overlapping.iter().map(|r| r.axes.len()).max()?;
        let schema = overlapping
            .iter()
            .find(|r| r.axes.len() == widest)
            .map(|r| sorted_names(r, &ctx))?;
        let contributing: Vec<SourceRow> = overlapping
            .into_iter()
            .filter(|r| sorted_names(r, &ctx) == schema)
            .cloned()
            .collect();
        let first = contributing.first()?;

        let mut axis_ids = Vec::with_capacity(first.axes.len());
        for &id in &first.axes {
            let axis_name = ctx.axis(id).name().to_string();
            let entry = domain.get(&axis_name)?;
            axis_ids.push(ctx.unsettify(entry.sample, entry.set));
        }
        let axes = axis_ids.iter().map(|&id| ctx.axis(id)).collect();
        let attrs = first.attrs.clone();

        Some(Self {
            name: name.to_string(),
            domain: domain.clone(),
            axes,
            axis_ids,
            attrs,
            rows: contributing,
            ctx,
            registry,
            progress_interval: progress_interval.max(1),
        })
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn axis_ids(&self) -> &[AxisId] {
        &self.axis_ids
    }

    pub fn axis(&self, name: &str) -> Option<&Axis> {
        self.axes
            .iter()
            .find(|a| a.name() == name)
            .map(|a| a.as_ref())
    }

    /// Contributing rows, in catalog order.
    pub fn rows(&self) -> &[SourceRow] {
        &self.rows
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.axes.iter().map(|a| a.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a selection; points covered by no file are NaN.
    pub fn read(&self, selection: &Selection) -> GridcatResult<ArrayBlock> {
        self.read_with_progress(selection, &mut |_: Progress| {})
    }

    pub fn read_with_progress(
        &self,
        selection: &Selection,
        progress: &mut ProgressFn<'_>,
    ) -> GridcatResult<ArrayBlock> {
        let resolved = selection.resolve(&self.axes)?;
        let out_shape: Vec<usize> = resolved.iter().map(|r| r.axis.len()).collect();
        let total: usize = out_shape.iter().product();
        let out_strides = strides(&out_shape);

        let mut data = vec![f32::NAN; total];
        let mut filled = vec![false; total];
        let mut stats = ScatterStats::default();
        let mut next_report = self.progress_interval;

        'rows: for row in &self.rows {
            let row_axes: Vec<Arc<Axis>> = row.axes.iter().map(|&id| self.ctx.axis(id)).collect();

            let mut plan = Vec::with_capacity(row_axes.len());
            for row_axis in &row_axes {
                let out_dim = self
                    .axes
                    .iter()
                    .position(|a| a.name() == row_axis.name())
                    .ok_or_else(|| {
                        GridcatError::inconsistent(
                            &row.path,
                            &self.name,
                            format!("axis '{}' is not part of the domain", row_axis.name()),
                        )
                    })?;
                let lookup = &resolved[out_dim].lookup;
                let pairs: Vec<(usize, usize)> = row_axis
                    .values()
                    .iter()
                    .enumerate()
                    .filter_map(|(i, v)| lookup.get(v).map(|&o| (i, o)))
                    .collect();
                if pairs.is_empty() {
                    continue 'rows;
                }
                plan.push(DimPlan { out_dim, pairs });
            }

            let block = self.read_row(row, &row_axes, &plan)?;
            scatter(&block, &plan, &out_strides, &mut data, &mut filled, &mut stats);

            if stats.written >= next_report {
                progress(Progress {
                    done: stats.written,
                    total: total as u64,
                });
                next_report = stats.written + self.progress_interval;
            }
        }

        progress(Progress {
            done: stats.written,
            total: total as u64,
        });
        if stats.overwritten > 0 {
            debug!(
                variable = %self.name,
                overwritten = stats.overwritten,
                "Overlapping files supplied the same points; later files won"
            );
        }

        Ok(ArrayBlock {
            axes: resolved.into_iter().map(|r| r.axis).collect(),
            data,
        })
    }

    /// Open a contributing file afresh, check it still matches the catalog
    /// and read the bounding block of the planned positions.
    fn read_row(
        &self,
        row: &SourceRow,
        row_axes: &[Arc<Axis>],
        plan: &[DimPlan],
    ) -> GridcatResult<Vec<f32>> {
        let opener = self.registry.get(&row.opener).ok_or_else(|| {
            GridcatError::Config(format!("no opener registered as '{}'", row.opener))
        })?;

        debug!(path = %row.path.display(), variable = %self.name, "Reading contributing file");
        let opened = opener.open(&row.path)?;
        let var = opened
            .into_iter()
            .find(|v| v.name == self.name)
            .ok_or_else(|| {
                GridcatError::inconsistent(&row.path, &self.name, "variable no longer in file")
            })?;

        let matches = var.axes.len() == row_axes.len()
            && var.axes.iter().zip(row_axes).all(|(a, b)| a == b.as_ref());
        if !matches {
            return Err(GridcatError::inconsistent(
                &row.path,
                &self.name,
                "axes differ from the catalog; rescan the file",
            ));
        }

        let ranges: Vec<Range<usize>> = plan.iter().map(DimPlan::local_range).collect();
        let expected: usize = ranges.iter().map(|r| r.len()).product();
        let block = var.reader.read(&ranges)?;
        if block.len() != expected {
            return Err(GridcatError::data_read(format!(
                "{}: reader returned {} values for {} requested",
                row.path.display(),
                block.len(),
                expected
            )));
        }
        Ok(block)
    }
}

impl Variable for DataVar {
    fn name(&self) -> &str {
        &self.name
    }

    fn axes(&self) -> &[Arc<Axis>] {
        &self.axes
    }

    fn attributes(&self) -> &Attributes {
        &self.attrs
    }

    fn materialize(&self, progress: &mut ProgressFn<'_>) -> GridcatResult<Vec<f32>> {
        Ok(self.read_with_progress(&Selection::all(), progress)?.data)
    }
}

impl std::fmt::Debug for DataVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataVar")
            .field("name", &self.name)
            .field("shape", &self.shape())
            .field("rows", &self.rows.len())
            .finish()
    }
}

fn sorted_names(row: &SourceRow, ctx: &AxisManager) -> Vec<String> {
    let mut names = row.axis_names(ctx);
    names.sort();
    names
}

/// Row-major strides for `shape`.
pub(crate) fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

/// Copy a file block into the output at the planned positions.
fn scatter(
    block: &[f32],
    plan: &[DimPlan],
    out_strides: &[usize],
    data: &mut [f32],
    filled: &mut [bool],
    stats: &mut ScatterStats,
) {
    let Some((last, outer)) = plan.split_last() else {
        if filled[0] {
            stats.overwritten += 1;
        }
        data[0] = block[0];
        filled[0] = true;
        stats.written += 1;
        return;
    };

    let ranges: Vec<Range<usize>> = plan.iter().map(DimPlan::local_range).collect();
    let extents: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
    let block_strides = strides(&extents);
    let last_min = ranges[plan.len() - 1].start;
    let contiguous = out_strides[last.out_dim] == 1 && last.is_contiguous();

    let mut counter = vec![0usize; outer.len()];
    loop {
        let mut src = 0;
        let mut dst = 0;
        for (d, dim) in outer.iter().enumerate() {
            let (local, out) = dim.pairs[counter[d]];
            src += (local - ranges[d].start) * block_strides[d];
            dst += out * out_strides[dim.out_dim];
        }

        if contiguous {
            let n = last.pairs.len();
            let (local, out) = last.pairs[0];
            let s = src + (local - last_min);
            let t = dst + out;
            data[t..t + n].copy_from_slice(&block[s..s + n]);
            for f in &mut filled[t..t + n] {
                if *f {
                    stats.overwritten += 1;
                }
                *f = true;
            }
        } else {
            let last_stride = block_strides[plan.len() - 1];
            for &(local, out) in &last.pairs {
                let s = src + (local - last_min) * last_stride;
                let t = dst + out * out_strides[last.out_dim];
                if filled[t] {
                    stats.overwritten += 1;
                }
                data[t] = block[s];
                filled[t] = true;
            }
        }
        stats.written += last.pairs.len() as u64;

        let mut d = outer.len();
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            counter[d] += 1;
            if counter[d] < outer[d].pairs.len() {
                break;
            }
            counter[d] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strides() {
        assert_eq!(strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(strides(&[5]), vec![1]);
        assert!(strides(&[]).is_empty());
    }

    #[test]
    fn test_scatter_contiguous_rows() {
        // 2x3 file block into a 3x4 output, offset by (1, 1).
        let plan = vec![
            DimPlan {
                out_dim: 0,
                pairs: vec![(0, 1), (1, 2)],
            },
            DimPlan {
                out_dim: 1,
                pairs: vec![(0, 1), (1, 2), (2, 3)],
            },
        ];
        let block = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut data = vec![f32::NAN; 12];
        let mut filled = vec![false; 12];
        let mut stats = ScatterStats::default();
        scatter(&block, &plan, &strides(&[3, 4]), &mut data, &mut filled, &mut stats);

        assert_eq!(stats.written, 6);
        assert!(data[0].is_nan());
        assert_eq!(&data[5..8], &[1.0, 2.0, 3.0]);
        assert_eq!(&data[9..12], &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_scatter_transposed_and_sparse() {
        // File dims (lon, lat) into output dims (lat, lon); only lon positions 0 and 2.
        let plan = vec![
            DimPlan {
                out_dim: 1,
                pairs: vec![(0, 0), (2, 1)],
            },
            DimPlan {
                out_dim: 0,
                pairs: vec![(0, 0), (1, 1)],
            },
        ];
        // Bounding block is lon 0..3 x lat 0..2.
        let block = vec![10.0, 11.0, 20.0, 21.0, 30.0, 31.0];
        let mut data = vec![f32::NAN; 4];
        let mut filled = vec![false; 4];
        let mut stats = ScatterStats::default();
        scatter(&block, &plan, &strides(&[2, 2]), &mut data, &mut filled, &mut stats);

        assert_eq!(data, vec![10.0, 30.0, 11.0, 31.0]);
        assert_eq!(stats.overwritten, 0);
    }

    #[test]
    fn test_scatter_counts_overwrites() {
        let plan = vec![DimPlan {
            out_dim: 0,
            pairs: vec![(0, 0), (1, 1)],
        }];
        let mut data = vec![f32::NAN; 2];
        let mut filled = vec![false; 2];
        let mut stats = ScatterStats::default();
        scatter(&[1.0, 2.0], &plan, &[1], &mut data, &mut filled, &mut stats);
        scatter(&[3.0, 4.0], &plan, &[1], &mut data, &mut filled, &mut stats);

        assert_eq!(data, vec![3.0, 4.0]);
        assert_eq!(stats.overwritten, 2);
    }
}
