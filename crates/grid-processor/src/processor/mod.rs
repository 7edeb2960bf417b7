//! Variables: the virtual arrays built from catalog domains, derived
//! variables computed by analysis code, and the Zarr file opener.

mod data_var;
mod selection;
mod zarr;

pub use data_var::DataVar;
pub use selection::{AxisSelector, Selection};
pub use zarr::{ZarrOpener, ZARR_OPENER_ID};

pub(crate) use data_var::strides;

use std::sync::Arc;

use gridcat_common::{Attributes, Axis, GridcatError, GridcatResult, Progress, ProgressFn};

/// Anything with named axes, attributes and data that can be forced into
/// memory. This is what the result cache consumes.
pub trait Variable {
    fn name(&self) -> &str;

    /// Axes in dimension order.
    fn axes(&self) -> &[Arc<Axis>];

    fn attributes(&self) -> &Attributes;

    /// Evaluate the variable into a row-major buffer over `axes()`.
    fn materialize(&self, progress: &mut ProgressFn<'_>) -> GridcatResult<Vec<f32>>;

    fn shape(&self) -> Vec<usize> {
        self.axes().iter().map(|a| a.len()).collect()
    }

    /// The first temporal axis, if any.
    fn time_axis(&self) -> Option<&Axis> {
        self.axes()
            .iter()
            .find(|a| a.is_temporal())
            .map(|a| a.as_ref())
    }
}

/// Result of a virtual array read: the output axes and row-major data.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayBlock {
    pub axes: Vec<Axis>,
    pub data: Vec<f32>,
}

impl ArrayBlock {
    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(Axis::len).collect()
    }

    /// Value at a multi-index.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        if index.len() != self.axes.len() {
            return None;
        }
        let shape = self.shape();
        if index.iter().zip(&shape).any(|(i, n)| i >= n) {
            return None;
        }
        let flat: usize = index
            .iter()
            .zip(strides(&shape))
            .map(|(i, s)| i * s)
            .sum();
        self.data.get(flat).copied()
    }

    /// Number of NaN elements.
    pub fn missing(&self) -> usize {
        self.data.iter().filter(|v| v.is_nan()).count()
    }
}

type Compute = dyn Fn() -> GridcatResult<Vec<f32>> + Send + Sync;

/// A variable computed by a closure.
pub struct DerivedVar {
    name: String,
    axes: Vec<Arc<Axis>>,
    attrs: Attributes,
    compute: Box<Compute>,
}

impl DerivedVar {
    pub fn new<F>(name: impl Into<String>, axes: Vec<Axis>, attrs: Attributes, compute: F) -> Self
    where
        F: Fn() -> GridcatResult<Vec<f32>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            axes: axes.into_iter().map(Arc::new).collect(),
            attrs,
            compute: Box::new(compute),
        }
    }

    /// Wrap already computed data.
    pub fn from_block(name: impl Into<String>, block: ArrayBlock, attrs: Attributes) -> Self {
        let data = Arc::new(block.data);
        Self::new(name, block.axes, attrs, move || Ok(data.as_ref().clone()))
    }
}

impl Variable for DerivedVar {
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
        let data = (self.compute)()?;
        let expected: usize = self.shape().iter().product();
        if data.len() != expected {
            return Err(GridcatError::data_read(format!(
                "derived variable '{}' produced {} values for shape {:?}",
                self.name,
                data.len(),
                self.shape()
            )));
        }
        progress(Progress {
            done: data.len() as u64,
            total: expected as u64,
        });
        Ok(data)
    }
}

impl std::fmt::Debug for DerivedVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedVar")
            .field("name", &self.name)
            .field("shape", &self.shape())
            .finish()
    }
}
