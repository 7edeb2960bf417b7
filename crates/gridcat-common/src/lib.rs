//! Common types and utilities shared across all gridcat crates.
//!
//! - [`Axis`]: named, typed coordinate sequences (time, levels, stations, variable lists)
//! - [`Attributes`]: typed metadata map with an escape hatch for unknown keys
//! - [`GridcatError`]: the error taxonomy used by catalog, domain and cache code
//! - [`Progress`] / [`CancelFlag`]: synchronous progress reporting and cancellation

pub mod attrs;
pub mod axis;
pub mod error;
pub mod progress;
pub mod time;

pub use attrs::{AttrKey, AttrValue, Attributes};
pub use axis::{Axis, AxisKind, AxisValue, ValueSet, ValueTuple, VARLIST_AXIS};
pub use error::{ErrorKind, GridcatError, GridcatResult};
pub use progress::{CancelFlag, Progress, ProgressFn};
pub use time::{DateRange, TimeParseError};
