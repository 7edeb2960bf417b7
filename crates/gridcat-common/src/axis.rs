//! Coordinate axes.
//!
//! An [`Axis`] is an ordered sequence of coordinate values with a name, a
//! kind tag and optional auxiliary arrays running parallel to the values
//! (for example calendar fields alongside timestamps). Axes are immutable
//! once built.
//!
//! Domain algebra works on the unordered form of an axis, its *value set*:
//! one [`ValueTuple`] per position holding the value followed by the
//! auxiliary entries at that position. Auxiliary arrays of kinds that can
//! rebuild them from the values alone (see [`AxisKind::aux_reconstructible`])
//! are left out of tuples and out of equality.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GridcatError, GridcatResult};

/// Name of the degenerate axis whose values are variable names.
pub const VARLIST_AXIS: &str = "varlist";

/// The closed set of axis kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    /// Timestamps.
    Temporal,
    /// Vertical levels (pressure, height, model levels).
    Levels,
    /// Unordered labels such as station identifiers.
    Categorical,
    /// Variable names.
    Varlist,
    /// Anything else (lat, lon, generic numeric coordinates).
    Generic,
}

impl AxisKind {
    /// Whether auxiliary arrays of this kind can be rebuilt from the values.
    ///
    /// Temporal calendar fields (year, month, ...) are derived from the
    /// timestamps, so they neither take part in equality nor in value tuples.
    pub fn aux_reconstructible(self) -> bool {
        matches!(self, AxisKind::Temporal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AxisKind::Temporal => "temporal",
            AxisKind::Levels => "levels",
            AxisKind::Categorical => "categorical",
            AxisKind::Varlist => "varlist",
            AxisKind::Generic => "generic",
        }
    }
}

impl fmt::Display for AxisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single coordinate value.
///
/// Numbers compare with a total order (`-0.0 == 0.0`, all NaNs equal) so
/// values can live in ordered and hashed sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisValue {
    Number(f64),
    Time(DateTime<Utc>),
    Label(String),
}

impl AxisValue {
    fn rank(&self) -> u8 {
        match self {
            AxisValue::Number(_) => 0,
            AxisValue::Time(_) => 1,
            AxisValue::Label(_) => 2,
        }
    }

    fn canonical(v: f64) -> f64 {
        if v == 0.0 {
            0.0
        } else if v.is_nan() {
            f64::NAN
        } else {
            v
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AxisValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            AxisValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            AxisValue::Label(s) => Some(s),
            _ => None,
        }
    }

    /// Missing marker of the same flavour: an empty label for labels, NaN
    /// otherwise.
    pub fn missing_like(&self) -> AxisValue {
        match self {
            AxisValue::Label(_) => AxisValue::Label(String::new()),
            _ => AxisValue::Number(f64::NAN),
        }
    }
}

impl PartialEq for AxisValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AxisValue {}

impl PartialOrd for AxisValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AxisValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (AxisValue::Number(a), AxisValue::Number(b)) => {
                Self::canonical(*a).total_cmp(&Self::canonical(*b))
            }
            (AxisValue::Time(a), AxisValue::Time(b)) => a.cmp(b),
            (AxisValue::Label(a), AxisValue::Label(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for AxisValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            AxisValue::Number(v) => Self::canonical(*v).to_bits().hash(state),
            AxisValue::Time(t) => t.timestamp_nanos_opt().unwrap_or(i64::MAX).hash(state),
            AxisValue::Label(s) => s.hash(state),
        }
    }
}

impl fmt::Display for AxisValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisValue::Number(v) => write!(f, "{}", v),
            AxisValue::Time(t) => write!(f, "{}", t.format("%Y-%m-%dT%H:%M:%SZ")),
            AxisValue::Label(s) => f.write_str(s),
        }
    }
}

impl From<f64> for AxisValue {
    fn from(v: f64) -> Self {
        AxisValue::Number(v)
    }
}

impl From<DateTime<Utc>> for AxisValue {
    fn from(t: DateTime<Utc>) -> Self {
        AxisValue::Time(t)
    }
}

impl From<&str> for AxisValue {
    fn from(s: &str) -> Self {
        AxisValue::Label(s.to_string())
    }
}

impl From<String> for AxisValue {
    fn from(s: String) -> Self {
        AxisValue::Label(s)
    }
}

/// One axis position in set form: the value followed by its non-reconstructible aux entries.
pub type ValueTuple = Vec<AxisValue>;

/// Unordered, comparable form of an axis.
pub type ValueSet = BTreeSet<ValueTuple>;

/// A named, typed, ordered sequence of coordinate values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    name: String,
    kind: AxisKind,
    values: Vec<AxisValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    aux: BTreeMap<String, Vec<AxisValue>>,
}

impl Axis {
    pub fn new(name: impl Into<String>, kind: AxisKind, values: Vec<AxisValue>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
            aux: BTreeMap::new(),
        }
    }

    /// Temporal axis from timestamps.
    pub fn time(name: impl Into<String>, times: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        Self::new(
            name,
            AxisKind::Temporal,
            times.into_iter().map(AxisValue::Time).collect(),
        )
    }

    /// Vertical level axis.
    pub fn levels(name: impl Into<String>, levels: impl IntoIterator<Item = f64>) -> Self {
        Self::new(
            name,
            AxisKind::Levels,
            levels.into_iter().map(AxisValue::Number).collect(),
        )
    }

    /// Generic numeric axis (latitude, longitude, ...).
    pub fn numeric(name: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(
            name,
            AxisKind::Generic,
            values.into_iter().map(AxisValue::Number).collect(),
        )
    }

    /// Categorical axis of labels (station ids).
    pub fn categorical<S: Into<String>>(
        name: impl Into<String>,
        labels: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            AxisKind::Categorical,
            labels.into_iter().map(|s| AxisValue::Label(s.into())).collect(),
        )
    }

    /// The variable-name axis.
    pub fn varlist<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self::new(
            VARLIST_AXIS,
            AxisKind::Varlist,
            names.into_iter().map(|s| AxisValue::Label(s.into())).collect(),
        )
    }

    /// Attach an auxiliary array. Its length must match the axis length.
    pub fn with_aux(mut self, key: impl Into<String>, values: Vec<AxisValue>) -> GridcatResult<Self> {
        let key = key.into();
        if values.len() != self.values.len() {
            return Err(GridcatError::invalid_axis(
                &self.name,
                format!(
                    "aux array '{}' has {} entries, axis has {}",
                    key,
                    values.len(),
                    self.values.len()
                ),
            ));
        }
        self.aux.insert(key, values);
        Ok(self)
    }

    /// Attach calendar fields derived from the timestamps of a temporal axis.
    pub fn with_calendar_fields(mut self, fields: &[&str]) -> GridcatResult<Self> {
        for field in fields {
            let derived = calendar_field(field, &self.values).ok_or_else(|| {
                GridcatError::invalid_axis(
                    &self.name,
                    format!("cannot derive calendar field '{}'", field),
                )
            })?;
            self.aux.insert(field.to_string(), derived);
        }
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AxisKind {
        self.kind
    }

    pub fn values(&self) -> &[AxisValue] {
        &self.values
    }

    pub fn aux(&self, key: &str) -> Option<&[AxisValue]> {
        self.aux.get(key).map(Vec::as_slice)
    }

    pub fn aux_keys(&self) -> impl Iterator<Item = &str> {
        self.aux.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_temporal(&self) -> bool {
        self.kind == AxisKind::Temporal
    }

    /// First and last timestamp of a temporal axis, in axis order.
    pub fn time_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if !self.is_temporal() {
            return None;
        }
        let first = self.values.first()?.as_time()?;
        let last = self.values.last()?.as_time()?;
        Some((first, last))
    }

    /// Value tuple at one position.
    pub fn tuple_at(&self, index: usize) -> ValueTuple {
        let mut tuple = Vec::with_capacity(1 + self.aux.len());
        tuple.push(self.values[index].clone());
        if !self.kind.aux_reconstructible() {
            for aux in self.aux.values() {
                tuple.push(aux[index].clone());
            }
        }
        tuple
    }

    /// Value tuples in axis order.
    pub fn tuples(&self) -> Vec<ValueTuple> {
        (0..self.values.len()).map(|i| self.tuple_at(i)).collect()
    }

    /// New axis holding the given positions, in the given order, with aux
    /// arrays carried along.
    pub fn select(&self, indices: &[usize]) -> Axis {
        Axis {
            name: self.name.clone(),
            kind: self.kind,
            values: indices.iter().map(|&i| self.values[i].clone()).collect(),
            aux: self
                .aux
                .iter()
                .map(|(k, col)| (k.clone(), indices.iter().map(|&i| col[i].clone()).collect()))
                .collect(),
        }
    }

    /// New axis over `values` in the given order, which may include values
    /// not on this axis. Calendar fields are derived again; other aux
    /// entries are carried for known values and missing markers otherwise.
    pub fn pick(&self, values: &[AxisValue]) -> Axis {
        let aux = if self.kind.aux_reconstructible() {
            self.aux
                .keys()
                .filter_map(|k| calendar_field(k, values).map(|col| (k.clone(), col)))
                .collect()
        } else {
            let positions: Vec<Option<usize>> = values.iter().map(|v| self.position(v)).collect();
            self.aux
                .iter()
                .map(|(k, col)| {
                    let missing = col
                        .first()
                        .map(AxisValue::missing_like)
                        .unwrap_or(AxisValue::Number(f64::NAN));
                    let filled = positions
                        .iter()
                        .map(|p| p.map_or_else(|| missing.clone(), |i| col[i].clone()))
                        .collect();
                    (k.clone(), filled)
                })
                .collect()
        };
        Axis {
            name: self.name.clone(),
            kind: self.kind,
            values: values.to_vec(),
            aux,
        }
    }

    /// Position of the first occurrence of `value`.
    pub fn position(&self, value: &AxisValue) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }

    /// Unordered set form of this axis.
    pub fn settify(&self) -> ValueSet {
        self.tuples().into_iter().collect()
    }

    /// Rebuild a concrete, sorted axis from a value set, using `sample` for
    /// the name, kind and auxiliary layout.
    pub fn unsettify(sample: &Axis, set: &ValueSet) -> Axis {
        let values: Vec<AxisValue> = set.iter().filter_map(|t| t.first().cloned()).collect();
        let mut aux = BTreeMap::new();
        if sample.kind.aux_reconstructible() {
            for key in sample.aux.keys() {
                if let Some(derived) = calendar_field(key, &values) {
                    aux.insert(key.clone(), derived);
                }
            }
        } else {
            for (pos, key) in sample.aux.keys().enumerate() {
                let column: Vec<AxisValue> =
                    set.iter().filter_map(|t| t.get(pos + 1).cloned()).collect();
                if column.len() == values.len() {
                    aux.insert(key.clone(), column);
                }
            }
        }
        Axis {
            name: sample.name.clone(),
            kind: sample.kind,
            values,
            aux,
        }
    }

    /// Structural hash over name, kind, values and compared aux arrays.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl PartialEq for Axis {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.values == other.values
            && (self.kind.aux_reconstructible() || self.aux == other.aux)
    }
}

impl Eq for Axis {}

impl Hash for Axis {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.kind.hash(state);
        self.values.hash(state);
        if !self.kind.aux_reconstructible() {
            self.aux.hash(state);
        }
    }
}

fn calendar_field(field: &str, values: &[AxisValue]) -> Option<Vec<AxisValue>> {
    let extract: fn(&DateTime<Utc>) -> u32 = match field {
        "year" => |t: &DateTime<Utc>| t.year() as u32,
        "month" => |t: &DateTime<Utc>| t.month(),
        "day" => |t: &DateTime<Utc>| t.day(),
        "hour" => |t: &DateTime<Utc>| t.hour(),
        "minute" => |t: &DateTime<Utc>| t.minute(),
        "second" => |t: &DateTime<Utc>| t.second(),
        _ => return None,
    };
    values
        .iter()
        .map(|v| v.as_time().map(|t| AxisValue::Number(extract(&t) as f64)))
        .collect()
}
