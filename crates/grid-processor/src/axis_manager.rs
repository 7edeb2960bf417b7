//! Axis deduplication and memoized set algebra.
//!
//! The manager owns every canonical [`Axis`] and every [`ValueSet`] in two
//! arenas. Everything else refers to them through [`AxisId`] / [`SetId`]
//! handles, so structurally equal axes compare equal by handle and set
//! operations are computed once per distinct input.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use gridcat_common::{Axis, AxisKind, ValueSet};

/// Handle to a canonical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AxisId(u32);

/// Handle to a canonical value set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetId(u32);

/// Lookup statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisManagerStats {
    pub axes: usize,
    pub sets: usize,
    pub identity_hits: u64,
    pub content_hits: u64,
    pub misses: u64,
}

/// Name, kind and aux layout: everything `unsettify` takes from its sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ShapeKey {
    name: String,
    kind: AxisKind,
    aux: Vec<String>,
}

impl ShapeKey {
    fn of(axis: &Axis) -> Self {
        Self {
            name: axis.name().to_string(),
            kind: axis.kind(),
            aux: axis.aux_keys().map(str::to_string).collect(),
        }
    }
}

#[derive(Default)]
struct Inner {
    axes: Vec<Arc<Axis>>,
    buckets: HashMap<u64, Vec<AxisId>>,
    // Keyed by allocation address; the Arc is pinned so the address stays unique.
    by_identity: HashMap<usize, AxisId>,
    pinned: Vec<Arc<Axis>>,

    sets: Vec<Arc<ValueSet>>,
    set_index: HashMap<Arc<ValueSet>, SetId>,

    settified: HashMap<AxisId, SetId>,
    unsettified: HashMap<(ShapeKey, SetId), AxisId>,
    unions: HashMap<Vec<SetId>, SetId>,
    intersections: HashMap<Vec<SetId>, SetId>,
    axis_intersections: HashMap<Vec<AxisId>, AxisId>,
}

impl Inner {
    fn intern(&mut self, axis: Arc<Axis>) -> (AxisId, bool) {
        let hash = axis.content_hash();
        if let Some(bucket) = self.buckets.get(&hash) {
            for &id in bucket {
                if *self.axes[id.0 as usize] == *axis {
                    return (id, true);
                }
            }
        }
        let id = AxisId(self.axes.len() as u32);
        self.axes.push(axis);
        self.buckets.entry(hash).or_default().push(id);
        (id, false)
    }

    fn intern_set(&mut self, set: ValueSet) -> SetId {
        if let Some(&id) = self.set_index.get(&set) {
            return id;
        }
        let id = SetId(self.sets.len() as u32);
        let set = Arc::new(set);
        self.sets.push(Arc::clone(&set));
        self.set_index.insert(set, id);
        id
    }

    fn settify(&mut self, id: AxisId) -> SetId {
        if let Some(&set) = self.settified.get(&id) {
            return set;
        }
        let set = self.axes[id.0 as usize].settify();
        let set_id = self.intern_set(set);
        self.settified.insert(id, set_id);
        set_id
    }

    fn unsettify(&mut self, sample: AxisId, set: SetId) -> AxisId {
        let sample_axis = Arc::clone(&self.axes[sample.0 as usize]);
        let key = (ShapeKey::of(&sample_axis), set);
        if let Some(&id) = self.unsettified.get(&key) {
            return id;
        }
        let values = Arc::clone(&self.sets[set.0 as usize]);
        let rebuilt = Axis::unsettify(&sample_axis, &values);
        let (id, _) = self.intern(Arc::new(rebuilt));
        self.settified.entry(id).or_insert(set);
        self.unsettified.insert(key, id);
        id
    }

    fn combine(&mut self, sets: &[SetId], union: bool) -> SetId {
        let mut key: Vec<SetId> = sets.to_vec();
        key.sort_unstable();
        key.dedup();
        if key.len() == 1 {
            return key[0];
        }

        let memo = if union {
            &self.unions
        } else {
            &self.intersections
        };
        if let Some(&id) = memo.get(&key) {
            return id;
        }

        let mut iter = key.iter().map(|id| Arc::clone(&self.sets[id.0 as usize]));
        let combined: ValueSet = match iter.next() {
            None => BTreeSet::new(),
            Some(first) => {
                let mut acc: ValueSet = (*first).clone();
                for next in iter {
                    if union {
                        acc.extend(next.iter().cloned());
                    } else {
                        acc.retain(|t| next.contains(t));
                    }
                }
                acc
            }
        };

        let id = self.intern_set(combined);
        if union {
            self.unions.insert(key, id);
        } else {
            self.intersections.insert(key, id);
        }
        id
    }
}

/// Shared axis arena. Cheap to share behind an `Arc`; every method takes `&self`.
pub struct AxisManager {
    inner: Mutex<Inner>,
    identity_hits: AtomicU64,
    content_hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for AxisManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AxisManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            identity_hits: AtomicU64::new(0),
            content_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Canonical handle for a structurally equal axis, adding it if new.
    pub fn intern(&self, axis: Axis) -> AxisId {
        let (id, found) = self.inner.lock().intern(Arc::new(axis));
        self.count(found);
        id
    }

    /// Canonical handle for `axis`, answering repeated lookups of the same
    /// allocation from the identity cache without hashing its values.
    pub fn lookup(&self, axis: &Arc<Axis>) -> AxisId {
        let addr = Arc::as_ptr(axis) as usize;
        let mut inner = self.inner.lock();
        if let Some(&id) = inner.by_identity.get(&addr) {
            self.identity_hits.fetch_add(1, Ordering::Relaxed);
            return id;
        }
        let (id, found) = inner.intern(Arc::clone(axis));
        inner.by_identity.insert(addr, id);
        inner.pinned.push(Arc::clone(axis));
        drop(inner);
        self.count(found);
        id
    }

    /// The canonical axis behind a handle.
    pub fn axis(&self, id: AxisId) -> Arc<Axis> {
        Arc::clone(&self.inner.lock().axes[id.0 as usize])
    }

    /// Set form of an axis, memoized per handle.
    pub fn settify(&self, id: AxisId) -> SetId {
        self.inner.lock().settify(id)
    }

    /// Canonical handle for a value set.
    pub fn intern_set(&self, set: ValueSet) -> SetId {
        self.inner.lock().intern_set(set)
    }

    pub fn set(&self, id: SetId) -> Arc<ValueSet> {
        Arc::clone(&self.inner.lock().sets[id.0 as usize])
    }

    pub fn set_len(&self, id: SetId) -> usize {
        self.inner.lock().sets[id.0 as usize].len()
    }

    /// Whether every tuple of `a` is in `b`.
    pub fn is_subset(&self, a: SetId, b: SetId) -> bool {
        if a == b {
            return true;
        }
        let inner = self.inner.lock();
        inner.sets[a.0 as usize].is_subset(&inner.sets[b.0 as usize])
    }

    /// Concrete sorted axis for `set`, shaped like `sample`. Memoized by
    /// (sample name/kind/aux layout, set).
    pub fn unsettify(&self, sample: AxisId, set: SetId) -> AxisId {
        self.inner.lock().unsettify(sample, set)
    }

    /// Union of value sets, memoized by the sorted input handles.
    pub fn union(&self, sets: &[SetId]) -> SetId {
        self.inner.lock().combine(sets, true)
    }

    /// Intersection of value sets, memoized by the sorted input handles.
    /// The intersection of no sets is the empty set.
    pub fn intersect(&self, sets: &[SetId]) -> SetId {
        self.inner.lock().combine(sets, false)
    }

    /// Axis holding the values common to all inputs, shaped like the first.
    pub fn intersect_axes(&self, axes: &[AxisId]) -> Option<AxisId> {
        let sample = *axes.first()?;
        let mut key = axes.to_vec();
        key.sort_unstable();
        key.dedup();

        let mut inner = self.inner.lock();
        if let Some(&id) = inner.axis_intersections.get(&key) {
            return Some(id);
        }
        let sets: Vec<SetId> = key.iter().map(|&id| inner.settify(id)).collect();
        let common = inner.combine(&sets, false);
        let id = inner.unsettify(sample, common);
        inner.axis_intersections.insert(key, id);
        Some(id)
    }

    pub fn stats(&self) -> AxisManagerStats {
        let inner = self.inner.lock();
        AxisManagerStats {
            axes: inner.axes.len(),
            sets: inner.sets.len(),
            identity_hits: self.identity_hits.load(Ordering::Relaxed),
            content_hits: self.content_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn count(&self, found: bool) {
        if found {
            self.content_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for AxisManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AxisManager")
            .field("stats", &self.stats())
            .finish()
    }
}
