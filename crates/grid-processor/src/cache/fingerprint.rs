//! Structural fingerprints for cache filenames.

use std::sync::Arc;

use gridcat_common::{Attributes, Axis};

const SEED_LOW: u32 = 0x9e37_79b9;
const SEED_HIGH: u32 = 0x85eb_ca6b;

/// 16 hex digit fingerprint of the non-temporal axes and the attributes.
///
/// Temporal axes are left out: the time span goes into the filename suffix
/// instead, so a result extended in time gets a new name with the same
/// fingerprint.
pub fn fingerprint(axes: &[Arc<Axis>], attrs: &Attributes) -> String {
    let mut low = crc32fast::Hasher::new_with_initial(SEED_LOW);
    let mut high = crc32fast::Hasher::new_with_initial(SEED_HIGH);

    let mut feed = |bytes: &[u8]| {
        low.update(bytes);
        high.update(bytes);
    };

    for axis in axes.iter().filter(|a| !a.is_temporal()) {
        let json = serde_json::to_string(axis.as_ref()).unwrap_or_default();
        feed(json.as_bytes());
        feed(&[0]);
    }
    feed(&[1]);
    feed(attrs.canonical_json().as_bytes());

    format!("{:08x}{:08x}", high.finalize(), low.finalize())
}
