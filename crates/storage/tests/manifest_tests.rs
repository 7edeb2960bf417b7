//! Catalog scanning, persistence and staleness.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use gridcat_common::Progress;
use storage::{Manifest, OpenerRegistry};
use tempfile::TempDir;
use test_utils::{create_ramp, lat_axis, time_axis, MemoryOpener, MemoryVariable};

fn tt(lats: &[f64], hours: &[i64]) -> MemoryVariable {
    MemoryVariable::new(
        "TT",
        vec![time_axis(hours), lat_axis(lats)],
        create_ramp(lats.len() * hours.len()),
    )
}

fn set_mtime(path: &std::path::Path, t: SystemTime) {
    filetime::set_file_mtime(path, FileTime::from_system_time(t)).unwrap();
}

#[test]
fn test_scan_records_variables_in_insertion_order() {
    let dir = TempDir::new().unwrap();
    let opener = MemoryOpener::new("mem");
    let b = opener.add_file(dir.path(), "b.mem", vec![tt(&[0.0], &[0])]);
    let a = opener.add_file(dir.path(), "a.mem", vec![tt(&[10.0, 20.0], &[0])]);

    let mut manifest = Manifest::in_memory();
    let report = manifest.scan(&[&b, &a], &opener);

    assert_eq!(report.scanned, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(manifest.len(), 2);
    assert_eq!(manifest.entries()[0].path, b);
    assert_eq!(manifest.entries()[1].path, a);
    assert_eq!(manifest.entries()[0].opener, "mem");
    let record = manifest.get(&a).unwrap().variable("TT").unwrap();
    assert_eq!(record.axis("lat").unwrap().len(), 2);
}

#[test]
fn test_scan_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let opener = MemoryOpener::new("mem");
    let a = opener.add_file(dir.path(), "a.mem", vec![tt(&[0.0], &[0])]);

    let mut manifest = Manifest::in_memory();
    manifest.scan(&[&a], &opener);
    let before = manifest.entries().to_vec();
    let opens = opener.open_count();

    let report = manifest.scan(&[&a], &opener);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.scanned, 0);
    assert_eq!(opener.open_count(), opens);
    assert_eq!(manifest.entries(), before.as_slice());
}

#[test]
fn test_unreadable_file_is_skipped_and_prior_entry_kept() {
    let dir = TempDir::new().unwrap();
    let opener = MemoryOpener::new("mem");
    let a = opener.add_file(dir.path(), "a.mem", vec![tt(&[0.0], &[0])]);
    let missing = dir.path().join("missing.mem");

    let mut manifest = Manifest::in_memory();
    let report = manifest.scan(&[&a, &missing], &opener);
    assert_eq!(report.scanned, 1);
    assert_eq!(report.failed, 1);

    // Newer on disk but no longer openable: the old entry survives.
    opener.remove(&a);
    set_mtime(&a, SystemTime::now() + Duration::from_secs(3600));
    let report = manifest.scan(&[&a], &opener);
    assert_eq!(report.failed, 1);
    assert!(manifest.contains(&a));
    assert_eq!(manifest.get(&a).unwrap().variables.len(), 1);
}

#[test]
fn test_save_and_reload_skips_unchanged_files() {
    let dir = TempDir::new().unwrap();
    let location = dir.path().join("cat/manifest.json");
    let opener = MemoryOpener::new("mem");
    let a = opener.add_file(dir.path(), "a.mem", vec![tt(&[0.0], &[0])]);
    let b = opener.add_file(dir.path(), "b.mem", vec![tt(&[10.0], &[0])]);
    let t0 = SystemTime::now() - Duration::from_secs(7200);
    set_mtime(&a, t0);
    set_mtime(&b, t0);

    let mut manifest = Manifest::open(&location);
    manifest.scan(&[&a, &b], &opener);
    assert!(manifest.is_dirty());
    assert!(manifest.save().unwrap());
    assert!(!manifest.save().unwrap());

    let saved_mtime = std::fs::metadata(&location).unwrap().modified().unwrap();
    let file_mtime = std::fs::metadata(&a).unwrap().modified().unwrap();
    assert_eq!(saved_mtime, file_mtime);

    // Rewrite b with a later modification time.
    opener.insert(b.clone(), vec![tt(&[10.0, 20.0], &[0])]);
    set_mtime(&b, t0 + Duration::from_secs(60));

    let mut reloaded = Manifest::open(&location);
    assert_eq!(reloaded.len(), 2);
    let opens = opener.open_count();
    let report = reloaded.scan(&[&a, &b], &opener);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.scanned, 1);
    assert_eq!(opener.open_count(), opens + 1);
    assert_eq!(
        reloaded.get(&b).unwrap().variable("TT").unwrap().axis("lat").unwrap().len(),
        2
    );
    // Replaced entries keep their position.
    assert_eq!(reloaded.entries()[1].path, b);
}

#[test]
fn test_get_table_filters_and_keeps_stored_order() {
    let dir = TempDir::new().unwrap();
    let opener = MemoryOpener::new("mem");
    let files: Vec<_> = (0..4)
        .map(|i| opener.add_file(dir.path(), &format!("f{}.mem", i), vec![tt(&[i as f64], &[0])]))
        .collect();

    let mut manifest = Manifest::in_memory();
    manifest.scan(&files, &opener);

    let table = manifest.get_table(&[&files[3], &files[1]]);
    assert_eq!(table.len(), 2);
    assert_eq!(table[0].path, files[1]);
    assert_eq!(table[1].path, files[3]);

    let unknown = dir.path().join("nope.mem");
    assert!(manifest.get_table(&[&unknown]).is_empty());
}

#[test]
fn test_rescan_forces_reread_and_drops_vanished() {
    let dir = TempDir::new().unwrap();
    let opener = MemoryOpener::new("mem");
    let a = opener.add_file(dir.path(), "a.mem", vec![tt(&[0.0], &[0])]);
    let b = opener.add_file(dir.path(), "b.mem", vec![tt(&[1.0], &[0])]);

    let mut manifest = Manifest::in_memory();
    manifest.scan(&[&a, &b], &opener);
    std::fs::remove_file(&b).unwrap();

    let opens = opener.open_count();
    let report = manifest.rescan(&[&a, &b], &opener);
    assert_eq!(report.scanned, 1);
    assert_eq!(opener.open_count(), opens + 1);
    assert!(manifest.contains(&a));
    assert!(!manifest.contains(&b));
}

#[test]
fn test_scan_registry_picks_opener_by_extension() {
    let dir = TempDir::new().unwrap();
    let fst = Arc::new(MemoryOpener::with_extensions("fst", &[".fst"]));
    let nc = Arc::new(MemoryOpener::with_extensions("nc", &[".nc"]));
    let a = fst.add_file(dir.path(), "a.fst", vec![tt(&[0.0], &[0])]);
    let b = nc.add_file(dir.path(), "b.nc", vec![tt(&[0.0], &[0])]);
    let c = dir.path().join("c.txt");
    std::fs::write(&c, b"").unwrap();

    let registry = OpenerRegistry::new().with(fst.clone()).with(nc.clone());
    let mut manifest = Manifest::in_memory();
    let report = manifest.scan_registry(&[&a, &b, &c], &registry);

    assert_eq!(report.scanned, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(manifest.get(&a).unwrap().opener, "fst");
    assert_eq!(manifest.get(&b).unwrap().opener, "nc");
}

#[test]
fn test_scan_with_progress_reports_completion() {
    let dir = TempDir::new().unwrap();
    let opener = MemoryOpener::new("mem");
    let files: Vec<_> = (0..3)
        .map(|i| opener.add_file(dir.path(), &format!("f{}.mem", i), vec![tt(&[0.0], &[0])]))
        .collect();

    let mut seen = Vec::new();
    let mut manifest = Manifest::in_memory();
    manifest.scan_with_progress(&files, &opener, &mut |p: Progress| seen.push(p));

    let last = seen.last().unwrap();
    assert_eq!(last.done, 3);
    assert_eq!(last.total, 3);
}

#[test]
fn test_failed_reopen_is_retried_on_next_scan() {
    let dir = TempDir::new().unwrap();
    let opener = MemoryOpener::new("mem");
    let a = opener.add_file(dir.path(), "a.mem", vec![tt(&[0.0], &[0])]);
    let b = opener.add_file(dir.path(), "b.mem", vec![tt(&[1.0], &[0])]);
    let t0 = SystemTime::now() - Duration::from_secs(7200);
    set_mtime(&a, t0);
    set_mtime(&b, t0);

    let mut manifest = Manifest::in_memory();
    manifest.scan(&[&a, &b], &opener);
    assert_eq!(manifest.watermark(), Some(t0));

    // a changes but cannot be opened right now.
    opener.remove(&a);
    set_mtime(&a, t0 + Duration::from_secs(60));
    let report = manifest.scan(&[&a], &opener);
    assert_eq!(report.failed, 1);
    assert_eq!(manifest.watermark(), Some(t0));

    // A later change elsewhere moves the watermark past a.
    set_mtime(&b, t0 + Duration::from_secs(120));
    manifest.scan(&[&b], &opener);
    assert_eq!(manifest.watermark(), Some(t0 + Duration::from_secs(120)));

    opener.insert(a.clone(), vec![tt(&[0.0, 10.0], &[0])]);
    let report = manifest.scan(&[&a], &opener);
    assert_eq!(report.scanned, 1);
    assert_eq!(
        manifest.get(&a).unwrap().variable("TT").unwrap().axis("lat").unwrap().len(),
        2
    );
}

#[test]
fn test_directory_store_change_inside_is_detected() {
    let dir = TempDir::new().unwrap();
    let opener = MemoryOpener::with_extensions("zarr", &[".zarr"]);
    let store = dir.path().join("tt.zarr");
    let chunk = store.join("TT").join("c").join("0");
    std::fs::create_dir_all(chunk.parent().unwrap()).unwrap();
    std::fs::write(&chunk, b"0").unwrap();
    opener.insert(store.clone(), vec![tt(&[0.0], &[0])]);

    let t0 = SystemTime::now() - Duration::from_secs(7200);
    for path in [&chunk, &chunk.parent().unwrap().to_path_buf(), &store.join("TT"), &store] {
        set_mtime(path, t0);
    }

    let mut manifest = Manifest::in_memory();
    manifest.scan(&[&store], &opener);
    assert_eq!(manifest.scan(&[&store], &opener).unchanged, 1);

    // Rewrite the chunk only; the store directory keeps its time.
    opener.insert(store.clone(), vec![tt(&[0.0, 5.0], &[0])]);
    set_mtime(&chunk, t0 + Duration::from_secs(60));
    set_mtime(&store, t0);

    let report = manifest.scan(&[&store], &opener);
    assert_eq!(report.scanned, 1);
    assert_eq!(manifest.watermark(), Some(t0 + Duration::from_secs(60)));
}
