//! End-to-end domain algebra and virtual array reads over scanned catalogs.

use std::path::PathBuf;
use std::sync::Arc;

use gridcat_common::{AxisValue, ErrorKind, GridcatError, Progress};
use grid_processor::{
    compute_domains, AxisManager, Dataset, Domain, GridcatConfig, Selection, SourceRow, Variable,
};
use storage::{Manifest, OpenerRegistry};
use tempfile::TempDir;
use test_utils::{
    create_constant_field, create_field, hour, lat_axis, level_axis, lon_axis, station_axis,
    time_axis, MemoryOpener, MemoryVariable,
};

const GRID: [f64; 4] = [0.0, 10.0, 20.0, 30.0];

struct Catalog {
    dir: TempDir,
    opener: Arc<MemoryOpener>,
    files: Vec<PathBuf>,
}

impl Catalog {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            opener: Arc::new(MemoryOpener::new("mem")),
            files: Vec::new(),
        }
    }

    fn add(&mut self, name: &str, vars: Vec<MemoryVariable>) -> PathBuf {
        let path = self.opener.add_file(self.dir.path(), name, vars);
        self.files.push(path.clone());
        path
    }

    fn manifest(&self) -> Manifest {
        let mut manifest = Manifest::in_memory();
        let report = manifest.scan(&self.files, self.opener.as_ref());
        assert_eq!(report.failed, 0);
        manifest
    }

    fn dataset(&self) -> Dataset {
        let registry = Arc::new(OpenerRegistry::new().with(self.opener.clone()));
        Dataset::from_manifest(
            &self.manifest(),
            &self.files,
            registry,
            Arc::new(AxisManager::new()),
            &GridcatConfig::default(),
        )
        .unwrap()
    }
}

/// `X` on one day and the shared 4x4 grid; value = day * 100 + lat index * 10 + lon index.
fn daily_x(day: i64) -> MemoryVariable {
    let axes = vec![time_axis(&[day * 24]), lat_axis(&GRID), lon_axis(&GRID)];
    let data = create_field(&[1, 4, 4], |i| (day * 100) as f32 + (i[1] * 10 + i[2]) as f32);
    MemoryVariable::new("X", axes, data)
}

fn scenario_a() -> Catalog {
    let mut catalog = Catalog::new();
    for day in 1..=3 {
        catalog.add(&format!("day{}.mem", day), vec![daily_x(day)]);
    }
    catalog
}

#[test]
fn test_scenario_a_daily_files_form_one_domain() {
    let dataset = scenario_a().dataset();

    assert_eq!(dataset.domains().len(), 1);
    let vars: Vec<_> = dataset.find("X").collect();
    assert_eq!(vars.len(), 1);

    let x = vars[0];
    assert_eq!(x.rows().len(), 3);
    assert_eq!(x.shape(), vec![3, 4, 4]);
    assert_eq!(*x.axis("time").unwrap(), time_axis(&[24, 48, 72]));
    assert_eq!(*x.axis("lat").unwrap(), lat_axis(&GRID));
    assert_eq!(*x.axis("lon").unwrap(), lon_axis(&GRID));
}

#[test]
fn test_scenario_c_read_one_day_returns_that_file() {
    let dataset = scenario_a().dataset();
    let x = dataset.find("X").next().unwrap();

    let block = x.read(&Selection::all().value("time", hour(48))).unwrap();
    assert_eq!(block.shape(), vec![1, 4, 4]);
    assert_eq!(block.missing(), 0);
    assert_eq!(block.data, daily_x(2).data.as_ref().clone());
}

#[test]
fn test_scenario_c_absent_time_is_all_nan() {
    let dataset = scenario_a().dataset();
    let x = dataset.find("X").next().unwrap();

    let block = x.read(&Selection::all().value("time", hour(36))).unwrap();
    assert_eq!(block.shape(), vec![1, 4, 4]);
    assert_eq!(block.missing(), 16);
}

#[test]
fn test_read_full_domain_and_subrange() {
    let catalog = scenario_a();
    let dataset = catalog.dataset();
    let x = dataset.find("X").next().unwrap();

    let mut reports = Vec::new();
    let block = x
        .read_with_progress(&Selection::all(), &mut |p: Progress| reports.push(p))
        .unwrap();
    assert_eq!(block.missing(), 0);
    assert_eq!(block.get(&[2, 3, 1]), Some(331.0));
    assert_eq!(reports.last().map(|p| p.done), Some(48));

    let block = x
        .read(&Selection::all().range("lat", 10.0, 20.0).index("lon", 0..1))
        .unwrap();
    assert_eq!(block.shape(), vec![3, 2, 1]);
    assert_eq!(block.data, vec![110.0, 120.0, 210.0, 220.0, 310.0, 320.0]);
}

#[test]
fn test_later_file_wins_on_overlap() {
    let mut catalog = Catalog::new();
    let x = |lats: &[f64], value: f32| {
        MemoryVariable::new(
            "X",
            vec![time_axis(&[0]), lat_axis(lats)],
            create_constant_field(&[1, lats.len()], value),
        )
    };
    catalog.add("first.mem", vec![x(&[0.0, 10.0], 1.0)]);
    catalog.add("second.mem", vec![x(&[10.0, 20.0], 2.0)]);

    let dataset = catalog.dataset();
    assert_eq!(dataset.domains().len(), 1);
    let block = dataset.find("X").next().unwrap().read(&Selection::all()).unwrap();
    assert_eq!(block.data, vec![1.0, 2.0, 2.0]);
}

#[test]
fn test_changed_file_is_a_read_inconsistency() {
    let mut catalog = scenario_a();
    let extra = catalog.add("day4.mem", vec![daily_x(4)]);
    let dataset = catalog.dataset();

    // Same variable, different grid, without a rescan.
    let moved = MemoryVariable::new(
        "X",
        vec![time_axis(&[96]), lat_axis(&[0.0, 5.0, 10.0, 15.0]), lon_axis(&GRID)],
        create_constant_field(&[1, 4, 4], 0.0),
    );
    catalog.opener.insert(extra, vec![moved]);

    let x = dataset.find("X").next().unwrap();
    let err = x.read(&Selection::all()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inconsistent);
    assert!(matches!(err, GridcatError::ReadInconsistency { .. }));

    // Rows outside the selection are never opened.
    let block = x.read(&Selection::all().value("time", hour(24))).unwrap();
    assert_eq!(block.missing(), 0);
}

#[test]
fn test_missing_file_fails_the_read() {
    let catalog = scenario_a();
    let dataset = catalog.dataset();
    catalog.opener.remove(&catalog.files[1]);

    let err = dataset
        .find("X")
        .next()
        .unwrap()
        .read(&Selection::all())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Missing);
}

/// Files split by day and by variable group, with a partially shifted grid.
fn mixed_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    let var = |name: &str, hours: &[i64], lats: &[f64]| {
        MemoryVariable::new(
            name,
            vec![time_axis(hours), lat_axis(lats)],
            create_constant_field(&[hours.len(), lats.len()], 1.0),
        )
    };
    catalog.add("a.mem", vec![var("TT", &[0], &[0.0, 10.0, 20.0]), var("HU", &[0], &[0.0, 10.0, 20.0])]);
    catalog.add("b.mem", vec![var("TT", &[24], &[0.0, 10.0, 20.0]), var("HU", &[24], &[0.0, 10.0, 20.0])]);
    catalog.add("c.mem", vec![var("TT", &[48], &[10.0, 20.0, 30.0])]);
    catalog.add("d.mem", vec![var("GZ", &[0, 24], &[0.0, 10.0])]);
    catalog.add("e.mem", vec![var("TT", &[72], &[0.0, 10.0, 20.0])]);
    catalog
}

fn domains_of(catalog: &Catalog) -> (AxisManager, Vec<SourceRow>, Vec<Domain>) {
    let ctx = AxisManager::new();
    let table = catalog.manifest().get_table(&catalog.files);
    let rows = SourceRow::from_table(&table, &ctx);
    let domains = compute_domains(&rows, &ctx, 64).unwrap();
    (ctx, rows, domains)
}

#[test]
fn test_every_row_is_covered_by_a_domain() {
    for catalog in [scenario_a(), mixed_catalog()] {
        let (ctx, rows, domains) = domains_of(&catalog);
        assert!(!domains.is_empty());
        for row in &rows {
            let raw = row.raw_domain(&ctx);
            assert!(
                domains.iter().any(|d| d.covers(&raw, &ctx)),
                "{} / {} not covered",
                row.path.display(),
                row.variable
            );
        }
    }
}

#[test]
fn test_no_domain_is_subsumed() {
    for catalog in [scenario_a(), mixed_catalog()] {
        let (ctx, _, domains) = domains_of(&catalog);
        for (i, d) in domains.iter().enumerate() {
            for (j, other) in domains.iter().enumerate() {
                if i != j {
                    assert!(!other.covers(d, &ctx), "domain {} covered by {}", i, j);
                }
            }
        }
    }
}

#[test]
fn test_mixed_catalog_longest_series_has_no_gaps() {
    let dataset = mixed_catalog().dataset();

    let tt = dataset
        .find_best(&["TT"], |v| v.axis("time").map_or(0, |a| a.len()), |_| true)
        .unwrap()[0];
    assert_eq!(*tt.axis("time").unwrap(), time_axis(&[0, 24, 48, 72]));
    assert_eq!(*tt.axis("lat").unwrap(), lat_axis(&[10.0, 20.0]));

    let block = tt.read(&Selection::all()).unwrap();
    assert_eq!(block.missing(), 0);
    assert!(block.data.iter().all(|v| *v == 1.0));
}

#[test]
fn test_variable_with_fewer_axes_joins_merged_domain() {
    let mut catalog = Catalog::new();
    let x = MemoryVariable::new(
        "X",
        vec![level_axis(&[1000.0, 500.0]), lat_axis(&[0.0, 10.0])],
        create_field(&[2, 2], |i| (i[0] * 10 + i[1]) as f32),
    );
    let y = MemoryVariable::new("Y", vec![lat_axis(&[0.0, 10.0])], vec![7.0, 8.0]);
    catalog.add("x.mem", vec![x]);
    catalog.add("y.mem", vec![y]);

    let dataset = catalog.dataset();
    let best = dataset
        .find_best(&["X", "Y"], |v| v.len(), |_| true)
        .unwrap();
    assert_eq!(best.len(), 2);
    let (x, y) = (best[0], best[1]);
    assert_eq!(x.domain(), y.domain());

    assert_eq!(x.shape(), vec![2, 2]);
    assert_eq!(y.axes().len(), 1);
    assert_eq!(*y.axis("lat").unwrap(), lat_axis(&[0.0, 10.0]));
    assert!(y.axis("level").is_none());

    assert_eq!(y.read(&Selection::all()).unwrap().data, vec![7.0, 8.0]);
    let levels = x.read(&Selection::all().value("lat", 10.0)).unwrap();
    assert_eq!(levels.shape(), vec![2, 1]);
    assert_eq!(levels.missing(), 0);
}

/// Observation files split by station, with an elevation per station.
fn station_catalog() -> Catalog {
    let stations = |labels: &[&str], elevations: &[f64]| {
        station_axis(labels)
            .with_aux("elevation", elevations.iter().map(|&e| AxisValue::Number(e)).collect())
            .unwrap()
    };
    let mut catalog = Catalog::new();
    catalog.add(
        "east.mem",
        vec![MemoryVariable::new(
            "TT",
            vec![time_axis(&[0]), stations(&["YUL", "YQB"], &[36.0, 74.0])],
            vec![1.0, 2.0],
        )],
    );
    catalog.add(
        "west.mem",
        vec![MemoryVariable::new(
            "TT",
            vec![time_axis(&[0]), stations(&["YVR"], &[4.0])],
            vec![3.0],
        )],
    );
    catalog
}

#[test]
fn test_station_files_scan_with_aux() {
    let catalog = station_catalog();
    let manifest = catalog.manifest();

    let entry = manifest.get(&catalog.files[1]).unwrap();
    let station = entry.variable("TT").unwrap().axis("station").unwrap();
    assert_eq!(station.aux("elevation"), Some(&[AxisValue::Number(4.0)][..]));
}

#[test]
fn test_station_files_form_one_domain_keeping_aux() {
    let dataset = station_catalog().dataset();
    assert_eq!(dataset.domains().len(), 1);

    let tt = dataset.find("TT").next().unwrap();
    let station = tt.axis("station").unwrap();
    let labels: Vec<_> = station.values().to_vec();
    assert_eq!(
        labels,
        vec![AxisValue::from("YQB"), AxisValue::from("YUL"), AxisValue::from("YVR")]
    );
    assert_eq!(
        station.aux("elevation").unwrap(),
        &[AxisValue::Number(74.0), AxisValue::Number(36.0), AxisValue::Number(4.0)][..]
    );
    assert_eq!(tt.read(&Selection::all()).unwrap().data, vec![2.0, 1.0, 3.0]);
}

#[test]
fn test_station_selection_with_unknown_station() {
    let dataset = station_catalog().dataset();
    let tt = dataset.find("TT").next().unwrap();

    let block = tt
        .read(&Selection::all().values("station", ["YVR", "YYZ", "YUL"]))
        .unwrap();
    assert_eq!(block.shape(), vec![1, 3]);
    assert_eq!(block.data[0], 3.0);
    assert!(block.data[1].is_nan());
    assert_eq!(block.data[2], 1.0);

    let elevation = block.axes[1].aux("elevation").unwrap();
    assert_eq!(elevation[0], AxisValue::Number(4.0));
    assert!(elevation[1].as_number().is_some_and(f64::is_nan));
    assert_eq!(elevation[2], AxisValue::Number(36.0));
}

#[test]
fn test_configured_manifest_persists_between_sessions() {
    let catalog = scenario_a();
    let config = GridcatConfig {
        manifest_path: Some(catalog.dir.path().join("catalog.json")),
        ..GridcatConfig::default()
    };

    let mut manifest = config.open_manifest();
    manifest.scan(&catalog.files, catalog.opener.as_ref());
    assert!(manifest.save().unwrap());

    let opens = catalog.opener.open_count();
    let mut reloaded = config.open_manifest();
    let report = reloaded.scan(&catalog.files, catalog.opener.as_ref());
    assert_eq!(report.unchanged, 3);
    assert_eq!(catalog.opener.open_count(), opens);

    let registry = Arc::new(OpenerRegistry::new().with(catalog.opener.clone()));
    let dataset = Dataset::from_manifest(
        &reloaded,
        &catalog.files,
        registry,
        Arc::new(AxisManager::new()),
        &config,
    )
    .unwrap();
    assert_eq!(dataset.find("X").next().unwrap().shape(), vec![3, 4, 4]);
}
