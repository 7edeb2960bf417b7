//! Query surface over a catalog: domains, their virtual arrays, and
//! `find_best` to pick among overlapping domains.
//!
//! ```ignore
//! let dataset = Dataset::from_manifest(&manifest, &files, registry, ctx, &config)?;
//!
//! // Temperature and humidity from the domain with the most timesteps.
//! let vars = dataset.find_best(
//!     &["TT", "HU"],
//!     |v| v.axis("time").map_or(0, |a| a.len()),
//!     |v| v.axis("level").is_some(),
//! )?;
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use gridcat_common::{GridcatError, GridcatResult};
use storage::{CatalogEntry, Manifest, OpenerRegistry};

use crate::axis_manager::AxisManager;
use crate::config::GridcatConfig;
use crate::domain::{compute_domains, Domain, SourceRow};
use crate::processor::{DataVar, Variable};

/// Domains and virtual arrays computed from one catalog table.
pub struct Dataset {
    ctx: Arc<AxisManager>,
    registry: Arc<OpenerRegistry>,
    domains: Vec<Domain>,
    vars: Vec<DataVar>,
}

impl Dataset {
    /// Run the domain algebra over `table` and build one virtual array per
    /// (domain, variable) pair that has contributing files.
    pub fn from_table(
        table: &[CatalogEntry],
        registry: Arc<OpenerRegistry>,
        ctx: Arc<AxisManager>,
        config: &GridcatConfig,
    ) -> GridcatResult<Self> {
        let rows = SourceRow::from_table(table, &ctx);
        let domains = compute_domains(&rows, &ctx, config.merge_iteration_limit)?;

        let mut vars = Vec::new();
        for domain in &domains {
            for name in domain.variables(&ctx) {
                if let Some(var) = DataVar::new(
                    &name,
                    domain,
                    &rows,
                    Arc::clone(&ctx),
                    Arc::clone(&registry),
                    config.progress_interval,
                ) {
                    vars.push(var);
                }
            }
        }

        info!(
            files = table.len(),
            domains = domains.len(),
            variables = vars.len(),
            "Built dataset"
        );

        Ok(Self {
            ctx,
            registry,
            domains,
            vars,
        })
    }

    /// Build from the manifest entries of `files`.
    pub fn from_manifest<P: AsRef<Path>>(
        manifest: &Manifest,
        files: &[P],
        registry: Arc<OpenerRegistry>,
        ctx: Arc<AxisManager>,
        config: &GridcatConfig,
    ) -> GridcatResult<Self> {
        Self::from_table(&manifest.get_table(files), registry, ctx, config)
    }

    pub fn context(&self) -> &Arc<AxisManager> {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<OpenerRegistry> {
        &self.registry
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    pub fn variables(&self) -> &[DataVar] {
        &self.vars
    }

    /// Every virtual array of `name`, one per domain holding it.
    pub fn find<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a DataVar> + 'a {
        self.vars.iter().filter(move |v| v.name() == name)
    }

    /// Pick the domain that holds every variable in `names`, satisfies
    /// `requirement` for each of them, and maximizes the smallest `maximize`
    /// score among them. Ties go to the earlier domain.
    ///
    /// Returns the variables in the order of `names`, or `NoMatchingDomain`
    /// when no domain qualifies.
    pub fn find_best<K, R, Q>(
        &self,
        names: &[&str],
        maximize: R,
        requirement: Q,
    ) -> GridcatResult<Vec<&DataVar>>
    where
        K: PartialOrd,
        R: Fn(&DataVar) -> K,
        Q: Fn(&DataVar) -> bool,
    {
        if names.is_empty() {
            return Err(GridcatError::invalid_selection("no variable names given"));
        }

        let mut best: Option<(K, Vec<&DataVar>)> = None;
        for domain in &self.domains {
            let Some(candidate) = self.candidate(domain, names, &requirement) else {
                continue;
            };

            let mut score: Option<K> = None;
            for var in &candidate {
                let s = maximize(var);
                if score.as_ref().map_or(true, |cur| s < *cur) {
                    score = Some(s);
                }
            }
            let Some(score) = score else { continue };

            if best.as_ref().map_or(true, |(cur, _)| score > *cur) {
                best = Some((score, candidate));
            }
        }

        match best {
            Some((_, vars)) => {
                debug!(names = ?names, files = vars.iter().map(|v| v.rows().len()).sum::<usize>(), "Selected domain");
                Ok(vars)
            }
            None => Err(GridcatError::NoMatchingDomain {
                names: names.iter().map(|n| n.to_string()).collect(),
            }),
        }
    }

    fn candidate<Q>(&self, domain: &Domain, names: &[&str], requirement: &Q) -> Option<Vec<&DataVar>>
    where
        Q: Fn(&DataVar) -> bool,
    {
        names
            .iter()
            .map(|name| {
                self.vars
                    .iter()
                    .find(|v| v.name() == *name && v.domain() == domain)
                    .filter(|v| requirement(v))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcat_common::ErrorKind;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use test_utils::{create_ramp, lat_axis, level_axis, time_axis, MemoryOpener, MemoryVariable};

    fn var(name: &str, hours: &[i64], levels: &[f64]) -> MemoryVariable {
        let axes = vec![time_axis(hours), level_axis(levels), lat_axis(&[0.0, 10.0])];
        let n = hours.len() * levels.len() * 2;
        MemoryVariable::new(name, axes, create_ramp(n))
    }

    /// Model levels every 6h and an hourly surface file with no common points.
    fn catalog(dir: &TempDir) -> (Arc<MemoryOpener>, Vec<PathBuf>) {
        let opener = Arc::new(MemoryOpener::new("mem"));
        let model = opener.add_file(
            dir.path(),
            "model.mem",
            vec![var("TT", &[0, 6], &[1000.0, 850.0]), var("HU", &[0, 6], &[1000.0, 850.0])],
        );
        let surface = opener.add_file(dir.path(), "surface.mem", vec![var("TT", &[1, 2, 3, 4], &[0.0])]);
        (opener, vec![model, surface])
    }

    fn dataset(opener: Arc<MemoryOpener>, files: &[PathBuf]) -> Dataset {
        let mut manifest = Manifest::in_memory();
        manifest.scan(files, opener.as_ref());

        let registry = Arc::new(OpenerRegistry::new().with(opener));
        Dataset::from_manifest(
            &manifest,
            files,
            registry,
            Arc::new(AxisManager::new()),
            &GridcatConfig::default(),
        )
        .unwrap()
    }

    fn timesteps(v: &DataVar) -> usize {
        v.axis("time").map_or(0, |a| a.len())
    }

    #[test]
    fn test_find_best_most_timesteps() {
        let dir = TempDir::new().unwrap();
        let (opener, files) = catalog(&dir);
        let ds = dataset(opener, &files);
        assert_eq!(ds.domains().len(), 2);
        assert_eq!(ds.find("TT").count(), 2);

        let best = ds.find_best(&["TT"], timesteps, |_| true).unwrap();
        assert_eq!(best.len(), 1);
        assert_eq!(timesteps(best[0]), 4);
    }

    #[test]
    fn test_find_best_requires_all_names() {
        let dir = TempDir::new().unwrap();
        let (opener, files) = catalog(&dir);
        let ds = dataset(opener, &files);

        let best = ds.find_best(&["TT", "HU"], timesteps, |_| true).unwrap();
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].name(), "TT");
        assert_eq!(best[1].name(), "HU");
        assert_eq!(best[0].domain(), best[1].domain());
        assert_eq!(best[0].axis("level").unwrap().len(), 2);
    }

    #[test]
    fn test_find_best_requirement_filters() {
        let dir = TempDir::new().unwrap();
        let (opener, files) = catalog(&dir);
        let ds = dataset(opener, &files);

        let best = ds
            .find_best(&["TT"], timesteps, |v| {
                v.axis("level").map_or(false, |a| a.len() > 1)
            })
            .unwrap();
        assert_eq!(timesteps(best[0]), 2);
    }

    #[test]
    fn test_find_best_no_match() {
        let dir = TempDir::new().unwrap();
        let (opener, files) = catalog(&dir);
        let ds = dataset(opener, &files);

        let err = ds.find_best(&["TT", "GZ"], |v| v.len(), |_| true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Missing);
        assert!(matches!(err, GridcatError::NoMatchingDomain { ref names } if names.len() == 2));

        let err = ds.find_best(&["TT"], |v| v.len(), |_| false).unwrap_err();
        assert!(matches!(err, GridcatError::NoMatchingDomain { .. }));
    }

    #[test]
    fn test_empty_table() {
        let dir = TempDir::new().unwrap();
        let (opener, _) = catalog(&dir);
        let ds = dataset(opener, &[]);
        assert!(ds.domains().is_empty());
        assert!(ds.variables().is_empty());
    }
}
