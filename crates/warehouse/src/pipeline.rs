//! Pipeline orchestration.
//!
//! Runs the stages leaf-first:
//! 1. **stage**: read each configured raw batch, normalize it, write its extract
//! 2. **merge**: read every extract, merge into the core dataset, persist it
//! 3. **load**: read the core dataset, build the star schema, load it
//!
//! Every stage replaces its own output wholesale, so any stage can be re-run
//! on its own. Errors are tagged with the stage that raised them.

use crate::core_store::CoreStore;
use crate::dimensions::StarSchema;
use crate::loader::{LoadStats, WarehouseLoader};
use crate::merger::{CoreMerger, MergeStats};
use crate::queries::Warehouse;
use exportdw_core::config::BatchConfig;
use exportdw_core::{Config, Error, Period, Result, Stage, StageContext};
use exportdw_ingestion::{read_batch, ColumnNormalizer, NormalizationStats, StagingStore};
use std::path::PathBuf;
use tracing::{info, warn};

/// What happened to one configured batch during staging.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// Normalized and written to its extract.
    Staged {
        period: Period,
        path: PathBuf,
        stats: NormalizationStats,
    },
    /// Raw input not found; any previous extract is left untouched.
    Skipped { period: Period, raw_path: PathBuf },
}

impl BatchOutcome {
    pub fn period(&self) -> Period {
        match self {
            BatchOutcome::Staged { period, .. } | BatchOutcome::Skipped { period, .. } => *period,
        }
    }
}

/// Summary of a staging pass.
#[derive(Debug, Clone, Default)]
pub struct StagingReport {
    pub batches: Vec<BatchOutcome>,
}

impl StagingReport {
    pub fn staged(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| matches!(b, BatchOutcome::Staged { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.batches.len() - self.staged()
    }

    /// Normalization counts summed across staged batches.
    pub fn totals(&self) -> NormalizationStats {
        let mut totals = NormalizationStats::default();
        for batch in &self.batches {
            if let BatchOutcome::Staged { stats, .. } = batch {
                totals.rows_read += stats.rows_read;
                totals.rows_normalized += stats.rows_normalized;
                totals.rows_rejected += stats.rows_rejected;
                totals.blank_rows += stats.blank_rows;
                totals.unparseable_values += stats.unparseable_values;
                for (field, n) in &stats.rejections_by_field {
                    *totals.rejections_by_field.entry(*field).or_insert(0) += n;
                }
            }
        }
        totals
    }
}

/// Summary of a full run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub staging: StagingReport,
    pub merge: MergeStats,
    pub load: LoadStats,
}

/// Runs the warehouse stages against one configuration.
pub struct Pipeline {
    config: Config,
    normalizer: ColumnNormalizer,
    staging: StagingStore,
    core: CoreStore,
    loader: WarehouseLoader,
}

impl Pipeline {
    /// Validate `config` and wire up the stage components.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            normalizer: ColumnNormalizer::new(config.normalizer.clone()),
            staging: StagingStore::new(&config.storage),
            core: CoreStore::new(&config.storage),
            loader: WarehouseLoader::new(&config.storage),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read, normalize and stage every configured batch.
    pub fn stage(&self) -> Result<StagingReport> {
        let mut report = StagingReport::default();
        for batch in &self.config.batches {
            let outcome = self.stage_batch(batch).in_stage(Stage::Staging)?;
            report.batches.push(outcome);
        }

        let totals = report.totals();
        info!(
            staged = report.staged(),
            skipped = report.skipped(),
            rows_read = totals.rows_read,
            rows_normalized = totals.rows_normalized,
            rows_rejected = totals.rows_rejected,
            "staging complete"
        );
        Ok(report)
    }

    fn stage_batch(&self, batch: &BatchConfig) -> Result<BatchOutcome> {
        let raw_path = self.config.raw_path(batch);
        if !raw_path.exists() {
            warn!(period = %batch.period, path = %raw_path.display(), "raw batch not found, skipping");
            return Ok(BatchOutcome::Skipped {
                period: batch.period,
                raw_path,
            });
        }

        let raw = read_batch(
            &raw_path,
            batch.period,
            self.config.normalizer.sheet_name.as_deref(),
        )?;
        let normalized = self.normalizer.normalize(&raw);
        let path = self.staging.write(batch.period, &normalized.records)?;

        Ok(BatchOutcome::Staged {
            period: batch.period,
            path,
            stats: normalized.stats,
        })
    }

    /// Merge every staged extract into the core dataset and persist it.
    pub fn merge(&self) -> Result<MergeStats> {
        self.merge_inner().in_stage(Stage::Merge)
    }

    fn merge_inner(&self) -> Result<MergeStats> {
        let batches = self.staging.read_all()?;
        let merger = CoreMerger::new(self.config.normalizer.required_fields.clone());
        let (core, stats) = merger.merge(&batches);
        if !stats.is_consistent() {
            return Err(Error::data(format!("merge counts do not add up: {stats:?}")));
        }
        self.core.write(&core)?;
        Ok(stats)
    }

    /// Rebuild the star schema from the persisted core dataset.
    pub fn load(&self) -> Result<LoadStats> {
        self.load_inner().in_stage(Stage::Load)
    }

    fn load_inner(&self) -> Result<LoadStats> {
        let core = self.core.read()?;
        let schema = StarSchema::build(&core)?;
        self.loader.load(&schema)
    }

    /// Stage, merge and load.
    pub fn run(&self) -> Result<PipelineReport> {
        let staging = self.stage()?;
        let merge = self.merge()?;
        let load = self.load()?;
        Ok(PipelineReport {
            staging,
            merge,
            load,
        })
    }

    /// Read-only handle on the loaded model.
    pub fn warehouse(&self) -> Result<Warehouse> {
        Warehouse::open(self.loader.path()).in_stage(Stage::Report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exportdw_core::config::StorageConfig;
    use std::fs;
    use std::path::Path;

    fn config_in(root: &Path, months: &[u32]) -> Config {
        Config {
            storage: StorageConfig {
                raw_dir: root.join("raw"),
                staging_dir: root.join("staging"),
                warehouse_dir: root.join("dw"),
                ..StorageConfig::default()
            },
            batches: months
                .iter()
                .map(|m| BatchConfig::new(Period::new(2025, *m).unwrap(), "exports.csv"))
                .collect(),
            ..Config::default()
        }
    }

    fn write_raw(config: &Config, month: u32, body: &str) {
        let batch = config
            .batches
            .iter()
            .find(|b| b.period.month == month)
            .unwrap();
        let path = config.raw_path(batch);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn test_missing_raw_batch_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &[1, 2]);
        write_raw(
            &config,
            1,
            "RAZON_SOCIAL_EXPORTADOR,SUBPARTIDA,VALOR_FOB_USD\nACME,0901,10\n",
        );

        let report = Pipeline::new(config).unwrap().stage().unwrap();

        assert_eq!(report.staged(), 1);
        assert_eq!(report.skipped(), 1);
        assert!(matches!(report.batches[1], BatchOutcome::Skipped { .. }));
        assert_eq!(report.totals().rows_normalized, 1);
    }

    #[test]
    fn test_load_without_core_names_stage() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(config_in(dir.path(), &[1])).unwrap();

        let err = pipeline.load().unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Load));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path(), &[1]);
        config.batches.push(config.batches[0].clone());

        assert!(matches!(Pipeline::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_run_reports_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), &[1]);
        write_raw(
            &config,
            1,
            "RAZON_SOCIAL_EXPORTADOR,PAIS_DESTINO_FINAL,SUBPARTIDA,VALOR_FOB_USD\n\
             ACME,Chile,0901,10\n\
             ACME,Chile,0901,10\n\
             GLOBEX,Peru,0603,5\n",
        );
        let pipeline = Pipeline::new(config).unwrap();

        let report = pipeline.run().unwrap();

        assert_eq!(report.merge.input_rows, 3);
        assert_eq!(report.merge.duplicates, 1);
        assert_eq!(report.load.facts, 2);
        assert_eq!(pipeline.warehouse().unwrap().table_counts().unwrap().facts, 2);
    }
}
