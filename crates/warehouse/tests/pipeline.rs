//! End-to-end runs over CSV raw batches in a scratch directory.

use approx::assert_relative_eq;
use exportdw_core::config::{BatchConfig, StorageConfig};
use exportdw_core::{Config, Field, Period};
use exportdw_warehouse::{BatchOutcome, CoreStore, Pipeline};
use rusqlite::Connection;
use std::fs;
use std::path::Path;

const JANUARY: &str = "\
 razon_social_exportador ,NIT_EXPORTADOR,PAIS_DESTINO_FINAL,SUBPARTIDA,VALOR_FOB_USD,PESO_NETO_KGS,FECHA_DECLARACION_EXPORTACION,NUM_SERIE,OBSERVACIONES
ACME,900123456,Chile,0901110000,1000,50,20250115,S-1,urgent
GLOBEX,800555111,Peru,0603110000,,12,20250120,S-2,
,,,,,,,,
";

const FEBRUARY: &str = "\
SUBPARTIDA,NUMERO SERIE,RAZON_SOCIAL_EXPORTADOR,NIT_EXPORTADOR,PAIS_DESTINO_FINAL,PESO_NETO_KGS,VALOR_FOB_USD,FECHA_DECLARACION_EXPORTACION
0901110000,S-7,ACME,900123456,Chile,50,1000,20250115
0603110000,S-9,INITECH,700999000,Peru,10,\"2,500.50\",20250203
";

fn p(month: u32) -> Period {
    Period::new(2025, month).unwrap()
}

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
            .map(|m| BatchConfig::new(p(*m), format!("exports_{m:02}.csv")))
            .collect(),
        ..Config::default()
    }
}

fn write_raw(config: &Config, period: Period, body: &str) {
    let batch = config.batches.iter().find(|b| b.period == period).unwrap();
    let path = config.raw_path(batch);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn seeded(root: &Path) -> Config {
    let config = config_in(root, &[1, 2]);
    write_raw(&config, p(1), JANUARY);
    write_raw(&config, p(2), FEBRUARY);
    config
}

fn dump_table(db: &Path, sql: &str) -> Vec<Vec<String>> {
    let conn = Connection::open(db).unwrap();
    let mut stmt = conn.prepare(sql).unwrap();
    let columns = stmt.column_count();
    let rows = stmt
        .query_map([], |row| {
            (0..columns)
                .map(|i| {
                    let value: rusqlite::types::Value = row.get(i)?;
                    Ok(format!("{value:?}"))
                })
                .collect::<rusqlite::Result<Vec<String>>>()
        })
        .unwrap();
    rows.collect::<rusqlite::Result<Vec<_>>>().unwrap()
}

#[test]
fn test_same_declaration_in_two_batches_is_one_fact() {
    let dir = tempfile::tempdir().unwrap();
    let config = seeded(dir.path());
    let db = config.storage.database_path();
    let pipeline = Pipeline::new(config).unwrap();

    let report = pipeline.run().unwrap();

    assert_eq!(report.merge.duplicates, 1);
    assert_eq!(report.load.facts, 2);

    let conn = Connection::open(&db).unwrap();
    let count = |sql: &str| -> i64 { conn.query_row(sql, [], |row| row.get(0)).unwrap() };
    assert_eq!(count("SELECT COUNT(*) FROM dim_company WHERE name = 'ACME'"), 1);
    assert_eq!(count("SELECT COUNT(*) FROM dim_country WHERE name = 'Chile'"), 1);
    assert_eq!(count("SELECT COUNT(*) FROM dim_product WHERE code = '0901110000'"), 1);
    assert_eq!(
        count(
            "SELECT COUNT(*) FROM fact_exports f
             JOIN dim_company c ON c.company_key = f.company_key
             WHERE c.name = 'ACME'"
        ),
        1
    );

    let warehouse = pipeline.warehouse().unwrap();
    let january = warehouse.top_companies(Some(p(1)), 10).unwrap();
    assert_eq!(january.len(), 1);
    assert_eq!(january[0].label, "ACME");
    assert_relative_eq!(january[0].total, 1000.0);

    let totals = warehouse.totals_by_period().unwrap();
    assert_eq!(totals.len(), 2);
    assert_eq!(totals[0].facts, 1);
    assert_relative_eq!(totals[1].total_fob_usd, 2500.5);
    assert_eq!(warehouse.orphaned_facts().unwrap(), 0);
}

#[test]
fn test_first_seen_copy_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let config = seeded(dir.path());
    let core_path = config.storage.core_path();
    let pipeline = Pipeline::new(config).unwrap();

    pipeline.stage().unwrap();
    pipeline.merge().unwrap();

    let core = CoreStore::at(core_path).read().unwrap();
    let acme = core
        .iter()
        .find(|r| r.record.company_name.as_deref() == Some("ACME"))
        .unwrap();
    assert_eq!(acme.batch_period, p(1));
    assert_eq!(acme.record.serial_number.as_deref(), Some("S-1"));
}

#[test]
fn test_rejection_and_completeness_counts() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(seeded(dir.path())).unwrap();

    let report = pipeline.stage().unwrap();

    let january = match &report.batches[0] {
        BatchOutcome::Staged { stats, .. } => stats.clone(),
        other => panic!("january not staged: {other:?}"),
    };
    assert_eq!(january.blank_rows, 1);
    assert_eq!(january.rows_read, 2);
    assert_eq!(january.rows_rejected, 1);
    assert_eq!(january.rejections_by_field.get(&Field::FobUsd), Some(&1));
    assert_eq!(january.dropped_columns, vec!["OBSERVACIONES".to_string()]);

    let totals = report.totals();
    assert_eq!(totals.rows_read, totals.rows_normalized + totals.rows_rejected);
    assert_eq!(totals.rows_normalized, 3);

    let merge = pipeline.merge().unwrap();
    assert_eq!(merge.input_rows, totals.rows_normalized);
    assert!(merge.is_consistent());
}

#[test]
fn test_aliases_fill_the_same_field() {
    let dir = tempfile::tempdir().unwrap();
    let config = seeded(dir.path());
    let core_path = config.storage.core_path();
    let pipeline = Pipeline::new(config).unwrap();

    pipeline.stage().unwrap();
    pipeline.merge().unwrap();

    let core = CoreStore::at(core_path).read().unwrap();
    let serials: Vec<_> = core
        .iter()
        .map(|r| r.record.serial_number.clone())
        .collect();
    assert_eq!(serials, vec![Some("S-1".to_string()), Some("S-9".to_string())]);
}

#[test]
fn test_rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = seeded(dir.path());
    let staging_file = config.storage.staging_path(p(1));
    let core_path = config.storage.core_path();
    let db = config.storage.database_path();
    let pipeline = Pipeline::new(config).unwrap();

    let facts_sql = "SELECT * FROM fact_exports ORDER BY fact_id";
    let company_sql = "SELECT * FROM dim_company ORDER BY company_key";

    pipeline.run().unwrap();
    let staging_before = fs::read(&staging_file).unwrap();
    let core_before = CoreStore::at(&core_path).read().unwrap();
    let facts_before = dump_table(&db, facts_sql);
    let companies_before = dump_table(&db, company_sql);

    pipeline.run().unwrap();

    assert_eq!(fs::read(&staging_file).unwrap(), staging_before);
    assert_eq!(CoreStore::at(&core_path).read().unwrap(), core_before);
    assert_eq!(dump_table(&db, facts_sql), facts_before);
    assert_eq!(dump_table(&db, company_sql), companies_before);
}

#[test]
fn test_new_period_only_adds() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), &[1, 2]);
    write_raw(&config, p(1), JANUARY);
    let before = Pipeline::new(config.clone()).unwrap().run().unwrap();

    write_raw(&config, p(2), FEBRUARY);
    let after = Pipeline::new(config).unwrap().run().unwrap();

    assert_eq!(before.staging.skipped(), 1);
    assert_eq!(before.load.facts, 1);
    assert_eq!(after.load.facts, 2);
    assert!(after.load.companies >= before.load.companies);
}
