//! Catalog → download → CSV/manifest → merge, against the fake service

use pretty_assertions::assert_eq;
use std::fs;
use std::time::Duration;

use csmar_downloader::api::ApiRateLimiter;
use csmar_downloader::catalog::Catalog;
use csmar_downloader::data_collector::DataCollector;
use csmar_downloader::export::{save_data, save_merged};
use csmar_downloader::merge::merge_classifications;
use csmar_downloader::models::TableSpec;

use crate::common::api_mock::{FakeApi, FakeTable};
use crate::common::logging;
use crate::common::test_data::{catalog, date, interval};

#[test_log::test(tokio::test)]
async fn test_download_and_save_writes_csv_and_manifest() {
    logging::log_test_step("Download two tables and export them");
    let range = interval(date(2022, 1, 1), date(2023, 12, 31));
    let api = FakeApi::new()
        .with_table(
            "FS_Combas",
            FakeTable::new()
                .rows_on(date(2022, 12, 31), 3)
                .rows_on(date(2023, 12, 31), 2),
        )
        .with_table("TRD_Dalyr", FakeTable::new().rows_per_day(range, 1))
        .with_fields("FS_Combas", &["Stkcd", "Accper"])
        .with_fields("TRD_Dalyr", &["Stkcd", "Trddt"]);
    let mut collector = DataCollector::new(api, range, ApiRateLimiter::new(Duration::ZERO))
        .with_max_rows(400)
        .with_progress(false);

    let tables = catalog(
        "market",
        vec![
            ("balance_sheet", TableSpec::new("FS_Combas", &["Stkcd", "Accper"], "Balance sheet")),
            ("daily_returns", TableSpec::new("TRD_Dalyr", &["Stkcd", "Trddt"], "Daily returns")),
        ],
    );
    assert!(collector.validate_tables(&tables).await.all_ok());

    let downloaded = collector.download_all(&tables).await;
    assert_eq!(collector.stats().successful, 2);

    let dir = tempfile::tempdir().unwrap();
    let (manifest, manifest_path) =
        save_data(dir.path(), &downloaded, range, "20240101_120000").unwrap();

    assert_eq!(manifest.total_tables, 2);
    assert_eq!(manifest.total_records, 5 + 730);
    assert_eq!(manifest.time_period, "2022-01-01 to 2023-12-31");

    let csv_path = dir.path().join("market").join("TRD_Dalyr_20240101_120000.csv");
    let content = fs::read_to_string(csv_path).unwrap();
    assert!(content.starts_with("Stkcd,Trddt\n"));
    assert_eq!(content.lines().count(), 731);

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(manifest_path).unwrap()).unwrap();
    assert_eq!(written["total_categories"], 1);
    assert_eq!(written["files"][1]["table"], "daily_returns");
    assert_eq!(written["files"][1]["table_id"], "TRD_Dalyr");
}

#[test_log::test(tokio::test)]
async fn test_classification_catalog_merges_on_stock_code() {
    let range = interval(date(2024, 1, 1), date(2024, 12, 31));
    let classifications = Catalog::classifications();
    let mut api = FakeApi::new();
    for category in &classifications.categories {
        for entry in &category.tables {
            api = api.with_table(&entry.spec.table, FakeTable::new().rows_on(date(2024, 6, 30), 2));
        }
    }
    let mut collector = DataCollector::new(api, range, ApiRateLimiter::new(Duration::ZERO))
        .with_progress(false);

    let downloaded = collector.download_all(&classifications).await;
    assert_eq!(downloaded.len(), 6);

    let datasets: Vec<_> = downloaded
        .iter()
        .map(|table| (table.key.clone(), table.rows.clone()))
        .collect();
    let merged = merge_classifications(&datasets);

    // The fake emits the same Stkcd and Date cells for every table, so rows join one to one
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.columns()[0], "Stkcd");
    assert!(merged.column_index("IndustryCode_csrc_industry_2001").is_some());

    let dir = tempfile::tempdir().unwrap();
    let path = save_merged(dir.path(), &merged, "20240101_120000").unwrap();
    assert!(path.ends_with("csmar_classifications_merged_20240101_120000.csv"));
    assert_eq!(fs::read_to_string(path).unwrap().lines().count(), 3);
}
