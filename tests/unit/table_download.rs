//! Per-table download decisions

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::time::Duration;

use csmar_downloader::api::{ApiError, ApiRateLimiter};
use csmar_downloader::catalog::selection_condition;
use csmar_downloader::data_collector::{CollectError, DataCollector, TableOutcome};
use csmar_downloader::models::TableSpec;
use csmar_downloader::utils::{ChunkPeriod, DateInterval};

use crate::common::api_mock::{Call, FakeApi, FakeTable};
use crate::common::test_data::{catalog, date, interval};

fn three_years() -> DateInterval {
    interval(date(2020, 1, 1), date(2022, 12, 31))
}

fn collector(api: FakeApi, max_rows: u64) -> DataCollector<FakeApi> {
    DataCollector::new(api, three_years(), ApiRateLimiter::new(Duration::ZERO))
        .with_max_rows(max_rows)
        .with_progress(false)
}

#[test_log::test(tokio::test)]
async fn test_zero_count_is_empty_without_query() {
    let api = FakeApi::new().with_table("CG_Ceo", FakeTable::new());
    let mut collector = collector(api, 1_000);

    let outcome = collector
        .download_table(&TableSpec::new("CG_Ceo", &["Stkcd", "Annodt"], "CEO changes"))
        .await;

    assert_matches!(outcome, TableOutcome::Empty);
    assert!(collector.api().query_ranges("CG_Ceo").is_empty());
}

#[test_log::test(tokio::test)]
async fn test_direct_query_covers_full_range() {
    let api = FakeApi::new()
        .with_table("FS_Combas", FakeTable::new().rows_per_day(three_years(), 1));
    let mut collector = collector(api, 5_000);

    let outcome = collector
        .download_table(&TableSpec::new("FS_Combas", &["Stkcd", "Accper"], "Balance sheet"))
        .await;

    assert_matches!(outcome, TableOutcome::Downloaded(rows) if rows.len() == 1096);
    assert_eq!(collector.api().query_ranges("FS_Combas"), vec![Some(three_years())]);
}

#[test_log::test(tokio::test)]
async fn test_static_table_is_queried_without_range() {
    let api = FakeApi::new()
        .with_table("STK_Area_Classification", FakeTable::new().undated_rows(40));
    let mut collector = collector(api, 10);

    let spec = TableSpec::new("STK_Area_Classification", &["Stkcd", "ProvinceName"], "Area")
        .static_snapshot();
    let outcome = collector.download_table(&spec).await;

    // Static tables cannot be chunked, even above the limit
    assert_matches!(outcome, TableOutcome::Downloaded(rows) if rows.len() == 40);
    assert_eq!(collector.api().count_ranges("STK_Area_Classification"), vec![None]);
    assert_eq!(collector.api().query_ranges("STK_Area_Classification"), vec![None]);
}

#[test_log::test(tokio::test)]
async fn test_over_limit_uses_configured_chunk_period() {
    let api = FakeApi::new()
        .with_table("TRD_Dalyr", FakeTable::new().rows_per_day(three_years(), 1));
    let mut collector = collector(api, 100);

    let spec = TableSpec::new("TRD_Dalyr", &["Stkcd", "Trddt"], "Daily returns")
        .with_chunk_period(ChunkPeriod::Month);
    let outcome = collector.download_table(&spec).await;

    assert_matches!(outcome, TableOutcome::Downloaded(rows) if rows.len() == 1096);
    let queried = collector.api().query_ranges("TRD_Dalyr");
    assert_eq!(queried.len(), 36);
    assert_eq!(queried[0], Some(interval(date(2020, 1, 1), date(2020, 1, 31))));
}

#[test_log::test(tokio::test)]
async fn test_chunked_download_sends_one_condition_throughout() {
    let api = FakeApi::new()
        .with_table("STK_MKT_ST", FakeTable::new().rows_per_day(three_years(), 1));
    let mut collector = collector(api, 500);

    let spec = TableSpec::new("STK_MKT_ST", &["Symbol", "Date", "IsST"], "ST status");
    let outcome = collector.download_table(&spec).await;

    assert_matches!(outcome, TableOutcome::Downloaded(rows) if rows.len() == 1096);
    let expected = "(Symbol like '0%' or Symbol like '3%' or Symbol like '6%')";
    assert_eq!(selection_condition(&spec), expected);

    // Whole-range count, then a count and a query for each of the three years
    let conditions = collector.api().conditions("STK_MKT_ST");
    assert_eq!(conditions.len(), 1 + 3 + 3);
    assert!(conditions.iter().all(|sent| sent == expected));
}

#[test_log::test(tokio::test)]
async fn test_row_limit_error_retries_in_chunks() {
    let api = FakeApi::new()
        .with_table("TRD_Year", FakeTable::new().rows_per_day(three_years(), 1))
        .unknown_counts("TRD_Year")
        .with_row_limit(500);
    let mut collector = collector(api, 500);

    let outcome = collector
        .download_table(&TableSpec::new("TRD_Year", &["Stkcd", "Trdynt"], "Annual trading"))
        .await;

    assert_matches!(outcome, TableOutcome::Downloaded(rows) if rows.len() == 1096);
    let queried = collector.api().query_ranges("TRD_Year");
    assert_eq!(queried.len(), 4);
    assert_eq!(queried[0], Some(three_years()));
    assert_eq!(queried[1], Some(interval(date(2020, 1, 1), date(2020, 12, 31))));
}

#[test_log::test(tokio::test)]
async fn test_other_query_failure_fails_table() {
    let api = FakeApi::new()
        .with_table("FI_T1", FakeTable::new().rows_per_day(three_years(), 1))
        .fail_query("FI_T1", Some(three_years()));
    let mut collector = collector(api, 5_000);

    let outcome = collector
        .download_table(&TableSpec::new("FI_T1", &["Stkcd"], "Solvency"))
        .await;

    assert_matches!(
        outcome,
        TableOutcome::Failed(CollectError::Api(ApiError::Status { status: 504, .. }))
    );
    assert_eq!(collector.api().query_ranges("FI_T1").len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_all_chunks_failing_is_a_failure_not_empty() {
    let mut api = FakeApi::new()
        .with_table("FI_T5", FakeTable::new().rows_per_day(three_years(), 1));
    for year in [2020, 2021, 2022] {
        api = api.fail_query("FI_T5", Some(interval(date(year, 1, 1), date(year, 12, 31))));
    }
    let mut collector = collector(api, 1_000);

    let outcome = collector
        .download_table(&TableSpec::new("FI_T5", &["Stkcd"], "Profitability"))
        .await;

    assert_matches!(outcome, TableOutcome::Failed(CollectError::ChunksFailed { failed: 3, .. }));
}

#[test_log::test(tokio::test)]
async fn test_invalid_table_is_skipped_after_validation() {
    let api = FakeApi::new()
        .with_table("CG_Co", FakeTable::new().rows_per_day(three_years(), 1))
        .with_fields("CG_Co", &["Stkcd", "Stknme_en"]);
    let mut collector = collector(api, 5_000);

    let spec = TableSpec::new("CG_Co", &["Stkcd", "ListedDate"], "Company profile");
    let report = collector
        .validate_tables(&catalog("corporate_governance", vec![("company_profile", spec.clone())]))
        .await;
    assert!(!report.all_ok());

    let outcome = collector.download_table(&spec).await;

    assert_matches!(outcome, TableOutcome::Failed(CollectError::Invalid { .. }));
    assert!(!collector
        .api()
        .calls()
        .iter()
        .any(|call| matches!(call, Call::Count(..) | Call::Query(..))));
}
