//! Common test utilities and helpers


use chrono::NaiveDate;

/// Test data utilities
pub mod test_data {
    use super::*;
    use csmar_downloader::catalog::{Catalog, CatalogTable, Category};
    use csmar_downloader::models::{RowSet, TableSpec};
    use csmar_downloader::utils::DateInterval;

    pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    pub fn interval(start: NaiveDate, end: NaiveDate) -> DateInterval {
        DateInterval::new(start, end).unwrap()
    }

    pub fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    pub fn row_set(names: &[&str], rows: &[&[&str]]) -> RowSet {
        RowSet::from_rows(
            columns(names),
            rows.iter().map(|r| columns(r)).collect(),
        )
    }

    /// Single-category catalog from `(key, spec)` pairs
    pub fn catalog(category: &str, tables: Vec<(&str, TableSpec)>) -> Catalog {
        Catalog {
            name: "test".to_string(),
            categories: vec![Category {
                name: category.to_string(),
                tables: tables
                    .into_iter()
                    .map(|(key, spec)| CatalogTable {
                        key: key.to_string(),
                        spec,
                    })
                    .collect(),
            }],
        }
    }
}

/// Logging utilities for tests
pub mod logging {
    use tracing::{debug, info};

    /// Log test step
    pub fn log_test_step(step: &str) {
        info!("🧪 Test Step: {}", step);
    }

    /// Log test data
    pub fn log_test_data<T: std::fmt::Debug>(label: &str, data: &T) {
        debug!("📊 {}: {:?}", label, data);
    }
}
