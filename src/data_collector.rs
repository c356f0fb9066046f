use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, ApiRateLimiter, CsmarApi};
use crate::catalog::{selection_condition, Catalog};
use crate::models::{Config, RowSet, TableSpec, DEFAULT_MAX_ROWS};
use crate::utils::{ChunkCalculator, ChunkPeriod, DateInterval};

/// Errors that stop the download of a single table
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("{table}: {count} rows in {interval} exceed the {max_rows} row limit even at day granularity")]
    Unsplittable {
        table: String,
        interval: DateInterval,
        count: u64,
        max_rows: u64,
    },

    #[error("{table}: all {failed} chunks failed, no data retrieved")]
    ChunksFailed { table: String, failed: usize },

    #[error("{table}: skipped after validation ({reason})")]
    Invalid { table: String, reason: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Sub-interval whose data query failed
#[derive(Debug, Clone)]
pub struct ChunkFailure {
    pub interval: DateInterval,
    pub error: String,
}

/// Deduplicated rows of one logical download plus per-chunk bookkeeping
#[derive(Debug, Default)]
pub struct RangeOutcome {
    pub rows: RowSet,
    pub chunks_fetched: usize,
    pub chunks_empty: usize,
    pub failed_chunks: Vec<ChunkFailure>,
    pub duplicates_removed: usize,
}

#[derive(Debug)]
pub enum TableOutcome {
    Downloaded(RowSet),
    Empty,
    Failed(CollectError),
}

/// Rows of one table ready for export
#[derive(Debug, Clone)]
pub struct DownloadedTable {
    pub category: String,
    pub key: String,
    pub table: String,
    pub rows: RowSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationStatus {
    Ok,
    MissingColumns(Vec<String>),
    Error(String),
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStatus::Ok => f.write_str("ok"),
            ValidationStatus::MissingColumns(columns) => {
                write!(f, "missing columns: {}", columns.join(", "))
            }
            ValidationStatus::Error(message) => write!(f, "error: {}", message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableValidation {
    pub category: String,
    pub key: String,
    pub table: String,
    pub status: ValidationStatus,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub tables: Vec<TableValidation>,
}

impl ValidationReport {
    pub fn ok_count(&self) -> usize {
        self.tables.iter().filter(|t| t.status == ValidationStatus::Ok).count()
    }

    pub fn missing_count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| matches!(t.status, ValidationStatus::MissingColumns(_)))
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| matches!(t.status, ValidationStatus::Error(_)))
            .count()
    }

    pub fn total(&self) -> usize {
        self.tables.len()
    }

    pub fn all_ok(&self) -> bool {
        self.ok_count() == self.total()
    }

    pub fn print_summary(&self) {
        info!("📋 Validation summary");
        info!("   ✅ Valid tables: {}", self.ok_count());
        info!("   ⚠️  Tables with missing columns: {}", self.missing_count());
        info!("   ❌ Tables with errors: {}", self.error_count());
        info!("   📊 Total tables checked: {}", self.total());

        for entry in self.tables.iter().filter(|t| t.status != ValidationStatus::Ok) {
            warn!("   {}/{} ({}): {}", entry.category, entry.key, entry.table, entry.status);
        }

        if self.all_ok() {
            info!("🎉 All tables validated successfully");
        }
    }
}

/// Counters for one batch download
#[derive(Debug, Clone, Default)]
pub struct DownloadStats {
    pub total_tables: usize,
    pub successful: usize,
    pub failed: usize,
    pub empty: usize,
    pub unsplittable: usize,
    pub total_records: usize,
    pub total_size_bytes: usize,
    pub failed_tables: Vec<String>,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
}

impl DownloadStats {
    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn elapsed(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    pub fn print_summary(&self) {
        info!("{}", "=".repeat(60));
        info!("📊 DOWNLOAD SUMMARY");
        info!("{}", "=".repeat(60));
        if let Some(elapsed) = self.elapsed() {
            info!("⏱️  Duration: {}s", elapsed.num_seconds());
        }
        info!("📋 Total tables: {}", self.total_tables);
        info!("✅ Successful: {}", self.successful);
        info!("⚪ Empty: {}", self.empty);
        info!("❌ Failed: {}", self.failed);
        if self.unsplittable > 0 {
            warn!("🚫 Unsplittable: {}", self.unsplittable);
        }
        info!("📈 Total records: {}", self.total_records);
        info!("💾 Estimated size: {:.2} MB", self.total_size_mb());

        if !self.failed_tables.is_empty() {
            warn!("Failed tables:");
            for table in &self.failed_tables {
                warn!("  - {}", table);
            }
        }
    }
}

/// Downloads catalog tables through a `CsmarApi`, chunking date ranges to
/// stay under the per-query row limit.
pub struct DataCollector<A: CsmarApi> {
    api: A,
    max_rows: u64,
    rate_limiter: ApiRateLimiter,
    date_range: DateInterval,
    validation: HashMap<String, ValidationStatus>,
    stats: DownloadStats,
    show_progress: bool,
}

impl<A: CsmarApi> DataCollector<A> {
    pub fn new(api: A, date_range: DateInterval, rate_limiter: ApiRateLimiter) -> Self {
        Self {
            api,
            max_rows: DEFAULT_MAX_ROWS,
            rate_limiter,
            date_range,
            validation: HashMap::new(),
            stats: DownloadStats::default(),
            show_progress: true,
        }
    }

    pub fn from_config(api: A, config: &Config) -> Self {
        Self::new(api, config.date_range, ApiRateLimiter::new(config.rate_limit_delay))
            .with_max_rows(config.max_rows)
    }

    pub fn with_max_rows(mut self, max_rows: u64) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn stats(&self) -> &DownloadStats {
        &self.stats
    }

    /// Download `interval` of `table`, starting at `period` and refining to
    /// finer periods wherever a sub-interval holds more than `max_rows` rows.
    ///
    /// Count failures are treated as unknown and the data query is attempted
    /// anyway. Failed data queries are recorded per chunk. Only a single day
    /// over the limit aborts the whole range.
    pub async fn fetch_range(
        &self,
        table: &str,
        columns: &[String],
        condition: &str,
        interval: DateInterval,
        period: ChunkPeriod,
    ) -> Result<RangeOutcome, CollectError> {
        let mut outcome = RangeOutcome::default();

        // Reversed so popping yields chronological order
        let mut worklist: Vec<(DateInterval, ChunkPeriod)> =
            ChunkCalculator::calculate_chunks(interval, period)
                .into_iter()
                .rev()
                .map(|chunk| (chunk, period))
                .collect();

        while let Some((chunk, chunk_period)) = worklist.pop() {
            let count = match self.api.query_count(columns, condition, table, Some(chunk)).await {
                Ok(count) => count,
                Err(e) => {
                    warn!("⚠️  Count failed for {} {}: {}", table, chunk, e);
                    None
                }
            };

            match count {
                Some(0) => {
                    debug!("⚪ {} {}: no rows", table, chunk);
                    outcome.chunks_empty += 1;
                    continue;
                }
                Some(count) if count > self.max_rows => {
                    let Some(finer) = chunk_period.finer() else {
                        error!("🚫 {} {}: {} rows in a single day", table, chunk, count);
                        return Err(CollectError::Unsplittable {
                            table: table.to_string(),
                            interval: chunk,
                            count,
                            max_rows: self.max_rows,
                        });
                    };
                    info!(
                        "🔀 {} {}: {} rows exceed limit, splitting by {}",
                        table, chunk, count, finer
                    );
                    worklist.extend(
                        ChunkCalculator::calculate_chunks(chunk, finer)
                            .into_iter()
                            .rev()
                            .map(|sub| (sub, finer)),
                    );
                    continue;
                }
                Some(count) => debug!("📥 {} {}: {} rows", table, chunk, count),
                None => debug!("📥 {} {}: count unknown, fetching anyway", table, chunk),
            }

            match self.api.query(columns, condition, table, Some(chunk)).await {
                Ok(rows) if rows.is_empty() => {
                    outcome.chunks_empty += 1;
                }
                Ok(rows) => {
                    info!("✅ {} {}: {} records", table, chunk, rows.len());
                    outcome.chunks_fetched += 1;
                    outcome.rows.append(rows);
                    self.rate_limiter.wait().await;
                }
                Err(e) => {
                    error!("❌ {} {}: query failed - {}", table, chunk, e);
                    outcome.failed_chunks.push(ChunkFailure {
                        interval: chunk,
                        error: e.to_string(),
                    });
                }
            }
        }

        outcome.duplicates_removed = outcome.rows.dedup();
        if outcome.duplicates_removed > 0 {
            debug!("{}: removed {} duplicate rows", table, outcome.duplicates_removed);
        }

        Ok(outcome)
    }

    /// Download one catalog table over the configured date range
    pub async fn download_table(&mut self, spec: &TableSpec) -> TableOutcome {
        if let Some(status) = self.validation.get(&spec.table) {
            if *status != ValidationStatus::Ok {
                warn!("⏭️  Skipping {}: {}", spec.table, status);
                return TableOutcome::Failed(CollectError::Invalid {
                    table: spec.table.clone(),
                    reason: status.to_string(),
                });
            }
        }

        let condition = selection_condition(spec);
        let range = spec.time_varying.then_some(self.date_range);
        debug!("{} condition: {}", spec.table, condition);

        let count = match self
            .api
            .query_count(&spec.columns, &condition, &spec.table, range)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!("⚠️  Could not count {}: {}", spec.table, e);
                None
            }
        };

        match count {
            Some(0) => {
                info!("⚪ {}: no records found", spec.table);
                return TableOutcome::Empty;
            }
            Some(count) if count > self.max_rows && spec.time_varying => {
                info!(
                    "📊 {}: {} records exceed the {} row limit, downloading in chunks",
                    spec.table, count, self.max_rows
                );
                return self.download_chunked(spec, &condition).await;
            }
            Some(count) if count > self.max_rows => {
                warn!(
                    "⚠️  {}: {} records in a static table, querying directly",
                    spec.table, count
                );
            }
            Some(count) => info!("📊 {}: {} records", spec.table, count),
            None => info!("📊 {}: record count unknown", spec.table),
        }

        match self.api.query(&spec.columns, &condition, &spec.table, range).await {
            Ok(rows) if rows.is_empty() => TableOutcome::Empty,
            Ok(mut rows) => {
                rows.dedup();
                TableOutcome::Downloaded(rows)
            }
            Err(e) if e.is_row_limit() && spec.time_varying => {
                warn!("⚠️  {}: row limit hit, retrying in chunks", spec.table);
                self.download_chunked(spec, &condition).await
            }
            Err(e) => TableOutcome::Failed(CollectError::Api(e)),
        }
    }

    async fn download_chunked(&self, spec: &TableSpec, condition: &str) -> TableOutcome {
        let period = spec.chunk_period.unwrap_or_default();
        let outcome = match self
            .fetch_range(&spec.table, &spec.columns, condition, self.date_range, period)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return TableOutcome::Failed(e),
        };

        if !outcome.failed_chunks.is_empty() {
            warn!(
                "⚠️  {}: {} chunks failed",
                spec.table,
                outcome.failed_chunks.len()
            );
        }

        if outcome.rows.is_empty() {
            if outcome.failed_chunks.is_empty() {
                TableOutcome::Empty
            } else {
                TableOutcome::Failed(CollectError::ChunksFailed {
                    table: spec.table.clone(),
                    failed: outcome.failed_chunks.len(),
                })
            }
        } else {
            TableOutcome::Downloaded(outcome.rows)
        }
    }

    /// Download every table of `catalog` in order, one call at a time
    pub async fn download_all(&mut self, catalog: &Catalog) -> Vec<DownloadedTable> {
        self.stats = DownloadStats {
            start_time: Some(Local::now()),
            ..DownloadStats::default()
        };

        info!(
            "🚀 Downloading catalog '{}': {} tables in {} categories ({})",
            catalog.name,
            catalog.total_tables(),
            catalog.categories.len(),
            self.date_range
        );

        let mut downloaded = Vec::new();
        let mut first_table = true;

        for category in &catalog.categories {
            info!("📁 Category: {} ({} tables)", category.name, category.tables.len());
            let pb = self.progress_bar(category.tables.len() as u64);
            let mut category_records = 0;
            let mut category_success = 0;

            for entry in &category.tables {
                if !first_table {
                    self.rate_limiter.wait().await;
                }
                first_table = false;

                pb.set_message(format!("{}/{}", category.name, entry.key));
                info!("📥 {} - {}", entry.spec.table, entry.spec.description);
                self.stats.total_tables += 1;

                match self.download_table(&entry.spec).await {
                    TableOutcome::Downloaded(rows) => {
                        info!("✅ {}: {} records", entry.spec.table, rows.len());
                        self.stats.successful += 1;
                        self.stats.total_records += rows.len();
                        self.stats.total_size_bytes += rows.estimated_size_bytes();
                        category_records += rows.len();
                        category_success += 1;
                        downloaded.push(DownloadedTable {
                            category: category.name.clone(),
                            key: entry.key.clone(),
                            table: entry.spec.table.clone(),
                            rows,
                        });
                    }
                    TableOutcome::Empty => {
                        self.stats.empty += 1;
                    }
                    TableOutcome::Failed(e) => {
                        error!("❌ {}", e);
                        if matches!(e, CollectError::Unsplittable { .. }) {
                            self.stats.unsplittable += 1;
                        }
                        self.stats.failed += 1;
                        self.stats
                            .failed_tables
                            .push(format!(
                                "{}/{} ({})",
                                category.name, entry.key, entry.spec.table
                            ));
                    }
                }

                pb.inc(1);
            }

            pb.finish_and_clear();
            info!(
                "📊 {}: {}/{} tables downloaded, {} records",
                category.name,
                category_success,
                category.tables.len(),
                category_records
            );
        }

        self.stats.end_time = Some(Local::now());
        downloaded
    }

    /// Compare the requested columns of every catalog table with the
    /// fields the service reports. Later downloads skip tables that fail.
    pub async fn validate_tables(&mut self, catalog: &Catalog) -> ValidationReport {
        info!("🔍 Validating {} tables...", catalog.total_tables());
        let mut report = ValidationReport::default();

        for category in &catalog.categories {
            for entry in &category.tables {
                let status = match self.api.list_fields(&entry.spec.table).await {
                    Ok(fields) => {
                        let available: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
                        let missing: Vec<String> = entry
                            .spec
                            .columns
                            .iter()
                            .filter(|column| !available.contains(&column.as_str()))
                            .cloned()
                            .collect();
                        if missing.is_empty() {
                            debug!(
                                "✅ {}: all {} columns present",
                                entry.spec.table,
                                entry.spec.columns.len()
                            );
                            ValidationStatus::Ok
                        } else {
                            warn!("⚠️  {}: missing columns {:?}", entry.spec.table, missing);
                            ValidationStatus::MissingColumns(missing)
                        }
                    }
                    Err(e) => {
                        error!("❌ {}: {}", entry.spec.table, e);
                        ValidationStatus::Error(e.to_string())
                    }
                };

                self.validation.insert(entry.spec.table.clone(), status.clone());
                report.tables.push(TableValidation {
                    category: category.name.clone(),
                    key: entry.key.clone(),
                    table: entry.spec.table.clone(),
                    status,
                });
            }
        }

        report
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
