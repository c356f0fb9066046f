use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::data_collector::DownloadedTable;
use crate::models::RowSet;
use crate::utils::DateInterval;

/// File-name timestamp, e.g. `20240131_154500`
pub fn timestamp_now() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestFile {
    pub category: String,
    pub table: String,
    pub table_id: String,
    pub file: String,
    pub records: usize,
    pub size_bytes: u64,
    pub size_mb: f64,
}

/// Summary of one export run, written next to the CSV files
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub download_date: String,
    pub time_period: String,
    pub total_categories: usize,
    pub total_tables: usize,
    pub total_records: usize,
    pub total_size_mb: f64,
    pub files: Vec<ManifestFile>,
}

fn round_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

/// Write rows as UTF-8 CSV with a header row
pub fn write_csv(path: &Path, rows: &RowSet) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(rows.columns())?;
    for row in rows.rows() {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Save every downloaded table to `<output>/<category>/<table>_<timestamp>.csv`
/// and write `download_manifest_<timestamp>.json` describing them.
pub fn save_data(
    output_dir: &Path,
    tables: &[DownloadedTable],
    period: DateInterval,
    timestamp: &str,
) -> Result<(Manifest, PathBuf)> {
    info!("💾 Saving {} tables to {}", tables.len(), output_dir.display());
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let mut files = Vec::with_capacity(tables.len());
    for table in tables {
        if table.rows.is_empty() {
            continue;
        }

        let path = output_dir
            .join(&table.category)
            .join(format!("{}_{}.csv", table.table, timestamp));
        write_csv(&path, &table.rows)?;

        let size_bytes = fs::metadata(&path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();
        info!(
            "  ✅ {}/{}: {} records ({:.2} MB)",
            table.category,
            table.key,
            table.rows.len(),
            round_mb(size_bytes)
        );

        files.push(ManifestFile {
            category: table.category.clone(),
            table: table.key.clone(),
            table_id: table.table.clone(),
            file: path.display().to_string(),
            records: table.rows.len(),
            size_bytes,
            size_mb: round_mb(size_bytes),
        });
    }

    let categories: BTreeSet<&str> = files.iter().map(|f| f.category.as_str()).collect();
    let total_bytes: u64 = files.iter().map(|f| f.size_bytes).sum();
    let (start, end) = period.bounds_iso();

    let manifest = Manifest {
        download_date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        time_period: format!("{} to {}", start, end),
        total_categories: categories.len(),
        total_tables: files.len(),
        total_records: files.iter().map(|f| f.records).sum(),
        total_size_mb: round_mb(total_bytes),
        files,
    };

    let manifest_path = output_dir.join(format!("download_manifest_{}.json", timestamp));
    let json = serde_json::to_string_pretty(&manifest)?;
    fs::write(&manifest_path, json)
        .with_context(|| format!("Failed to write manifest {}", manifest_path.display()))?;
    info!("📋 Manifest saved: {}", manifest_path.display());

    Ok((manifest, manifest_path))
}

/// Write the merged classification table as `csmar_classifications_merged_<timestamp>.csv`
pub fn save_merged(output_dir: &Path, merged: &RowSet, timestamp: &str) -> Result<PathBuf> {
    let path = output_dir.join(format!("csmar_classifications_merged_{}.csv", timestamp));
    write_csv(&path, merged)?;
    info!(
        "💾 Merged dataset saved: {} ({} records, {} columns)",
        path.display(),
        merged.len(),
        merged.columns().len()
    );
    Ok(path)
}
