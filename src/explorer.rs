//! Discovery helpers behind `csmar-explore` and `csmar-check`.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::api::{ApiError, CsmarApi};
use crate::models::{DatabaseInfo, FieldInfo, TableInfo};

/// Database names commonly granted to stock-market subscriptions
pub const COMMON_DATABASES: [&str; 5] = [
    "China Stock Market Series",
    "Stock Market Series",
    "中国股票市场系列研究数据库",
    "StockMarket",
    "CSMAR",
];

/// Case-insensitive search of table names and descriptions across every
/// database. Databases whose table listing fails are skipped.
pub async fn search_tables<A: CsmarApi + ?Sized>(
    api: &A,
    keyword: &str,
) -> Result<Vec<TableInfo>, ApiError> {
    let needle = keyword.to_lowercase();
    let databases = api.list_databases().await?;
    let mut matches = Vec::new();

    for database in databases.iter().filter(|db| !db.name.is_empty()) {
        let tables = match api.list_tables(&database.name).await {
            Ok(tables) => tables,
            Err(e) => {
                debug!("Skipping database {}: {}", database.name, e);
                continue;
            }
        };

        matches.extend(tables.into_iter().filter(|table| {
            table.name.to_lowercase().contains(&needle)
                || table.description.to_lowercase().contains(&needle)
        }));
    }

    info!("🔍 '{}': {} matching tables", keyword, matches.len());
    Ok(matches)
}

/// Outcome of probing one database for table access
#[derive(Debug)]
pub struct DatabaseProbe {
    pub database: String,
    pub result: Result<Vec<TableInfo>, ApiError>,
}

impl DatabaseProbe {
    pub fn accessible(&self) -> bool {
        matches!(&self.result, Ok(tables) if !tables.is_empty())
    }
}

/// Try to list the tables of each named database
pub async fn probe_databases<A: CsmarApi + ?Sized>(api: &A, names: &[&str]) -> Vec<DatabaseProbe> {
    let mut probes = Vec::with_capacity(names.len());
    for name in names {
        let result = api.list_tables(name).await;
        match &result {
            Ok(tables) if !tables.is_empty() => info!("✅ {}: {} tables", name, tables.len()),
            Ok(_) => warn!("❌ {}: no tables found or no access", name),
            Err(e) => warn!("❌ {}: {}", name, e),
        }
        probes.push(DatabaseProbe {
            database: name.to_string(),
            result,
        });
    }
    probes
}

/// Plain-text table with left-aligned columns
fn render_grid(headers: &[&str], rows: &[Vec<&str>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let line = |cells: &[&str]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", line(headers));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("  "));
    for row in rows {
        let _ = writeln!(out, "{}", line(row));
    }
    out
}

pub fn render_databases(databases: &[DatabaseInfo]) -> String {
    let rows: Vec<Vec<&str>> = databases
        .iter()
        .map(|db| vec![db.name.as_str(), db.description.as_str()])
        .collect();
    render_grid(&["Database", "Description"], &rows)
}

pub fn render_tables(tables: &[TableInfo]) -> String {
    let rows: Vec<Vec<&str>> = tables
        .iter()
        .map(|t| vec![t.name.as_str(), t.description.as_str()])
        .collect();
    render_grid(&["Table", "Description"], &rows)
}

pub fn render_fields(fields: &[FieldInfo]) -> String {
    let rows: Vec<Vec<&str>> = fields
        .iter()
        .map(|f| vec![f.name.as_str(), f.data_type.as_str(), f.description.as_str()])
        .collect();
    render_grid(&["Field", "Type", "Description"], &rows)
}

pub fn render_matches(matches: &[TableInfo]) -> String {
    let rows: Vec<Vec<&str>> = matches
        .iter()
        .map(|t| vec![t.name.as_str(), t.database.as_str(), t.description.as_str()])
        .collect();
    render_grid(&["Table", "Database", "Description"], &rows)
}

/// Save a database's table list as `tables_<database>.txt` in `dir`
pub fn save_table_list(dir: &Path, database: &str, tables: &[TableInfo]) -> Result<PathBuf> {
    let path = dir.join(format!("tables_{}.txt", database.replace(' ', "_")));

    let mut content = String::new();
    let _ = writeln!(content, "Database: {}", database);
    let _ = writeln!(content, "Tables ({}):", tables.len());
    let _ = writeln!(content, "{}", "=".repeat(70));
    for table in tables {
        if table.description.is_empty() {
            let _ = writeln!(content, "{}", table.name);
        } else {
            let _ = writeln!(content, "{}\t{}", table.name, table.description);
        }
    }

    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write table list {}", path.display()))?;
    info!("💾 Table list saved to: {}", path.display());
    Ok(path)
}
