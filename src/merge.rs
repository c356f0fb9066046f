use std::collections::HashMap;
use tracing::{info, warn};

use crate::models::RowSet;

pub const STOCK_KEY: &str = "Stkcd";
pub const DATE_KEY: &str = "Date";

/// Outer-join named datasets left to right on `Stkcd`, plus `Date` when both
/// sides carry it. Right-hand columns whose names are already taken get the
/// suffix `_<name>`. Empty datasets and datasets without `Stkcd` are skipped.
pub fn merge_classifications(datasets: &[(String, RowSet)]) -> RowSet {
    let mut base: Option<RowSet> = None;

    for (name, rows) in datasets {
        if rows.is_empty() {
            continue;
        }
        if rows.column_index(STOCK_KEY).is_none() {
            warn!("⚠️  {} has no {} column, not merged", name, STOCK_KEY);
            continue;
        }

        info!("🔗 Merging {} ({} records)", name, rows.len());
        base = Some(match base {
            None => rows.clone(),
            Some(left) => outer_join(&left, rows, name),
        });
    }

    let merged = base.unwrap_or_default();
    if let Some(index) = merged.column_index(STOCK_KEY) {
        let unique: std::collections::HashSet<&str> =
            merged.rows().iter().map(|row| row[index].as_str()).collect();
        info!(
            "📊 Merged: {} records, {} columns, {} unique stocks",
            merged.len(),
            merged.columns().len(),
            unique.len()
        );
    }
    merged
}

/// Left rows come first in their original order, each followed by its
/// matches; right rows without a match are appended at the end.
pub fn outer_join(left: &RowSet, right: &RowSet, right_name: &str) -> RowSet {
    let mut keys = vec![STOCK_KEY];
    if left.column_index(DATE_KEY).is_some() && right.column_index(DATE_KEY).is_some() {
        keys.push(DATE_KEY);
    }

    let left_keys: Vec<usize> = keys.iter().filter_map(|k| left.column_index(k)).collect();
    let right_keys: Vec<usize> = keys.iter().filter_map(|k| right.column_index(k)).collect();

    let right_values: Vec<usize> = (0..right.columns().len())
        .filter(|i| !right_keys.contains(i))
        .collect();

    let mut columns: Vec<String> = left.columns().to_vec();
    for &i in &right_values {
        let name = &right.columns()[i];
        if columns.contains(name) {
            columns.push(format!("{}_{}", name, right_name));
        } else {
            columns.push(name.clone());
        }
    }

    let key_of = |row: &Vec<String>, indices: &[usize]| -> Vec<String> {
        indices.iter().map(|&i| row[i].clone()).collect()
    };

    let mut right_index: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
    for (position, row) in right.rows().iter().enumerate() {
        right_index.entry(key_of(row, &right_keys)).or_default().push(position);
    }

    let mut matched = vec![false; right.len()];
    let mut merged = RowSet::new(columns);

    for row in left.rows() {
        match right_index.get(&key_of(row, &left_keys)) {
            Some(positions) => {
                for &position in positions {
                    matched[position] = true;
                    let right_row = &right.rows()[position];
                    let mut combined = row.clone();
                    combined.extend(right_values.iter().map(|&i| right_row[i].clone()));
                    merged.push_row(combined);
                }
            }
            None => merged.push_row(row.clone()),
        }
    }

    for (position, right_row) in right.rows().iter().enumerate() {
        if matched[position] {
            continue;
        }
        let mut combined = vec![String::new(); left.columns().len()];
        for (&left_i, &right_i) in left_keys.iter().zip(&right_keys) {
            combined[left_i] = right_row[right_i].clone();
        }
        combined.extend(right_values.iter().map(|&i| right_row[i].clone()));
        merged.push_row(combined);
    }

    merged
}
