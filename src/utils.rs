use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inclusive date range at day granularity. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateInterval {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateInterval {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(anyhow!("Start date ({}) must not be after end date ({})", start, end));
        }
        Ok(Self { start, end })
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn days_count(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Dates in the `YYYY-MM-DD` form the vendor expects
    pub fn bounds_iso(&self) -> (String, String) {
        (
            self.start.format("%Y-%m-%d").to_string(),
            self.end.format("%Y-%m-%d").to_string(),
        )
    }
}

impl fmt::Display for DateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.start, self.end)
    }
}

/// Granularity used to slice a date range, coarsest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkPeriod {
    #[default]
    Year,
    Month,
    Day,
}

impl ChunkPeriod {
    /// Next finer period; `None` once `Day` is reached.
    pub fn finer(self) -> Option<ChunkPeriod> {
        match self {
            ChunkPeriod::Year => Some(ChunkPeriod::Month),
            ChunkPeriod::Month => Some(ChunkPeriod::Day),
            ChunkPeriod::Day => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChunkPeriod::Year => "year",
            ChunkPeriod::Month => "month",
            ChunkPeriod::Day => "day",
        }
    }

    /// First day of the period following the one containing `date`
    fn next_boundary(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            ChunkPeriod::Year => NaiveDate::from_ymd_opt(date.year() + 1, 1, 1),
            ChunkPeriod::Month => {
                if date.month() == 12 {
                    NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
                }
            }
            ChunkPeriod::Day => date.succ_opt(),
        }
    }
}

impl fmt::Display for ChunkPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkPeriod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "year" => Ok(ChunkPeriod::Year),
            "month" => Ok(ChunkPeriod::Month),
            "day" => Ok(ChunkPeriod::Day),
            other => Err(anyhow!("Unsupported chunk period: {}", other)),
        }
    }
}

/// Splits date intervals into calendar-aligned chunks
pub struct ChunkCalculator;

impl ChunkCalculator {
    /// Partition `interval` into contiguous sub-intervals, one per calendar
    /// `period` it overlaps, clipped to the interval at both ends.
    pub fn calculate_chunks(interval: DateInterval, period: ChunkPeriod) -> Vec<DateInterval> {
        let mut chunks = Vec::new();
        let mut current = interval.start;

        while current <= interval.end {
            let mut chunk_end = match period.next_boundary(current).and_then(|d| d.pred_opt()) {
                Some(last_day) => last_day.min(interval.end),
                None => interval.end,
            };
            if chunk_end < current {
                chunk_end = current;
            }

            chunks.push(DateInterval { start: current, end: chunk_end });

            match chunk_end.succ_opt() {
                Some(next) => current = next,
                None => break,
            }
        }

        chunks
    }
}

/// Parse a date given as `YYYY-MM-DD` or `YYYYMMDD`
pub fn parse_date(date_str: &str, field_name: &str) -> Result<NaiveDate> {
    let trimmed = date_str.trim();
    let format = if trimmed.len() == 8 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        "%Y%m%d"
    } else {
        "%Y-%m-%d"
    };

    NaiveDate::parse_from_str(trimmed, format).map_err(|_| {
        anyhow!(
            "Invalid {} '{}'. Expected YYYY-MM-DD (or YYYYMMDD).",
            field_name,
            date_str
        )
    })
}
