//! Aggregate queries behind the analytics endpoints

use rusqlite::params;
use serde::Serialize;
use std::str::FromStr;

use super::{SqliteStore, StoreError};
use crate::types::DateRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    /// SQL expression bucketing `ts_rfc` into a period label.
    fn period_expr(&self) -> &'static str {
        match self {
            Granularity::Day => "substr(ts_rfc, 1, 10)",
            Granularity::Week => "strftime('%Y-W%W', substr(ts_rfc, 1, 10))",
            Granularity::Month => "substr(ts_rfc, 1, 7)",
        }
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            other => Err(format!("unknown granularity '{}', expected day, week or month", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelinePoint {
    pub date: String,
    pub given: i64,
    pub received: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarterTotal {
    pub year: i32,
    pub quarter: u32,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeatmapCell {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairCount {
    #[serde(rename = "giver")]
    pub giver_id: String,
    #[serde(rename = "recipient")]
    pub recipient_id: String,
    pub count: i64,
}

impl SqliteStore {
    /// Every gift is given by one user and received by another, so both
    /// totals of a period are the same sum.
    pub fn timeline(
        &self,
        range: &DateRange,
        granularity: Granularity,
    ) -> Result<Vec<TimelinePoint>, StoreError> {
        let (start, end) = range.bounds();
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} AS period, SUM(count) FROM beers \
             WHERE substr(ts_rfc, 1, 10) BETWEEN ?1 AND ?2 \
             GROUP BY period ORDER BY period",
            granularity.period_expr()
        ))?;
        let points = stmt
            .query_map(params![start, end], |row| {
                let total: i64 = row.get(1)?;
                Ok(TimelinePoint {
                    date: row.get(0)?,
                    given: total,
                    received: total,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(points)
    }

    /// Totals per calendar quarter for every year in `start_year..=end_year`
    /// that has at least one gift.
    pub fn quarterly(&self, start_year: i32, end_year: i32) -> Result<Vec<QuarterTotal>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT CAST(substr(ts_rfc, 1, 4) AS INTEGER) AS year,
                   (CAST(substr(ts_rfc, 6, 2) AS INTEGER) + 2) / 3 AS quarter,
                   SUM(count)
            FROM beers
            WHERE CAST(substr(ts_rfc, 1, 4) AS INTEGER) BETWEEN ?1 AND ?2
            GROUP BY year, quarter
            ORDER BY year, quarter
            "#,
        )?;
        let totals = stmt
            .query_map(params![start_year, end_year], |row| {
                Ok(QuarterTotal {
                    year: row.get(0)?,
                    quarter: row.get(1)?,
                    count: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(totals)
    }

    /// Daily totals for a calendar heatmap.
    pub fn heatmap(&self, range: &DateRange) -> Result<Vec<HeatmapCell>, StoreError> {
        let (start, end) = range.bounds();
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT substr(ts_rfc, 1, 10) AS date, SUM(count) FROM beers \
             WHERE substr(ts_rfc, 1, 10) BETWEEN ?1 AND ?2 \
             GROUP BY date ORDER BY date",
        )?;
        let cells = stmt
            .query_map(params![start, end], |row| {
                Ok(HeatmapCell {
                    date: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cells)
    }

    /// Strongest giver→recipient pairs.
    pub fn pairs(&self, range: &DateRange, limit: usize) -> Result<Vec<PairCount>, StoreError> {
        let (start, end) = range.bounds();
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT giver_id, recipient_id, SUM(count) AS total FROM beers \
             WHERE substr(ts_rfc, 1, 10) BETWEEN ?1 AND ?2 \
             GROUP BY giver_id, recipient_id \
             ORDER BY total DESC, giver_id, recipient_id LIMIT ?3",
        )?;
        let pairs = stmt
            .query_map(params![start, end, limit as i64], |row| {
                Ok(PairCount {
                    giver_id: row.get(0)?,
                    recipient_id: row.get(1)?,
                    count: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pairs)
    }
}
