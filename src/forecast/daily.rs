use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::types::{Forecast3hItem, Forecast3hResponse};

pub const FORECAST_DAYS: usize = 5;

#[derive(Debug, Clone)]
pub struct DaySummary<'a> {
    pub date: NaiveDate,
    pub avg_temp_c: f64,
    pub min_temp_c: f64,
    pub max_temp_c: f64,
    pub entries: Vec<&'a Forecast3hItem>,
}

impl DaySummary<'_> {
    /// The most frequent condition group of the day, ties going to the earliest.
    pub fn dominant_condition(&self) -> Option<&str> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for entry in &self.entries {
            let Some(condition) = entry.condition() else {
                continue;
            };
            match counts.iter_mut().find(|(main, _)| *main == condition.main) {
                Some((_, n)) => *n += 1,
                None => counts.push((condition.main.as_str(), 1)),
            }
        }

        let mut best: Option<(&str, usize)> = None;
        for (main, n) in counts {
            if best.map_or(true, |(_, best_n)| n > best_n) {
                best = Some((main, n));
            }
        }
        best.map(|(main, _)| main)
    }
}

/// Group 3-hour entries by the calendar date in `dt_txt`, earliest first,
/// keeping at most `FORECAST_DAYS` days.
pub fn group_into_days(forecast: &Forecast3hResponse) -> Vec<DaySummary<'_>> {
    let mut days: BTreeMap<NaiveDate, Vec<&Forecast3hItem>> = BTreeMap::new();

    for item in &forecast.list {
        let Some(date) = entry_date(item) else {
            tracing::debug!("Skipping forecast entry with bad dt_txt {:?}", item.dt_txt);
            continue;
        };
        days.entry(date).or_default().push(item);
    }

    days.into_iter()
        .take(FORECAST_DAYS)
        .map(|(date, entries)| summarize_day(date, entries))
        .collect()
}

fn entry_date(item: &Forecast3hItem) -> Option<NaiveDate> {
    let date = item.dt_txt.split_whitespace().next()?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn summarize_day(date: NaiveDate, entries: Vec<&Forecast3hItem>) -> DaySummary<'_> {
    let count = entries.len() as f64;
    let temp_sum: f64 = entries.iter().map(|e| e.main.temp).sum();
    let min_temp_c = entries.iter().map(|e| e.main.temp).fold(f64::INFINITY, f64::min);
    let max_temp_c = entries.iter().map(|e| e.main.temp).fold(f64::NEG_INFINITY, f64::max);

    DaySummary {
        date,
        avg_temp_c: temp_sum / count,
        min_temp_c,
        max_temp_c,
        entries,
    }
}
