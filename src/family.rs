//! Per-family statistics for one classification pass
//!
//! Accumulators keep the exact per-record values; statistics are computed
//! when the report is written. Tables are never merged across passes.

use crate::error::Result;
use crate::record::TandemRepeatRecord;
use crate::stats::{round_to, simple_statistics};
use ahash::AHashMap;
use serde::Serialize;
use std::io::Write;
use tracing::debug;

/// Header line of a `.report` file
pub const REPORT_HEADER: &str = "family\tn\ttotal_length\tmin_length\tmax_length\tmean_length\tstd_length\tmin_pmatch\tmax_pmatch\tmean_pmatch\tstd_pmatch\tmin_gc\tmax_gc\tmean_gc";

/// Values collected for one family label
#[derive(Debug, Clone, Default)]
pub struct FamilyStatsAccumulator {
    pub name: String,
    pub n: usize,
    pub lengths: Vec<u64>,
    pub pmatch_values: Vec<f64>,
    /// GC as a percentage
    pub gc_values: Vec<f64>,
    pub min_length: u64,
    pub max_length: u64,
}

impl FamilyStatsAccumulator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add(&mut self, length: u64, pmatch: f64, gc_percent: f64) {
        if self.n == 0 {
            self.min_length = length;
            self.max_length = length;
        } else {
            self.min_length = self.min_length.min(length);
            self.max_length = self.max_length.max(length);
        }
        self.n += 1;
        self.lengths.push(length);
        self.pmatch_values.push(pmatch);
        self.gc_values.push(gc_percent);
    }

    pub fn add_record(&mut self, record: &TandemRepeatRecord) {
        self.add(record.array_length, record.percent_match, record.array_gc_percent);
    }

    pub fn total_length(&self) -> u64 {
        self.lengths.iter().sum()
    }

    /// Finalize into a report row. Means and deviations are rounded to 2 decimals.
    pub fn summary(&self) -> Result<FamilySummary> {
        let lengths: Vec<f64> = self.lengths.iter().map(|&l| l as f64).collect();
        let length_stats = simple_statistics(&lengths)?;
        let pmatch_stats = simple_statistics(&self.pmatch_values)?;
        let gc_stats = simple_statistics(&self.gc_values)?;

        Ok(FamilySummary {
            family: self.name.clone(),
            n: self.n,
            total_length: self.total_length(),
            min_length: self.min_length,
            max_length: self.max_length,
            mean_length: round_to(length_stats.mean, 2),
            std_length: round_to(length_stats.standard_deviation, 2),
            min_pmatch: min_of(&self.pmatch_values),
            max_pmatch: max_of(&self.pmatch_values),
            mean_pmatch: round_to(pmatch_stats.mean, 2),
            std_pmatch: round_to(pmatch_stats.standard_deviation, 2),
            min_gc: round_to(min_of(&self.gc_values), 2),
            max_gc: round_to(max_of(&self.gc_values), 2),
            mean_gc: round_to(gc_stats.mean, 2),
            std_gc: round_to(gc_stats.standard_deviation, 2),
        })
    }
}

fn min_of(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

/// One finalized report row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilySummary {
    pub family: String,
    pub n: usize,
    pub total_length: u64,
    pub min_length: u64,
    pub max_length: u64,
    pub mean_length: f64,
    pub std_length: f64,
    pub min_pmatch: f64,
    pub max_pmatch: f64,
    pub mean_pmatch: f64,
    pub std_pmatch: f64,
    pub min_gc: f64,
    pub max_gc: f64,
    pub mean_gc: f64,
    /// Kept for callers; not a report column
    pub std_gc: f64,
}

impl FamilySummary {
    /// Tab-separated row matching [`REPORT_HEADER`].
    pub fn to_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{:?}\t{:?}\t{:?}\t{:?}\t{:?}\t{:?}\t{:?}\t{:?}\t{:?}",
            self.family,
            self.n,
            self.total_length,
            self.min_length,
            self.max_length,
            self.mean_length,
            self.std_length,
            self.min_pmatch,
            self.max_pmatch,
            self.mean_pmatch,
            self.std_pmatch,
            self.min_gc,
            self.max_gc,
            self.mean_gc,
        )
    }
}

/// Family accumulators of one pass, in first-encounter order
#[derive(Debug, Default)]
pub struct FamilyTable {
    families: Vec<FamilyStatsAccumulator>,
    index: AHashMap<String, usize>,
}

impl FamilyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record under its family label, creating the accumulator on first use.
    pub fn add_record(&mut self, record: &TandemRepeatRecord) {
        let label = record.family_label();
        let slot = match self.index.get(label) {
            Some(&slot) => slot,
            None => {
                self.index.insert(label.to_string(), self.families.len());
                self.families.push(FamilyStatsAccumulator::new(label));
                self.families.len() - 1
            }
        };
        self.families[slot].add_record(record);
    }

    pub fn get(&self, family: &str) -> Option<&FamilyStatsAccumulator> {
        self.index.get(family).map(|&slot| &self.families[slot])
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Total number of records across all families
    pub fn total_records(&self) -> usize {
        self.families.iter().map(|f| f.n).sum()
    }

    /// Rows sorted by descending count; ties keep encounter order.
    pub fn summaries(&self) -> Result<Vec<FamilySummary>> {
        let mut rows = self
            .families
            .iter()
            .map(FamilyStatsAccumulator::summary)
            .collect::<Result<Vec<_>>>()?;
        rows.sort_by(|a, b| b.n.cmp(&a.n));
        Ok(rows)
    }

    /// Write the header and one row per family.
    pub fn write_report<W: Write>(&self, writer: &mut W) -> Result<()> {
        writeln!(writer, "{}", REPORT_HEADER)?;
        for row in self.summaries()? {
            debug!(family = %row.family, n = row.n, max_length = row.max_length, "Family");
            writeln!(writer, "{}", row.to_row())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(family: Option<&str>, length: u64, pmatch: f64, gc: f64) -> TandemRepeatRecord {
        TandemRepeatRecord {
            family: family.map(str::to_string),
            array_length: length,
            percent_match: pmatch,
            array_gc_percent: gc,
            ..TandemRepeatRecord::default()
        }
    }

    #[test]
    fn test_single_family_summary() {
        let mut table = FamilyTable::new();
        table.add_record(&record(Some("(AT)n"), 300, 90.0, 40.0));
        table.add_record(&record(Some("(AT)n"), 100, 95.0, 50.0));
        table.add_record(&record(Some("(AT)n"), 200, 100.0, 60.0));

        let rows = table.summaries().unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.n, 3);
        assert_eq!(row.total_length, 600);
        assert_eq!(row.min_length, 100);
        assert_eq!(row.max_length, 300);
        assert_eq!(row.mean_length, 200.0);
        assert_eq!(row.std_length, 81.65);
        assert_eq!(row.min_pmatch, 90.0);
        assert_eq!(row.max_pmatch, 100.0);
        assert_eq!(row.mean_pmatch, 95.0);
        assert_eq!(row.mean_gc, 50.0);
        assert_eq!(row.min_gc, 40.0);
        assert_eq!(row.max_gc, 60.0);
    }

    #[test]
    fn test_mean_on_exact_half_rounds_to_even() {
        let mut acc = FamilyStatsAccumulator::new("(AT)n");
        for _ in 0..7 {
            acc.add(200, 100.0, 50.0);
        }
        acc.add(201, 100.0, 50.0);
        let summary = acc.summary().unwrap();
        assert_eq!(summary.total_length, 1601);
        assert_eq!(summary.mean_length, 200.12);
    }

    #[test]
    fn test_row_format() {
        let mut acc = FamilyStatsAccumulator::new("tSSR_AT");
        acc.add(10, 100.0, 0.0);
        let row = acc.summary().unwrap().to_row();
        assert_eq!(
            row,
            "tSSR_AT\t1\t10\t10\t10\t10.0\t0.0\t100.0\t100.0\t100.0\t0.0\t0.0\t0.0\t0.0"
        );
        assert_eq!(row.split('\t').count(), REPORT_HEADER.split('\t').count());
    }

    #[test]
    fn test_empty_accumulator_prints_zeros() {
        let acc = FamilyStatsAccumulator::new("empty");
        let summary = acc.summary().unwrap();
        assert_eq!(summary.n, 0);
        assert_eq!(summary.mean_length, 0.0);
        assert_eq!(summary.min_pmatch, 0.0);
    }

    #[test]
    fn test_rows_sorted_by_count_stably() {
        let mut table = FamilyTable::new();
        table.add_record(&record(Some("B"), 10, 100.0, 50.0));
        table.add_record(&record(Some("A"), 10, 100.0, 50.0));
        table.add_record(&record(Some("C"), 10, 100.0, 50.0));
        table.add_record(&record(Some("C"), 10, 100.0, 50.0));
        table.add_record(&record(None, 10, 100.0, 50.0));

        let names: Vec<String> = table
            .summaries()
            .unwrap()
            .into_iter()
            .map(|r| r.family)
            .collect();
        assert_eq!(names, vec!["C", "B", "A", "unassigned"]);
        assert_eq!(table.total_records(), 5);
        assert_eq!(table.get("C").unwrap().lengths.len(), 2);
    }

    #[test]
    fn test_write_report() {
        let mut table = FamilyTable::new();
        table.add_record(&record(Some("(AT)n"), 10, 100.0, 0.0));
        let mut out = Vec::new();
        table.write_report(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(REPORT_HEADER));
        assert!(lines.next().unwrap().starts_with("(AT)n\t1\t10\t"));
    }
}
