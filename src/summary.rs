//! Microsatellite summary table
//!
//! Built from the microsatellite GFF3: per family name, the number of
//! features, the summed `|end - start|`, and the share of imperfect and
//! perfect (`pmatch == 100`) features.

use crate::error::Result;
use crate::gff::{read_gff3, Gff3Feature};
use crate::stats::round_to;
use ahash::AHashMap;
use std::io::Write;
use std::path::Path;
use tracing::warn;

pub const SUMMARY_HEADER: &str = "#Name\t#\tLength (bp)\t%unperfect\t%perfect";

#[derive(Debug, Clone, PartialEq)]
pub struct MicroSummaryRow {
    pub name: String,
    pub count: usize,
    pub length: u64,
    pub percent_imperfect: f64,
    pub percent_perfect: f64,
}

/// Summarize features. Features without a `name` are skipped with a warning;
/// a missing or unparseable `pmatch` counts as imperfect. Rows are sorted by
/// descending count, ties by name.
pub fn summarize_features(features: &[Gff3Feature]) -> Vec<MicroSummaryRow> {
    #[derive(Default)]
    struct Tally {
        total: usize,
        perfect: usize,
        imperfect: usize,
        length: u64,
    }

    let mut tallies: AHashMap<&str, Tally> = AHashMap::new();
    for feature in features {
        let Some(name) = feature.attribute("name") else {
            warn!(seqid = %feature.seqid, start = feature.start, "Feature without name attribute");
            continue;
        };
        let perfect = feature
            .attribute("pmatch")
            .and_then(|p| p.parse::<f64>().ok())
            .is_some_and(|p| p == 100.0);
        let tally = tallies.entry(name).or_default();
        tally.total += 1;
        if perfect {
            tally.perfect += 1;
        } else {
            tally.imperfect += 1;
        }
        tally.length += feature.length();
    }

    let mut rows: Vec<MicroSummaryRow> = tallies
        .into_iter()
        .map(|(name, tally)| MicroSummaryRow {
            name: name.to_string(),
            count: tally.total,
            length: tally.length,
            percent_imperfect: round_to(100.0 * tally.imperfect as f64 / tally.total as f64, 2),
            percent_perfect: round_to(100.0 * tally.perfect as f64 / tally.total as f64, 2),
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    rows
}

pub fn write_summary<W: Write>(rows: &[MicroSummaryRow], writer: &mut W) -> Result<()> {
    writeln!(writer, "{}", SUMMARY_HEADER)?;
    for row in rows {
        writeln!(
            writer,
            "{}\t{}\t{}\t{:?}\t{:?}",
            row.name, row.count, row.length, row.percent_imperfect, row.percent_perfect
        )?;
    }
    Ok(())
}

/// Read a microsatellite GFF3 file and summarize it.
pub fn micro_summary<P: AsRef<Path>>(gff_path: P) -> Result<Vec<MicroSummaryRow>> {
    let features = read_gff3(gff_path, None)?;
    Ok(summarize_features(&features))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(name: &str, start: u64, end: u64, pmatch: &str) -> Gff3Feature {
        let line = format!(
            "chr1\tTrevis\tmicrosatellite\t{}\t{}\t1000\t.\t.\tid=1;name={};pmatch={}",
            start, end, name, pmatch
        );
        Gff3Feature::parse_line(&line, 1).unwrap()
    }

    #[test]
    fn test_summarize_features() {
        let features = vec![
            feature("(AT)n", 1, 11, "100"),
            feature("(AT)n", 20, 30, "90.5"),
            feature("(AT)n", 40, 45, "100.0"),
            feature("(AC)n", 50, 60, "100"),
        ];
        let rows = summarize_features(&features);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "(AT)n");
        assert_eq!(rows[0].count, 3);
        assert_eq!(rows[0].length, 25);
        assert_eq!(rows[0].percent_perfect, 66.67);
        assert_eq!(rows[0].percent_imperfect, 33.33);
        assert_eq!(rows[1].percent_perfect, 100.0);
    }

    #[test]
    fn test_write_summary() {
        let rows = summarize_features(&[feature("(AT)n", 1, 11, "100")]);
        let mut out = Vec::new();
        write_summary(&rows, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("{}\n(AT)n\t1\t10\t0.0\t100.0\n", SUMMARY_HEADER)
        );
    }
}
