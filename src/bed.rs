//! BED to record bridge
//!
//! Turns 0-based half-open BED intervals (`chrom start end [period score strand]`)
//! plus the assembly sequence into 18-column records. Values the BED file
//! cannot provide (percent match, percent indel, entropy) are set to -1.

use crate::error::Result;
use crate::genome::Assembly;
use crate::record::TandemRepeatRecord;
use crate::sequence::{gc_content, reverse_complement};
use crate::stats::round_to;
use std::collections::BTreeMap;
use std::io::BufRead;
use tracing::{debug, info, warn};

/// Value written for fields a BED interval does not carry
pub const UNAVAILABLE: f64 = -1.0;

/// Project tag used when none is given
pub const DEFAULT_PROJECT: &str = "FasTAN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
}

/// One BED interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BedInterval {
    pub chrom: String,
    /// 0-based inclusive
    pub start: u64,
    /// 0-based exclusive
    pub end: u64,
    /// Repeat period from column 4, 1 when absent
    pub period: u32,
    pub strand: Strand,
}

impl BedInterval {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Parse BED intervals. Lines with fewer than three columns, bad coordinates
/// or a bad period are logged and skipped.
pub fn parse_bed<R: BufRead>(reader: R) -> Result<Vec<BedInterval>> {
    let mut intervals = Vec::new();
    let mut skipped = 0usize;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_bed_line(line) {
            Some(interval) => intervals.push(interval),
            None => {
                warn!(line = i + 1, "Skipping invalid BED line");
                skipped += 1;
            }
        }
    }
    info!(intervals = intervals.len(), skipped = skipped, "BED intervals loaded");
    Ok(intervals)
}

fn parse_bed_line(line: &str) -> Option<BedInterval> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 3 {
        return None;
    }
    let chrom = fields[0].split_whitespace().next()?.to_string();
    let start: u64 = fields[1].trim().parse().ok()?;
    let end: u64 = fields[2].trim().parse().ok()?;
    if start >= end {
        return None;
    }
    let period = match fields.get(3) {
        Some(value) => value.trim().parse::<u32>().ok().filter(|p| *p > 0)?,
        None => 1,
    };
    let strand = match fields.get(5).map(|s| s.trim()) {
        Some("-") => Strand::Reverse,
        _ => Strand::Forward,
    };
    Some(BedInterval {
        chrom,
        start,
        end,
        period,
        strand,
    })
}

/// Build records for every interval that fits its contig.
///
/// Contigs are visited in assembly order and intervals within a contig by
/// start. Ids are assigned from 1 in output order. Intervals past the contig
/// end or on an unknown contig are logged and skipped.
pub fn records_from_bed(
    assembly: &Assembly,
    intervals: &[BedInterval],
    project: &str,
) -> Vec<TandemRepeatRecord> {
    let mut by_contig: BTreeMap<&str, Vec<&BedInterval>> = BTreeMap::new();
    for interval in intervals {
        by_contig.entry(interval.chrom.as_str()).or_default().push(interval);
    }
    for entries in by_contig.values_mut() {
        entries.sort_by_key(|interval| interval.start);
    }

    let mut records = Vec::with_capacity(intervals.len());
    let mut skipped = 0usize;
    for (_, contig) in assembly.contigs() {
        let Some(entries) = by_contig.remove(contig.name.as_str()) else {
            debug!(contig = %contig.name, "No BED intervals for contig");
            continue;
        };
        for interval in entries {
            let Some(bases) = contig.slice(interval.start..interval.end) else {
                warn!(
                    contig = %contig.name,
                    end = interval.end,
                    contig_length = contig.len(),
                    "BED interval out of bounds, skipping"
                );
                skipped += 1;
                continue;
            };
            let forward = String::from_utf8_lossy(bases);
            let array = match interval.strand {
                Strand::Forward => forward.into_owned(),
                Strand::Reverse => reverse_complement(&forward),
            };
            records.push(interval_record(
                records.len() as u64 + 1,
                &contig.name,
                interval,
                array,
                project,
            ));
        }
    }
    for (chrom, entries) in &by_contig {
        warn!(contig = %chrom, intervals = entries.len(), "BED contig missing from assembly, skipping");
        skipped += entries.len();
    }

    info!(records = records.len(), skipped = skipped, "Records built from BED");
    records
}

fn interval_record(
    id: u64,
    head: &str,
    interval: &BedInterval,
    array: String,
    project: &str,
) -> TandemRepeatRecord {
    let length = interval.len();
    let period = interval.period;
    let consensus: String = if (period as usize) <= array.len() {
        array[..period as usize].to_string()
    } else {
        array.clone()
    };
    TandemRepeatRecord {
        project: project.to_string(),
        id,
        head: head.to_string(),
        left_index: interval.start + 1,
        right_index: interval.end,
        period,
        copy_number: round_to(length as f64 / period as f64, 1),
        percent_match: UNAVAILABLE,
        percent_indel: UNAVAILABLE,
        entropy: UNAVAILABLE,
        consensus_gc_percent: 100.0 * gc_content(&consensus),
        array_gc_percent: 100.0 * gc_content(&array),
        consensus,
        array,
        array_length: length,
        joined: false,
        family: None,
        reference_annotation: None,
    }
}

/// FASTA entry for an extracted interval, headed `chrom_start_end_length_period`
/// with the original 0-based start.
pub fn extracted_fasta(record: &TandemRepeatRecord) -> String {
    format!(
        ">{}_{}_{}_{}_{}\n{}\n",
        record.head,
        record.left_index - 1,
        record.right_index,
        record.array_length,
        record.period,
        record.array
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    fn assembly(content: &str) -> (NamedTempFile, Assembly) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        let assembly = Assembly::from_fasta(file.path()).unwrap();
        (file, assembly)
    }

    #[test]
    fn test_parse_bed() {
        let bed = "# comment\nchr1\t2\t8\t2\t0\t+\nchr1\t5\t3\nshort\t1\nchr2 extra\t0\t4\nchr1\t0\t4\tx\n";
        let intervals = parse_bed(Cursor::new(bed)).unwrap();
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].period, 2);
        assert_eq!(intervals[0].len(), 6);
        assert_eq!(intervals[1].chrom, "chr2");
        assert_eq!(intervals[1].period, 1);
        assert_eq!(intervals[1].strand, Strand::Forward);
    }

    #[test]
    fn test_records_from_bed() {
        let (_file, assembly) = assembly(">chr1 desc\nGGATATATCC\n>chr2\nAAAACCCC\n");
        let bed = "chr2\t2\t6\t2\t0\t-\nchr1\t2\t8\t2\t0\t+\nchr1\t0\t20\t2\t0\t+\n";
        let intervals = parse_bed(Cursor::new(bed)).unwrap();
        let records = records_from_bed(&assembly, &intervals, DEFAULT_PROJECT);

        assert_eq!(records.len(), 2);
        let first = &records[0];
        assert_eq!(first.id, 1);
        assert_eq!(first.head, "chr1");
        assert_eq!(first.left_index, 3);
        assert_eq!(first.right_index, 8);
        assert_eq!(first.array, "ATATAT");
        assert_eq!(first.consensus, "AT");
        assert_eq!(first.copy_number, 3.0);
        assert_eq!(first.percent_match, -1.0);
        assert_eq!(first.entropy, -1.0);

        let second = &records[1];
        assert_eq!(second.head, "chr2");
        assert_eq!(second.array, "GGTT");
        assert_eq!(second.array_gc(), 0.5);

        // converted records satisfy the record invariants
        let reparsed = TandemRepeatRecord::parse_line(&first.to_string(), 1).unwrap();
        assert_eq!(reparsed.array, first.array);
    }

    #[test]
    fn test_extracted_fasta_header() {
        let (_file, assembly) = assembly(">chr1\nGGATATATCC\n");
        let intervals = parse_bed(Cursor::new("chr1\t2\t8\t2\n")).unwrap();
        let records = records_from_bed(&assembly, &intervals, "p");
        assert_eq!(extracted_fasta(&records[0]), ">chr1_2_8_6_2\nATATAT\n");
    }
}
