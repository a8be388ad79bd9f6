//! Tandem repeat records and their 18-column tab-delimited form
//!
//! Column order: project, id, head, left index, right index, period, copy
//! number, percent match, percent indel, entropy, consensus, array, array GC,
//! consensus GC, array length, joined flag, family, reference annotation.
//! GC columns are percentages on disk and fractions in memory.

use crate::error::{Result, TrevisError};
use crate::sequence::shannon_entropy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Number of columns in a record line
pub const FIELD_COUNT: usize = 18;

/// Source tag written in the second GFF3 column
pub const GFF_SOURCE: &str = "Trevis";

/// Score written in the sixth GFF3 column
pub const GFF_SCORE: u32 = 1000;

/// Family label used when a record was never assigned one
pub const UNASSIGNED_FAMILY: &str = "unassigned";

/// One detected tandem repeat array
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TandemRepeatRecord {
    pub project: String,
    pub id: u64,
    /// Source sequence (contig) name
    pub head: String,
    /// 1-based inclusive start
    pub left_index: u64,
    /// 1-based inclusive end
    pub right_index: u64,
    pub period: u32,
    pub copy_number: f64,
    pub percent_match: f64,
    pub percent_indel: f64,
    pub entropy: f64,
    pub consensus: String,
    pub array: String,
    /// Percentage 0..100, as written in the record file
    pub array_gc_percent: f64,
    pub consensus_gc_percent: f64,
    pub array_length: u64,
    pub joined: bool,
    pub family: Option<String>,
    pub reference_annotation: Option<String>,
}

/// Attribute keys a GFF3 line can carry for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GffKey {
    Gc,
    Id,
    Length,
    Name,
    Period,
    Pmatch,
}

impl GffKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            GffKey::Gc => "gc",
            GffKey::Id => "id",
            GffKey::Length => "length",
            GffKey::Name => "name",
            GffKey::Period => "period",
            GffKey::Pmatch => "pmatch",
        }
    }
}

impl TandemRepeatRecord {
    /// Parse one record line. `line_no` is only used for error messages.
    ///
    /// Tab-separated lines must have all 18 columns. Lines without tabs are
    /// split on whitespace, in which case the trailing joined/family/annotation
    /// columns may be missing.
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        let mut fields: Vec<&str> = if line.contains('\t') {
            line.split('\t').collect()
        } else {
            line.split_whitespace().collect()
        };
        if !line.contains('\t') && (FIELD_COUNT - 3..FIELD_COUNT).contains(&fields.len()) {
            fields.resize(FIELD_COUNT, "");
        }
        if fields.len() != FIELD_COUNT {
            return Err(TrevisError::malformed(
                line_no,
                format!("expected {} fields, found {}", FIELD_COUNT, fields.len()),
            ));
        }

        let record = Self {
            project: fields[0].to_string(),
            id: parse_field(fields[1], "id", line_no)?,
            head: fields[2].to_string(),
            left_index: parse_field(fields[3], "left index", line_no)?,
            right_index: parse_field(fields[4], "right index", line_no)?,
            period: parse_field(fields[5], "period", line_no)?,
            copy_number: parse_field(fields[6], "copy number", line_no)?,
            percent_match: parse_field(fields[7], "percent match", line_no)?,
            percent_indel: parse_field(fields[8], "percent indel", line_no)?,
            entropy: parse_field(fields[9], "entropy", line_no)?,
            consensus: fields[10].to_string(),
            array: fields[11].to_string(),
            array_gc_percent: parse_field(fields[12], "array GC", line_no)?,
            consensus_gc_percent: parse_field(fields[13], "consensus GC", line_no)?,
            array_length: parse_field(fields[14], "array length", line_no)?,
            joined: parse_flag(fields[15]),
            family: optional_text(fields[16]),
            reference_annotation: optional_text(fields[17]),
        };
        record.validate(line_no)?;
        Ok(record)
    }

    fn validate(&self, line_no: usize) -> Result<()> {
        if self.period == 0 {
            return Err(TrevisError::malformed(line_no, "period must be positive"));
        }
        if self.right_index < self.left_index {
            return Err(TrevisError::malformed(
                line_no,
                format!(
                    "right index {} is before left index {}",
                    self.right_index, self.left_index
                ),
            ));
        }
        let span = self.right_index - self.left_index + 1;
        if span != self.array_length {
            return Err(TrevisError::malformed(
                line_no,
                format!(
                    "coordinates span {} bp but array length is {}",
                    span, self.array_length
                ),
            ));
        }
        if !self.array.is_empty() && self.array.len() as u64 != self.array_length {
            return Err(TrevisError::malformed(
                line_no,
                format!(
                    "array has {} bp but array length is {}",
                    self.array.len(),
                    self.array_length
                ),
            ));
        }
        Ok(())
    }

    /// Array GC as a fraction 0..1.
    pub fn array_gc(&self) -> f64 {
        self.array_gc_percent / 100.0
    }

    pub fn consensus_gc(&self) -> f64 {
        self.consensus_gc_percent / 100.0
    }

    /// Family label, or [`UNASSIGNED_FAMILY`].
    pub fn family_label(&self) -> &str {
        self.family.as_deref().unwrap_or(UNASSIGNED_FAMILY)
    }

    /// Shannon entropy recomputed from the array.
    pub fn array_entropy(&self) -> f64 {
        shannon_entropy(&self.array)
    }

    /// Numeric features: period, copy number, percent match, percent indel,
    /// entropy, array GC, consensus GC, array length.
    pub fn numeric_vector(&self) -> [f64; 8] {
        [
            self.period as f64,
            self.copy_number,
            self.percent_match,
            self.percent_indel,
            self.entropy,
            self.array_gc(),
            self.consensus_gc(),
            self.array_length as f64,
        ]
    }

    fn gff_value(&self, key: GffKey) -> String {
        match key {
            GffKey::Gc => self.array_gc().to_string(),
            GffKey::Id => self.id.to_string(),
            GffKey::Length => self.array_length.to_string(),
            GffKey::Name => self.family_label().to_string(),
            GffKey::Period => self.period.to_string(),
            GffKey::Pmatch => self.percent_match.to_string(),
        }
    }

    /// GFF3 line (with trailing newline). Attribute keys are written in sorted order.
    pub fn to_gff3(&self, feature_type: &str, keys: &[GffKey]) -> String {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();
        let attributes: Vec<String> = keys
            .iter()
            .map(|key| format!("{}={}", key.as_str(), self.gff_value(*key)))
            .collect();
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t.\t.\t{}\n",
            self.head,
            GFF_SOURCE,
            feature_type,
            self.left_index,
            self.right_index,
            GFF_SCORE,
            attributes.join(";")
        )
    }

    /// FASTA entry for the array, headed by id and family.
    pub fn to_fasta(&self) -> String {
        format!(">{} {}\n{}\n", self.id, self.family_label(), self.array)
    }
}

impl fmt::Display for TandemRepeatRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.project,
            self.id,
            self.head,
            self.left_index,
            self.right_index,
            self.period,
            self.copy_number,
            self.percent_match,
            self.percent_indel,
            self.entropy,
            self.consensus,
            self.array,
            self.array_gc_percent,
            self.consensus_gc_percent,
            self.array_length,
            if self.joined { 1 } else { 0 },
            self.family.as_deref().unwrap_or(""),
            self.reference_annotation.as_deref().unwrap_or(""),
        )
    }
}

fn parse_field<T: std::str::FromStr>(value: &str, name: &str, line_no: usize) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        TrevisError::malformed(line_no, format!("invalid {} value '{}'", name, value))
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "True" | "TRUE")
}

fn optional_text(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == "None" {
        None
    } else {
        Some(value.to_string())
    }
}

/// Streaming reader over record lines. Blank lines and `#` comments are skipped.
pub struct RecordReader<R> {
    reader: R,
    line_no: usize,
    buffer: String,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buffer: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<TandemRepeatRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buffer.clear();
            self.line_no += 1;
            match self.reader.read_line(&mut self.buffer) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            let line = self.buffer.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            return Some(TandemRepeatRecord::parse_line(line, self.line_no));
        }
    }
}

/// A record file on disk. Each call to [`TrfFile::records`] starts a fresh pass.
#[derive(Debug, Clone)]
pub struct TrfFile {
    path: PathBuf,
}

impl TrfFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> Result<RecordReader<BufReader<File>>> {
        let file = File::open(&self.path).map_err(|e| {
            TrevisError::io_error(format!("Failed to open {}: {}", self.path.display(), e))
        })?;
        Ok(RecordReader::new(BufReader::new(file)))
    }

    /// Read every record into memory.
    pub fn read_all(&self) -> Result<Vec<TandemRepeatRecord>> {
        self.records()?.collect()
    }
}

/// Read all records and sort them by head. The sort is stable, so records on
/// the same head keep their file order.
pub fn load_sorted_records<P: AsRef<Path>>(path: P) -> Result<Vec<TandemRepeatRecord>> {
    let mut records = TrfFile::new(path).read_all()?;
    records.sort_by(|a, b| a.head.cmp(&b.head));
    Ok(records)
}
