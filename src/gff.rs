//! GFF3 features
//!
//! Only the shape the passes write is needed here: nine tab-separated
//! columns with `key=value` attributes. Lines or attribute items that do not
//! parse are logged and skipped.

use crate::error::Result;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

/// Header line written at the top of every GFF3 file
pub const GFF3_HEADER: &str = "##gff-version 3";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Gff3Feature {
    pub seqid: String,
    pub source: String,
    pub feature_type: String,
    pub start: u64,
    pub end: u64,
    pub score: String,
    pub strand: String,
    pub phase: String,
    pub attributes: BTreeMap<String, String>,
}

impl Gff3Feature {
    /// Parse a feature line. Returns `None` (after a warning) when the line
    /// does not have nine columns or integer coordinates.
    pub fn parse_line(line: &str, line_no: usize) -> Option<Self> {
        let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();
        if fields.len() != 9 {
            warn!(line = line_no, columns = fields.len(), "Skipping GFF3 line without 9 columns");
            return None;
        }
        let (Ok(start), Ok(end)) = (fields[3].parse::<u64>(), fields[4].parse::<u64>()) else {
            warn!(line = line_no, "Skipping GFF3 line with non-integer coordinates");
            return None;
        };

        let mut attributes = BTreeMap::new();
        for item in fields[8].split(';') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            match item.split_once('=') {
                Some((key, value)) if !key.is_empty() && !value.contains('=') => {
                    attributes.insert(key.to_string(), value.to_string());
                }
                _ => warn!(line = line_no, item = item, "Unparseable GFF3 attribute"),
            }
        }

        Some(Self {
            seqid: fields[0].to_string(),
            source: fields[1].to_string(),
            feature_type: fields[2].to_string(),
            start,
            end,
            score: fields[5].to_string(),
            strand: fields[6].to_string(),
            phase: fields[7].to_string(),
            attributes,
        })
    }

    /// Distance between the coordinates, independent of their order.
    pub fn length(&self) -> u64 {
        self.end.abs_diff(self.start)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Read the features of a GFF3 file, skipping `#` lines. With `only_types`,
/// features of other types are dropped.
pub fn read_gff3<P: AsRef<Path>>(path: P, only_types: Option<&[&str]>) -> Result<Vec<Gff3Feature>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut features = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(feature) = Gff3Feature::parse_line(&line, i + 1) else {
            continue;
        };
        if only_types.is_some_and(|types| !types.contains(&feature.feature_type.as_str())) {
            continue;
        }
        features.push(feature);
    }
    Ok(features)
}
