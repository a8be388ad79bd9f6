//! Genome assembly loading
//!
//! Contigs are read with needletail, normalized to upper case (non-ACGTN
//! symbols become `N`) and kept in file order. The total length is the
//! reference size used for genome fractions.

use crate::error::{Result, TrevisError};
use needletail::{parse_fastx_file, Sequence};
use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info};

/// Contig identifier, the contig's position in the FASTA file
pub type ContigId = u32;

/// One assembled sequence
#[derive(Debug, Clone)]
pub struct Contig {
    pub name: String,
    pub sequence: Vec<u8>,
}

impl Contig {
    pub fn len(&self) -> u64 {
        self.sequence.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Bases in a 0-based half-open range, or `None` when the range is empty or
    /// runs past the contig end.
    pub fn slice(&self, range: Range<u64>) -> Option<&[u8]> {
        if range.start >= range.end || range.end > self.len() {
            return None;
        }
        self.sequence.get(range.start as usize..range.end as usize)
    }
}

/// A genome assembly with contigs in file order
#[derive(Debug, Default)]
pub struct Assembly {
    contigs: Vec<Contig>,
    name_to_id: HashMap<String, ContigId>,
    total_size: u64,
}

impl Assembly {
    /// Load every contig of a FASTA file.
    ///
    /// Contig names are the first whitespace-separated word of the header.
    /// Empty records are skipped; a repeated name or a file with no sequence
    /// is an error.
    pub fn from_fasta<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = parse_fastx_file(path)?;
        let mut assembly = Assembly::default();
        let mut record_no = 0usize;

        while let Some(record) = reader.next() {
            let record = record?;
            record_no += 1;

            let header = String::from_utf8_lossy(record.id());
            let name = contig_name(&header);
            let sequence = record.normalize(false).into_owned();
            if sequence.is_empty() {
                debug!(contig = %name, "Skipping empty contig");
                continue;
            }
            if assembly.name_to_id.contains_key(&name) {
                return Err(TrevisError::invalid_fasta(
                    record_no,
                    format!("Duplicate contig name: {}", name),
                ));
            }

            let id = assembly.contigs.len() as ContigId;
            assembly.total_size += sequence.len() as u64;
            assembly.name_to_id.insert(name.clone(), id);
            assembly.contigs.push(Contig { name, sequence });
        }

        if assembly.contigs.is_empty() {
            return Err(TrevisError::invalid_fasta(0, "No valid sequences found in FASTA file"));
        }

        info!(
            path = %path.display(),
            contigs = assembly.contigs.len(),
            total_size = assembly.total_size,
            "Assembly loaded"
        );
        Ok(assembly)
    }

    pub fn contig_id(&self, name: &str) -> Option<ContigId> {
        self.name_to_id.get(name).copied()
    }

    pub fn contig(&self, name: &str) -> Option<&Contig> {
        self.contig_id(name)
            .and_then(|id| self.contigs.get(id as usize))
    }

    /// Total assembly length in bases
    pub fn len(&self) -> u64 {
        self.total_size
    }

    pub fn is_empty(&self) -> bool {
        self.total_size == 0
    }

    pub fn num_contigs(&self) -> usize {
        self.contigs.len()
    }

    pub fn contigs(&self) -> impl Iterator<Item = (ContigId, &Contig)> {
        self.contigs
            .iter()
            .enumerate()
            .map(|(id, contig)| (id as ContigId, contig))
    }
}

fn contig_name(header: &str) -> String {
    header
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}
