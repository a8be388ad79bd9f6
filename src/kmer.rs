//! K-mer term and document frequency indexing over repeat arrays
//!
//! Each array is one document. Windows containing `N` are not counted.
//! Per-document tables are built in parallel and summed with a rayon
//! reduce; the canonical merge and the final sort run once the reduce
//! has produced the complete tables.

use crate::error::{Result, TrevisError};
use crate::record::TandemRepeatRecord;
use crate::sequence::reverse_complement;
use ahash::{AHashMap, AHashSet};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{debug, info};

/// Minimum supported k-mer length
pub const MIN_K: usize = 1;

/// Maximum supported k-mer length
pub const MAX_K: usize = 1024;

/// Default k used for the microsatellite index
pub const DEFAULT_K: usize = 23;

/// Sliding windows of length `n` over a text, yielding `(position, window)`.
///
/// Cheap to clone; a clone replays the remaining windows.
#[derive(Debug, Clone)]
pub struct Ngrams<'a> {
    text: &'a str,
    n: usize,
    /// Byte offset of the next window
    pos: usize,
    /// Character index of the next window
    index: usize,
    remaining: usize,
}

/// Lazy windows of `n` characters, paired with the character index they
/// start at. Yields `len - n + 1` items, none when `n` is 0 or longer than
/// the text.
pub fn ngrams(text: &str, n: usize) -> Ngrams<'_> {
    let chars = text.chars().count();
    let remaining = if n == 0 { 0 } else { (chars + 1).saturating_sub(n) };
    Ngrams {
        text,
        n,
        pos: 0,
        index: 0,
        remaining,
    }
}

impl<'a> Iterator for Ngrams<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let rest = &self.text[self.pos..];
        let end = rest
            .char_indices()
            .nth(self.n)
            .map_or(rest.len(), |(offset, _)| offset);
        let step = rest.chars().next().map_or(0, char::len_utf8);
        let item = (self.index, &rest[..end]);
        self.pos += step;
        self.index += 1;
        self.remaining -= 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Ngrams<'_> {}

/// Term and document frequency tables for one corpus.
#[derive(Debug, Clone, Default)]
pub struct KmerCounts {
    /// Every occurrence
    pub tf: AHashMap<String, u64>,
    /// Number of documents containing the k-mer
    pub df: AHashMap<String, u64>,
    /// Per k-mer `(document id, occurrences)`, only when document tracking is on
    pub documents: Option<AHashMap<String, Vec<(usize, u64)>>>,
}

impl KmerCounts {
    fn for_document(doc_id: usize, text: &str, k: usize, track_documents: bool) -> Self {
        let mut tf: AHashMap<String, u64> = AHashMap::new();
        for (_, window) in ngrams(text, k) {
            if window.contains('N') {
                continue;
            }
            *tf.entry(window.to_string()).or_insert(0) += 1;
        }
        let df = tf.keys().map(|kmer| (kmer.clone(), 1)).collect();
        let documents = track_documents.then(|| {
            tf.iter()
                .map(|(kmer, &count)| (kmer.clone(), vec![(doc_id, count)]))
                .collect()
        });
        Self { tf, df, documents }
    }

    fn merge(mut self, other: Self) -> Self {
        for (kmer, count) in other.tf {
            *self.tf.entry(kmer).or_insert(0) += count;
        }
        for (kmer, count) in other.df {
            *self.df.entry(kmer).or_insert(0) += count;
        }
        self.documents = match (self.documents, other.documents) {
            (Some(mut mine), Some(theirs)) => {
                for (kmer, docs) in theirs {
                    mine.entry(kmer).or_default().extend(docs);
                }
                Some(mine)
            }
            (mine, theirs) => mine.or(theirs),
        };
        self
    }

    pub fn unique_kmers(&self) -> usize {
        self.tf.len()
    }
}

fn check_k(k: usize) -> Result<()> {
    if !(MIN_K..=MAX_K).contains(&k) {
        return Err(TrevisError::invalid_kmer_length(k, MIN_K, MAX_K));
    }
    Ok(())
}

/// Count k-mers over a corpus. Input is upper-cased before counting.
pub fn term_and_doc_frequency<S>(corpus: &[S], k: usize, track_documents: bool) -> Result<KmerCounts>
where
    S: AsRef<str> + Sync,
{
    check_k(k)?;
    let counts = corpus
        .par_iter()
        .enumerate()
        .map(|(doc_id, text)| {
            let text = text.as_ref().to_ascii_uppercase();
            KmerCounts::for_document(doc_id, &text, k, track_documents)
        })
        .reduce(KmerCounts::default, KmerCounts::merge);

    let counts = if track_documents && counts.documents.is_none() {
        KmerCounts {
            documents: Some(AHashMap::new()),
            ..counts
        }
    } else {
        counts
    };
    debug!(
        documents = corpus.len(),
        unique_kmers = counts.unique_kmers(),
        "K-mer frequencies counted"
    );
    Ok(counts)
}

/// One k-mer and its reverse complement counted together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KmerIndexEntry {
    /// Lexicographically smaller member of the pair
    pub kmer: String,
    pub reverse_complement: String,
    pub tf: u64,
    pub df: u64,
    pub doc_ids: Option<Vec<usize>>,
    pub doc_freqs: Option<Vec<u64>>,
}

/// Merge each k-mer with its reverse complement.
///
/// A palindromic k-mer is its own partner and is counted once. Entries with
/// merged `df <= cutoff` are dropped. The result is sorted by descending df,
/// then by k-mer.
pub fn canonical_merge(counts: &KmerCounts, cutoff: Option<u64>) -> Vec<KmerIndexEntry> {
    let mut keys: Vec<&String> = counts.tf.keys().collect();
    keys.sort_unstable();

    let mut visited: AHashSet<String> = AHashSet::with_capacity(keys.len());
    let mut entries = Vec::new();
    for kmer in keys {
        if visited.contains(kmer.as_str()) {
            continue;
        }
        let rev = reverse_complement(kmer);
        visited.insert(kmer.clone());
        visited.insert(rev.clone());

        let partner = (rev != *kmer).then_some(rev.as_str());
        let lookup = |table: &AHashMap<String, u64>| {
            table.get(kmer.as_str()).copied().unwrap_or(0)
                + partner.and_then(|p| table.get(p)).copied().unwrap_or(0)
        };
        let tf = lookup(&counts.tf);
        let df = lookup(&counts.df);
        if cutoff.is_some_and(|c| df <= c) {
            continue;
        }

        let (doc_ids, doc_freqs) = match &counts.documents {
            Some(documents) => {
                let mut per_doc: Vec<(usize, u64)> = Vec::new();
                for key in std::iter::once(kmer.as_str()).chain(partner) {
                    if let Some(docs) = documents.get(key) {
                        per_doc.extend(docs.iter().copied());
                    }
                }
                per_doc.sort_unstable_by_key(|&(doc, _)| doc);
                let mut merged: Vec<(usize, u64)> = Vec::with_capacity(per_doc.len());
                for (doc, freq) in per_doc {
                    match merged.last_mut() {
                        Some(last) if last.0 == doc => last.1 += freq,
                        _ => merged.push((doc, freq)),
                    }
                }
                let (ids, freqs): (Vec<usize>, Vec<u64>) = merged.into_iter().unzip();
                (Some(ids), Some(freqs))
            }
            None => (None, None),
        };

        let (small, large) = if rev < *kmer {
            (rev, kmer.clone())
        } else {
            (kmer.clone(), rev)
        };
        entries.push(KmerIndexEntry {
            kmer: small,
            reverse_complement: large,
            tf,
            df,
            doc_ids,
            doc_freqs,
        });
    }
    entries.sort_by(|a, b| b.df.cmp(&a.df).then_with(|| a.kmer.cmp(&b.kmer)));
    entries
}

/// Compressed length over raw length using zlib. Lower means more repetitive.
/// An empty sequence has complexity 0.
pub fn complexity(seq: &str) -> Result<f64> {
    if seq.is_empty() {
        return Ok(0.0);
    }
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(seq.len()), Compression::default());
    encoder.write_all(seq.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(compressed.len() as f64 / seq.len() as f64)
}

/// Builds a k-mer index over record arrays.
#[derive(Debug, Clone)]
pub struct KmerIndexer {
    k: usize,
    cutoff: Option<u64>,
    min_complexity: Option<f64>,
    max_complexity: Option<f64>,
    track_documents: bool,
}

impl KmerIndexer {
    pub fn new(k: usize) -> Result<Self> {
        check_k(k)?;
        Ok(Self {
            k,
            cutoff: None,
            min_complexity: None,
            max_complexity: None,
            track_documents: false,
        })
    }

    pub fn cutoff(mut self, cutoff: Option<u64>) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn complexity_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_complexity = min;
        self.max_complexity = max;
        self
    }

    pub fn track_documents(mut self, track: bool) -> Self {
        self.track_documents = track;
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn within_complexity(&self, value: f64) -> bool {
        self.min_complexity.is_none_or(|min| value >= min)
            && self.max_complexity.is_none_or(|max| value <= max)
    }

    /// Index the arrays of `records`. Document ids are positions in `records`;
    /// arrays outside the complexity bounds contribute nothing.
    pub fn index_records(&self, records: &[TandemRepeatRecord]) -> Result<Vec<KmerIndexEntry>> {
        let check_complexity = self.min_complexity.is_some() || self.max_complexity.is_some();
        let mut corpus: Vec<&str> = Vec::with_capacity(records.len());
        let mut skipped = 0usize;
        for record in records {
            if check_complexity && !self.within_complexity(complexity(&record.array)?) {
                corpus.push("");
                skipped += 1;
            } else {
                corpus.push(record.array.as_str());
            }
        }

        let counts = term_and_doc_frequency(&corpus, self.k, self.track_documents)?;
        let entries = canonical_merge(&counts, self.cutoff);
        info!(
            k = self.k,
            documents = records.len(),
            skipped = skipped,
            entries = entries.len(),
            "K-mer index built"
        );
        Ok(entries)
    }
}

fn join_numbers<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Write an index as `kmer\trev_kmer\ttf\tdf`, plus comma-joined document
/// ids and frequencies when they were tracked.
pub fn write_kmer_index<W: Write>(entries: &[KmerIndexEntry], writer: &mut W) -> Result<()> {
    for entry in entries {
        write!(
            writer,
            "{}\t{}\t{}\t{}",
            entry.kmer, entry.reverse_complement, entry.tf, entry.df
        )?;
        if let (Some(ids), Some(freqs)) = (&entry.doc_ids, &entry.doc_freqs) {
            write!(writer, "\t{}\t{}", join_numbers(ids), join_numbers(freqs))?;
        }
        writeln!(writer)?;
    }
    Ok(())
}
