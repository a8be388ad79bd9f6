//! Consensus canonicalization
//!
//! Collapses consensus monomers that describe the same repeat: cyclic
//! rotations, rotations of the reverse complement, and whole-copy multimers
//! of either. Every equivalence class is represented by the lexicographically
//! smallest variant of its shortest member.
//!
//! Monomers are bucketed by length and integer GC percentage. Rotations and
//! reverse complements never change GC, and a multimer of a unit has the
//! same GC fraction as the unit, so bucketing cannot separate equivalent
//! sequences.

use crate::error::{Result, TrevisError};
use crate::record::TandemRepeatRecord;
use crate::sequence::{int_gc, reverse_complement, rotations};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Longest multimer considered when collapsing (the repeat finder reports
/// consensus patterns up to 2000 bp).
pub const MAX_MULTIMER_LENGTH: usize = 2020;

/// Every variant a monomer can appear as: its rotations and the rotations
/// of its reverse complement.
pub fn variants(monomer: &str) -> BTreeSet<String> {
    let mut all = rotations(monomer);
    all.extend(rotations(&reverse_complement(monomer)));
    all
}

/// Smallest variant of a single monomer, ignoring multimer structure.
pub fn canonical_representative(monomer: &str) -> Result<String> {
    variants(monomer)
        .into_iter()
        .next()
        .ok_or_else(|| TrevisError::InvalidMonomer(monomer.to_string()))
}

/// Mapping from raw consensus strings to their canonical representative
#[derive(Debug, Clone, Default)]
pub struct ConsensusRenameMap {
    rules: AHashMap<String, String>,
}

impl ConsensusRenameMap {
    /// Representative for `consensus`, if the map covers it.
    pub fn get(&self, consensus: &str) -> Option<&str> {
        self.rules.get(consensus).map(String::as_str)
    }

    /// Representative for `consensus`; a missing entry is an error.
    pub fn resolve(&self, consensus: &str) -> Result<&str> {
        self.get(consensus)
            .ok_or_else(|| TrevisError::UnmappedConsensus {
                consensus: consensus.to_string(),
                length: consensus.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules sorted by raw consensus.
    pub fn sorted_rules(&self) -> Vec<(&str, &str)> {
        let mut rules: Vec<(&str, &str)> = self
            .rules
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        rules.sort_unstable();
        rules
    }
}

/// A canonical representative and the number of occurrences it absorbed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalFamily {
    pub representative: String,
    pub count: usize,
}

/// Build the rename map over a set of monomers.
///
/// Monomers are visited shortest first. Each unvisited monomer claims every
/// same-bucket sequence of length `base`, `2*base`, ... up to
/// [`MAX_MULTIMER_LENGTH`] that consists of identical `base`-sized chunks
/// whose chunk is one of the monomer's variants.
pub fn build_rename_map<I, S>(monomers: I) -> Result<ConsensusRenameMap>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let distinct: BTreeSet<String> = monomers
        .into_iter()
        .map(|m| m.as_ref().to_string())
        .collect();
    let mut consensuses: Vec<String> = distinct.into_iter().collect();
    consensuses.sort_by_key(|m| m.len());

    // length -> GC% -> indices into `consensuses`
    let mut buckets: BTreeMap<usize, BTreeMap<u32, Vec<usize>>> = BTreeMap::new();
    for (i, monomer) in consensuses.iter().enumerate() {
        buckets
            .entry(monomer.len())
            .or_default()
            .entry(int_gc(monomer))
            .or_default()
            .push(i);
    }

    let mut rules: AHashMap<String, String> = AHashMap::with_capacity(consensuses.len());
    for monomer in &consensuses {
        if rules.contains_key(monomer) {
            continue;
        }
        let variants = variants(monomer);
        let lex_representative = match variants.iter().next() {
            Some(v) => v.clone(),
            None => return Err(TrevisError::InvalidMonomer(monomer.clone())),
        };
        let base = monomer.len();
        let gc = int_gc(monomer);

        let mut multiple_len = base;
        while multiple_len <= MAX_MULTIMER_LENGTH {
            if let Some(candidates) = buckets.get(&multiple_len).and_then(|by_gc| by_gc.get(&gc)) {
                for &k in candidates {
                    let other = &consensuses[k];
                    if rules.contains_key(other) {
                        continue;
                    }
                    if let Some(unit) = repeated_unit(other, base) {
                        if variants.contains(unit) {
                            rules.insert(other.clone(), lex_representative.clone());
                        }
                    }
                }
            }
            multiple_len += base;
        }
    }

    debug!(
        monomers = consensuses.len(),
        rules = rules.len(),
        "Consensus rename map built"
    );
    Ok(ConsensusRenameMap { rules })
}

/// The chunk `seq` is made of when it is a whole number of identical
/// `base`-sized chunks.
fn repeated_unit(seq: &str, base: usize) -> Option<&str> {
    if base == 0 || seq.len() % base != 0 || !seq.is_char_boundary(base) {
        return None;
    }
    let bytes = seq.as_bytes();
    let unit = &bytes[..base];
    if bytes.chunks(base).all(|chunk| chunk == unit) {
        Some(&seq[..base])
    } else {
        None
    }
}

/// Rank representatives by how many input occurrences resolved to them.
fn rank_families<'a, I>(map: &ConsensusRenameMap, monomers: I) -> Result<Vec<CanonicalFamily>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut order: Vec<CanonicalFamily> = Vec::new();
    let mut index: AHashMap<String, usize> = AHashMap::new();
    for monomer in monomers {
        let representative = map.resolve(monomer)?;
        match index.get(representative) {
            Some(&i) => order[i].count += 1,
            None => {
                index.insert(representative.to_string(), order.len());
                order.push(CanonicalFamily {
                    representative: representative.to_string(),
                    count: 1,
                });
            }
        }
    }
    // stable: ties keep first-encounter order
    order.sort_by(|a, b| b.count.cmp(&a.count));
    Ok(order)
}

/// Canonicalize a corpus of monomers (duplicates allowed).
///
/// Returns the rename map and the representatives ranked by descending
/// occurrence count.
pub fn canonicalize_corpus<S: AsRef<str>>(
    monomers: &[S],
) -> Result<(ConsensusRenameMap, Vec<CanonicalFamily>)> {
    let map = build_rename_map(monomers.iter().map(|m| m.as_ref()))?;
    let ranked = rank_families(&map, monomers.iter().map(|m| m.as_ref()))?;
    Ok((map, ranked))
}

/// Canonicalize the consensus sequences of a record set.
///
/// Records without a family get the representative as their family label;
/// existing labels are left alone. The consensus itself is not rewritten.
pub fn apply_to_records(
    records: &mut [TandemRepeatRecord],
) -> Result<(ConsensusRenameMap, Vec<CanonicalFamily>)> {
    let map = build_rename_map(records.iter().map(|r| r.consensus.as_str()))?;
    let ranked = rank_families(&map, records.iter().map(|r| r.consensus.as_str()))?;

    let mut assigned = 0usize;
    for record in records.iter_mut() {
        let representative = map.resolve(&record.consensus)?;
        if record.family.is_none() {
            record.family = Some(representative.to_string());
            assigned += 1;
        }
    }

    info!(
        records = records.len(),
        families = ranked.len(),
        assigned = assigned,
        "Canonical families assigned"
    );
    Ok((map, ranked))
}
