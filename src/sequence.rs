//! Nucleotide sequence helpers shared by the canonicalizer, the k-mer
//! indexer and the classification passes.

use std::collections::BTreeSet;

/// Complement of a single symbol, or `None` for symbols without a partner.
///
/// Case is preserved. `~` pairs with itself and `[`/`]` pair with each other;
/// they are placeholders written by upstream tools.
pub fn complement(symbol: char) -> Option<char> {
    match symbol {
        'A' => Some('T'),
        'T' => Some('A'),
        'C' => Some('G'),
        'G' => Some('C'),
        'N' => Some('N'),
        'a' => Some('t'),
        't' => Some('a'),
        'c' => Some('g'),
        'g' => Some('c'),
        'n' => Some('n'),
        '~' => Some('~'),
        '[' => Some(']'),
        ']' => Some('['),
        _ => None,
    }
}

/// Reverse complement. Symbols without a complement (including `-` and
/// IUPAC ambiguity codes) are dropped from the output.
pub fn reverse_complement(seq: &str) -> String {
    seq.chars().rev().filter_map(complement).collect()
}

/// All distinct cyclic rotations of `seq`, sorted.
pub fn rotations(seq: &str) -> BTreeSet<String> {
    let bytes = seq.as_bytes();
    let mut shifts = BTreeSet::new();
    for i in 0..bytes.len() {
        let mut rotated = Vec::with_capacity(bytes.len());
        rotated.extend_from_slice(&bytes[i..]);
        rotated.extend_from_slice(&bytes[..i]);
        shifts.insert(String::from_utf8_lossy(&rotated).into_owned());
    }
    shifts
}

/// Fraction of G and C symbols over the full length (0 for an empty sequence).
pub fn gc_content(seq: &str) -> f64 {
    if seq.is_empty() {
        return 0.0;
    }
    let gc = seq
        .bytes()
        .filter(|b| matches!(b, b'G' | b'g' | b'C' | b'c'))
        .count();
    gc as f64 / seq.len() as f64
}

/// GC content as an integer percentage, used to bucket monomers.
pub fn int_gc(seq: &str) -> u32 {
    (100.0 * gc_content(seq)).round() as u32
}

/// Case-insensitive counts of the four standard bases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaseCounts {
    pub a: usize,
    pub c: usize,
    pub g: usize,
    pub t: usize,
}

impl BaseCounts {
    pub fn of(seq: &str) -> Self {
        let mut counts = Self::default();
        for b in seq.bytes() {
            match b {
                b'A' | b'a' => counts.a += 1,
                b'C' | b'c' => counts.c += 1,
                b'G' | b'g' => counts.g += 1,
                b'T' | b't' => counts.t += 1,
                _ => {}
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.a + self.c + self.g + self.t
    }
}

/// Shannon entropy (bits) of the A/C/G/T composition; other symbols are ignored.
pub fn shannon_entropy(seq: &str) -> f64 {
    let counts = BaseCounts::of(seq);
    let total = counts.total();
    if total == 0 {
        return 0.0;
    }
    let mut entropy = 0.0;
    for count in [counts.a, counts.c, counts.g, counts.t] {
        if count > 0 {
            let p = count as f64 / total as f64;
            entropy -= p * p.log2();
        }
    }
    entropy
}
