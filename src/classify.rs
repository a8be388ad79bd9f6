//! Classification passes
//!
//! Every pass walks the full head-sorted record list, claims the records its
//! predicate accepts, names their family and writes them out. Passes are
//! independent: a record can be claimed by several passes, and each pass
//! works on its own copy of the records it claims.

use crate::config::ClassificationSettings;
use crate::error::{Result, TrevisError};
use crate::family::FamilyTable;
use crate::record::{GffKey, TandemRepeatRecord};
use crate::sequence::BaseCounts;
use crate::stats::round_to;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use tracing::{debug, info};

/// The classification passes, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RepeatClass {
    PerfectMicrosatellite,
    Microsatellite,
    TrueSsr,
    FuzzySsr,
    ComplexTr,
    Band1kb,
    Band3kb,
    Band10kb,
}

const MICRO_KEYS: &[GffKey] = &[GffKey::Id, GffKey::Name, GffKey::Pmatch];
const DETAILED_KEYS: &[GffKey] = &[
    GffKey::Id,
    GffKey::Name,
    GffKey::Pmatch,
    GffKey::Gc,
    GffKey::Length,
    GffKey::Period,
];

impl RepeatClass {
    pub const ALL: [RepeatClass; 8] = [
        RepeatClass::PerfectMicrosatellite,
        RepeatClass::Microsatellite,
        RepeatClass::TrueSsr,
        RepeatClass::FuzzySsr,
        RepeatClass::ComplexTr,
        RepeatClass::Band1kb,
        RepeatClass::Band3kb,
        RepeatClass::Band10kb,
    ];

    /// Name used in the results manifest
    pub fn key(&self) -> &'static str {
        match self {
            RepeatClass::PerfectMicrosatellite => "pmicro",
            RepeatClass::Microsatellite => "micro",
            RepeatClass::TrueSsr => "tSSR",
            RepeatClass::FuzzySsr => "fSSR",
            RepeatClass::ComplexTr => "complex",
            RepeatClass::Band1kb => "1kb",
            RepeatClass::Band3kb => "3kb",
            RepeatClass::Band10kb => "10kb",
        }
    }

    /// Infix used in output file names
    pub fn file_tag(&self) -> &'static str {
        match self {
            RepeatClass::TrueSsr => "tssr",
            RepeatClass::FuzzySsr => "fssr",
            other => other.key(),
        }
    }

    /// Feature type written in the third GFF3 column
    pub fn gff_type(&self) -> &'static str {
        match self {
            RepeatClass::PerfectMicrosatellite => "perfect microsatellite",
            RepeatClass::Microsatellite => "microsatellite",
            RepeatClass::TrueSsr => "tSSR",
            RepeatClass::FuzzySsr => "fSSR",
            _ => "complex TRs",
        }
    }

    /// Attribute keys written on each GFF3 line
    pub fn gff_keys(&self) -> &'static [GffKey] {
        match self {
            RepeatClass::PerfectMicrosatellite => &[GffKey::Id, GffKey::Name],
            RepeatClass::Microsatellite | RepeatClass::TrueSsr | RepeatClass::FuzzySsr => {
                MICRO_KEYS
            }
            _ => DETAILED_KEYS,
        }
    }

    /// Whether the pass writes `(period, gc, pmatch, family)` rows
    pub fn writes_clouds(&self) -> bool {
        matches!(self, RepeatClass::ComplexTr)
    }

    /// Whether the pass writes a FASTA archive of the claimed arrays
    pub fn writes_fasta(&self) -> bool {
        matches!(
            self,
            RepeatClass::Band1kb | RepeatClass::Band3kb | RepeatClass::Band10kb
        )
    }

    /// Filter predicate
    pub fn accepts(&self, record: &TandemRepeatRecord, settings: &ClassificationSettings) -> bool {
        match self {
            RepeatClass::PerfectMicrosatellite => {
                record.period < settings.micro_max_period
                    && record.percent_match == settings.perfect_pmatch
            }
            RepeatClass::Microsatellite => record.period < settings.micro_max_period,
            RepeatClass::TrueSsr => {
                let counts = BaseCounts::of(&record.array);
                counts.a == 0 || counts.c == 0 || counts.g == 0 || counts.t == 0
            }
            RepeatClass::FuzzySsr => !fuzzy_presence(&record.array, settings).all(),
            RepeatClass::ComplexTr => {
                record.consensus.len() > settings.complex_min_consensus_length
                    && record.array_length > settings.complex_min_array_length
                    && record.percent_match < settings.perfect_pmatch
                    && record.array_gc() > settings.complex_min_gc
                    && record.array_gc() < settings.complex_max_gc
                    && record.copy_number > settings.complex_min_copy_number
                    && record.entropy > settings.complex_min_entropy
            }
            RepeatClass::Band1kb => record.array_length > settings.band_1kb,
            RepeatClass::Band3kb => record.array_length > settings.band_3kb,
            RepeatClass::Band10kb => record.array_length > settings.band_10kb,
        }
    }

    /// Set the family label of a claimed record. Complex and band passes keep
    /// whatever label the record already has.
    pub fn assign_family(
        &self,
        record: &mut TandemRepeatRecord,
        settings: &ClassificationSettings,
    ) -> Result<()> {
        let family = match self {
            RepeatClass::PerfectMicrosatellite | RepeatClass::Microsatellite => {
                microsatellite_family(&record.consensus)
            }
            RepeatClass::TrueSsr => {
                let counts = BaseCounts::of(&record.array);
                ssr_label("tSSR", BasePresence::from_counts(&counts), &counts)?
            }
            RepeatClass::FuzzySsr => {
                let counts = BaseCounts::of(&record.array);
                ssr_label("fSSR", fuzzy_presence(&record.array, settings), &counts)?
            }
            _ => return Ok(()),
        };
        record.family = Some(family);
        Ok(())
    }
}

impl fmt::Display for RepeatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// `(CONSENSUS)n` with the consensus upper-cased
pub fn microsatellite_family(consensus: &str) -> String {
    format!("({})n", consensus.to_uppercase())
}

/// Which of the four bases count as present in an array
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasePresence {
    pub a: bool,
    pub c: bool,
    pub g: bool,
    pub t: bool,
}

impl BasePresence {
    pub fn from_counts(counts: &BaseCounts) -> Self {
        Self {
            a: counts.a > 0,
            c: counts.c > 0,
            g: counts.g > 0,
            t: counts.t > 0,
        }
    }

    pub fn all(&self) -> bool {
        self.a && self.c && self.g && self.t
    }
}

/// A base is absent when its frequency over the whole array is below the
/// minimum frequency or it occurs fewer than the minimum count times.
pub fn fuzzy_presence(array: &str, settings: &ClassificationSettings) -> BasePresence {
    let n = array.len();
    if n == 0 {
        return BasePresence::default();
    }
    let counts = BaseCounts::of(array);
    let present = |count: usize| {
        !((count as f64 / n as f64) < settings.fuzzy_min_frequency
            || count < settings.fuzzy_min_count)
    };
    BasePresence {
        a: present(counts.a),
        c: present(counts.c),
        g: present(counts.g),
        t: present(counts.t),
    }
}

/// Composite SSR name from the present bases.
///
/// Branches are tried in a fixed order and the first hit wins; a base and
/// its complement collapse to the same letter. No base present is an error.
pub fn ssr_label(prefix: &str, present: BasePresence, counts: &BaseCounts) -> Result<String> {
    let BasePresence { a, c, g, t } = present;
    let suffix = if (a && c && g) || (t && g && c) {
        "ACG"
    } else if (a && c && t) || (t && g && a) {
        "ACT"
    } else if a && g && t {
        "AGT"
    } else if (a && c) || (t && g) {
        "AC"
    } else if (a && g) || (t && c) {
        "AG"
    } else if a && t {
        "AT"
    } else if c && g {
        "CG"
    } else if c || g {
        "C"
    } else if a || t {
        "A"
    } else {
        return Err(TrevisError::SsrNaming {
            a: counts.a,
            c: counts.c,
            g: counts.g,
            t: counts.t,
        });
    };
    Ok(format!("{}_{}", prefix, suffix))
}

/// Writers one pass sends its output to
pub struct PassSinks<W: Write> {
    pub records: W,
    pub gff: W,
    /// Complex pass only
    pub clouds: Option<W>,
    /// Length bands only
    pub fasta: Option<W>,
}

/// What one pass produced
#[derive(Debug)]
pub struct PassOutcome {
    pub class: RepeatClass,
    /// Records claimed
    pub filtered: usize,
    /// Records examined
    pub dataset: usize,
    /// Summed array length of the claimed records
    pub total_length: u64,
    pub families: FamilyTable,
}

impl PassOutcome {
    pub fn genome_fraction(&self, genome_size: u64) -> Result<f64> {
        genome_fraction(self.total_length, genome_size)
    }
}

/// Percentage of the genome covered, rounded to 3 decimals.
pub fn genome_fraction(total_length: u64, genome_size: u64) -> Result<f64> {
    if genome_size == 0 {
        return Err(TrevisError::config("genome size must be positive"));
    }
    Ok(round_to(100.0 * total_length as f64 / genome_size as f64, 3))
}

/// Run one pass over head-sorted records.
///
/// A failure while naming a record aborts the pass with a
/// [`TrevisError::Classification`] that carries the record's fields.
pub fn run_pass<W: Write>(
    class: RepeatClass,
    records: &[TandemRepeatRecord],
    settings: &ClassificationSettings,
    sinks: &mut PassSinks<W>,
) -> Result<PassOutcome> {
    let mut families = FamilyTable::new();
    let mut filtered = 0usize;
    let mut total_length = 0u64;

    for record in records {
        if !class.accepts(record, settings) {
            continue;
        }
        let mut claimed = record.clone();
        class
            .assign_family(&mut claimed, settings)
            .map_err(|source| TrevisError::Classification {
                pass: class.key().to_string(),
                head: record.head.clone(),
                id: record.id,
                consensus: record.consensus.clone(),
                array: record.array.clone(),
                source: Box::new(source),
            })?;

        filtered += 1;
        total_length += claimed.array_length;

        write!(sinks.records, "{}", claimed)?;
        sinks
            .gff
            .write_all(claimed.to_gff3(class.gff_type(), class.gff_keys()).as_bytes())?;
        if let Some(clouds) = sinks.clouds.as_mut() {
            writeln!(
                clouds,
                "{}\t{}\t{}\t{}",
                claimed.period,
                claimed.array_gc(),
                claimed.percent_match,
                claimed.family_label()
            )?;
        }
        if let Some(fasta) = sinks.fasta.as_mut() {
            fasta.write_all(claimed.to_fasta().as_bytes())?;
        }
        families.add_record(&claimed);
    }

    debug!(pass = %class, families = families.len(), "Pass families collected");
    info!(
        pass = %class,
        selected = filtered,
        dataset = records.len(),
        total_length = total_length,
        "Classification pass finished"
    );
    Ok(PassOutcome {
        class,
        filtered,
        dataset: records.len(),
        total_length,
        families,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ClassificationSettings {
        ClassificationSettings::default()
    }

    fn record(id: u64, period: u32, pmatch: f64, consensus: &str, array: &str) -> TandemRepeatRecord {
        TandemRepeatRecord {
            project: "test".to_string(),
            id,
            head: "chr1".to_string(),
            left_index: 1,
            right_index: array.len() as u64,
            period,
            copy_number: array.len() as f64 / period as f64,
            percent_match: pmatch,
            entropy: crate::sequence::shannon_entropy(array),
            consensus: consensus.to_string(),
            array: array.to_string(),
            array_gc_percent: 100.0 * crate::sequence::gc_content(array),
            array_length: array.len() as u64,
            ..TandemRepeatRecord::default()
        }
    }

    fn label(prefix: &str, bases: &str) -> String {
        let present = BasePresence {
            a: bases.contains('A'),
            c: bases.contains('C'),
            g: bases.contains('G'),
            t: bases.contains('T'),
        };
        ssr_label(prefix, present, &BaseCounts::default()).unwrap()
    }

    #[test]
    fn test_ssr_label_precedence() {
        assert_eq!(label("tSSR", "ACG"), "tSSR_ACG");
        assert_eq!(label("tSSR", "CGT"), "tSSR_ACG");
        assert_eq!(label("tSSR", "ACT"), "tSSR_ACT");
        assert_eq!(label("tSSR", "AGT"), "tSSR_ACT");
        assert_eq!(label("tSSR", "AC"), "tSSR_AC");
        assert_eq!(label("tSSR", "GT"), "tSSR_AC");
        assert_eq!(label("tSSR", "AG"), "tSSR_AG");
        assert_eq!(label("tSSR", "CT"), "tSSR_AG");
        assert_eq!(label("tSSR", "AT"), "tSSR_AT");
        assert_eq!(label("tSSR", "CG"), "tSSR_CG");
        assert_eq!(label("fSSR", "G"), "fSSR_C");
        assert_eq!(label("fSSR", "T"), "fSSR_A");
    }

    #[test]
    fn test_ssr_label_without_bases_fails() {
        let err = ssr_label("tSSR", BasePresence::default(), &BaseCounts::default()).unwrap_err();
        assert!(matches!(err, TrevisError::SsrNaming { .. }));
    }

    #[test]
    fn test_microsatellite_predicates() {
        let s = settings();
        let perfect = record(1, 2, 100.0, "at", "ATATATAT");
        let imperfect = record(2, 3, 95.0, "ATG", "ATGATGATC");
        let long = record(3, 6, 100.0, "AAAAAC", "AAAAACAAAAAC");

        assert!(RepeatClass::PerfectMicrosatellite.accepts(&perfect, &s));
        assert!(!RepeatClass::PerfectMicrosatellite.accepts(&imperfect, &s));
        assert!(RepeatClass::Microsatellite.accepts(&perfect, &s));
        assert!(RepeatClass::Microsatellite.accepts(&imperfect, &s));
        assert!(!RepeatClass::Microsatellite.accepts(&long, &s));

        let mut claimed = perfect.clone();
        RepeatClass::Microsatellite.assign_family(&mut claimed, &s).unwrap();
        assert_eq!(claimed.family.as_deref(), Some("(AT)n"));
    }

    #[test]
    fn test_true_ssr_naming() {
        let s = settings();
        let mut r = record(1, 5, 90.0, "ATGCA", "ATGAATGAATGA");
        assert!(RepeatClass::TrueSsr.accepts(&r, &s));
        RepeatClass::TrueSsr.assign_family(&mut r, &s).unwrap();
        assert_eq!(r.family.as_deref(), Some("tSSR_ACT"));

        let all_bases = record(2, 4, 90.0, "ACGT", "ACGTACGT");
        assert!(!RepeatClass::TrueSsr.accepts(&all_bases, &s));
    }

    #[test]
    fn test_fuzzy_ssr() {
        let s = settings();
        // C occurs once: below the minimum count
        let array = "AAAATTTTGGGGC";
        let mut r = record(1, 13, 90.0, array, array);
        assert!(RepeatClass::FuzzySsr.accepts(&r, &s));
        RepeatClass::FuzzySsr.assign_family(&mut r, &s).unwrap();
        assert_eq!(r.family.as_deref(), Some("fSSR_ACT"));

        let rich = "AAAACCCCGGGGTTTT";
        assert!(!RepeatClass::FuzzySsr.accepts(&record(2, 16, 90.0, rich, rich), &s));
    }

    #[test]
    fn test_empty_array_is_fatal() {
        let s = settings();
        let mut r = record(1, 2, 100.0, "AT", "");
        assert!(RepeatClass::TrueSsr.accepts(&r, &s));
        assert!(RepeatClass::TrueSsr.assign_family(&mut r, &s).is_err());
        assert!(RepeatClass::FuzzySsr.accepts(&r, &s));
        assert!(RepeatClass::FuzzySsr.assign_family(&mut r, &s).is_err());
    }

    #[test]
    fn test_complex_predicate_keeps_family() {
        let s = settings();
        let array = "ACGTTGCAAGCT".repeat(10);
        let mut r = record(1, 12, 95.0, "ACGTTGCAAGCT", &array);
        r.family = Some("AACGTTGCAGCT".to_string());
        assert!(RepeatClass::ComplexTr.accepts(&r, &s));
        RepeatClass::ComplexTr.assign_family(&mut r, &s).unwrap();
        assert_eq!(r.family.as_deref(), Some("AACGTTGCAGCT"));

        let mut perfect = r.clone();
        perfect.percent_match = 100.0;
        assert!(!RepeatClass::ComplexTr.accepts(&perfect, &s));

        let mut low_copy = r.clone();
        low_copy.copy_number = 4.0;
        assert!(!RepeatClass::ComplexTr.accepts(&low_copy, &s));
    }

    #[test]
    fn test_length_bands() {
        let s = settings();
        let mut r = record(1, 2, 90.0, "AT", "AT");
        r.array_length = 3001;
        assert!(RepeatClass::Band1kb.accepts(&r, &s));
        assert!(RepeatClass::Band3kb.accepts(&r, &s));
        assert!(!RepeatClass::Band10kb.accepts(&r, &s));
        r.array_length = 1000;
        assert!(!RepeatClass::Band1kb.accepts(&r, &s));
    }

    #[test]
    fn test_run_pass_counts_and_outputs() {
        let s = settings();
        let records = vec![
            record(1, 2, 100.0, "AT", "ATATATAT"),
            record(2, 3, 95.0, "ATG", "ATGATGATC"),
            record(3, 2, 100.0, "AT", "ATATAT"),
            record(4, 8, 90.0, "ACGTACGA", "ACGTACGAACGTACGA"),
        ];
        let mut sinks = PassSinks {
            records: Vec::new(),
            gff: Vec::new(),
            clouds: None,
            fasta: None,
        };
        let outcome = run_pass(RepeatClass::Microsatellite, &records, &s, &mut sinks).unwrap();

        assert_eq!(outcome.filtered, 3);
        assert_eq!(outcome.dataset, 4);
        assert_eq!(outcome.total_length, 23);
        assert_eq!(outcome.families.total_records(), outcome.filtered);
        assert_eq!(outcome.families.get("(AT)n").unwrap().n, 2);
        assert_eq!(outcome.genome_fraction(1000).unwrap(), 2.3);

        let gff = String::from_utf8(sinks.gff).unwrap();
        assert_eq!(gff.lines().count(), 3);
        assert!(gff.starts_with("chr1\tTrevis\tmicrosatellite\t1\t8\t1000\t.\t.\tid=1;name=(AT)n;pmatch=100\n"));
        let trf = String::from_utf8(sinks.records).unwrap();
        assert_eq!(trf.lines().count(), 3);

        // the input records are not mutated
        assert!(records.iter().all(|r| r.family.is_none()));
    }

    #[test]
    fn test_run_pass_writes_clouds_and_fasta() {
        let s = settings();
        let array = "ACGTTGCAAGCT".repeat(100);
        let mut r = record(7, 12, 95.0, "ACGTTGCAAGCT", &array);
        r.family = Some("F1".to_string());

        let mut sinks = PassSinks {
            records: Vec::new(),
            gff: Vec::new(),
            clouds: Some(Vec::new()),
            fasta: Some(Vec::new()),
        };
        let outcome = run_pass(RepeatClass::Band1kb, &[r], &s, &mut sinks).unwrap();
        assert_eq!(outcome.filtered, 1);
        let fasta = String::from_utf8(sinks.fasta.unwrap()).unwrap();
        assert!(fasta.starts_with(">7 F1\nACGT"));
        let clouds = String::from_utf8(sinks.clouds.unwrap()).unwrap();
        assert_eq!(clouds, "12\t0.5\t95\tF1\n");
    }

    #[test]
    fn test_run_pass_error_names_record() {
        let s = settings();
        let records = vec![record(9, 2, 100.0, "AT", "")];
        let mut sinks = PassSinks {
            records: Vec::new(),
            gff: Vec::new(),
            clouds: None,
            fasta: None,
        };
        let err = run_pass(RepeatClass::TrueSsr, &records, &s, &mut sinks).unwrap_err();
        match err {
            TrevisError::Classification { pass, id, consensus, .. } => {
                assert_eq!(pass, "tSSR");
                assert_eq!(id, 9);
                assert_eq!(consensus, "AT");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_genome_fraction() {
        assert_eq!(genome_fraction(600, 1_000_000).unwrap(), 0.06);
        assert_eq!(genome_fraction(1, 3).unwrap(), 33.333);
        assert_eq!(genome_fraction(0, 10).unwrap(), 0.0);
        assert_eq!(genome_fraction(1, 1_600).unwrap(), 0.062);
        assert!(genome_fraction(1, 0).is_err());
    }
}
