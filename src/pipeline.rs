//! Classification run orchestration
//!
//! A run loads and head-sorts the records once, optionally labels them by
//! canonical consensus, then executes every pass in order against one
//! [`RunContext`]. Each pass writes through [`AtomicOutput`]s and only
//! commits its files once the pass and its report have succeeded.

use crate::bed::{extracted_fasta, parse_bed, records_from_bed};
use crate::canonical::{self, CanonicalFamily, ConsensusRenameMap};
use crate::classify::{run_pass, PassSinks, RepeatClass};
use crate::config::{KmerSettings, TrevisConfig};
use crate::error::Result;
use crate::genome::Assembly;
use crate::kmer::{write_kmer_index, KmerIndexEntry, KmerIndexer};
use crate::manifest::{ClassResult, RunContext};
use crate::output::{write_gff3_header, AtomicOutput, OutputLayout};
use crate::record::{load_sorted_records, TandemRepeatRecord, TrfFile};
use crate::summary::{micro_summary, write_summary};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, instrument};

/// Builder for a [`Pipeline`], starting from a loaded configuration.
pub struct PipelineBuilder {
    config: TrevisConfig,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: TrevisConfig::default(),
        }
    }

    pub fn config(mut self, config: TrevisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output.output_dir = dir.into();
        self
    }

    pub fn dataset(mut self, dataset: impl Into<String>) -> Self {
        self.config.output.dataset = dataset.into();
        self
    }

    pub fn genome_size(mut self, genome_size: u64) -> Self {
        self.config.genome_size = genome_size;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.config.kmers.threads = threads;
        self
    }

    pub fn kmer_length(mut self, k: usize) -> Self {
        self.config.kmers.k = k;
        self
    }

    pub fn kmers(mut self, enabled: bool) -> Self {
        self.config.kmers.enabled = enabled;
        self
    }

    /// Validate the configuration and build the pipeline.
    pub fn build(self) -> Result<Pipeline> {
        self.config.check()?;
        Ok(Pipeline {
            config: self.config,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Pipeline {
    config: TrevisConfig,
}

impl Pipeline {
    pub fn with_config(config: TrevisConfig) -> Result<Self> {
        PipelineBuilder::new().config(config).build()
    }

    pub fn config(&self) -> &TrevisConfig {
        &self.config
    }

    /// Output layout for an input file.
    pub fn layout(&self, input: &Path) -> OutputLayout {
        OutputLayout::for_input(
            &self.config.output.output_dir,
            input,
            self.config.output.dataset.clone(),
        )
    }

    /// Classify every record of a TRF file and write all outputs.
    #[instrument(skip_all, fields(input = %input.as_ref().display()))]
    pub fn run<P: AsRef<Path>>(&self, input: P) -> Result<RunContext> {
        let input = input.as_ref();
        let started = Instant::now();
        let layout = self.layout(input);

        let mut records = load_sorted_records(input)?;
        info!(records = records.len(), "Records loaded");

        if self.config.classification.canonicalize_families {
            let (map, ranked) = canonical::apply_to_records(&mut records)?;
            write_canonical(&layout, &map, &ranked)?;
        }

        let mut ctx = RunContext::new(self.config.output.dataset.clone(), self.config.genome_size);
        for class in RepeatClass::ALL {
            self.run_class(class, &records, &layout, &mut ctx)?;
            if class == RepeatClass::Microsatellite {
                self.microsatellite_extras(&records, &layout)?;
            }
        }

        ctx.manifest.save(layout.manifest())?;

        info!(
            passes = ctx.outcomes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Classification run finished"
        );
        Ok(ctx)
    }

    /// One pass: filter, write, report, then commit the files and the manifest entry.
    fn run_class(
        &self,
        class: RepeatClass,
        records: &[TandemRepeatRecord],
        layout: &OutputLayout,
        ctx: &mut RunContext,
    ) -> Result<()> {
        let files = layout.class_files(class);
        let mut sinks = PassSinks {
            records: AtomicOutput::create(&files.trf)?,
            gff: AtomicOutput::create(&files.gff)?,
            clouds: files.clouds.as_ref().map(AtomicOutput::create).transpose()?,
            fasta: files.fasta.as_ref().map(AtomicOutput::create).transpose()?,
        };
        if self.config.output.write_gff_header {
            write_gff3_header(&mut sinks.gff)?;
        }

        let outcome = run_pass(class, records, &self.config.classification, &mut sinks)?;
        let pgenome = outcome.genome_fraction(ctx.genome_size)?;

        let mut report = AtomicOutput::create(&files.report)?;
        outcome.families.write_report(&mut report)?;

        let PassSinks {
            records: trf,
            gff,
            clouds,
            fasta,
        } = sinks;
        trf.commit()?;
        gff.commit()?;
        if let Some(clouds) = clouds {
            clouds.commit()?;
        }
        if let Some(fasta) = fasta {
            fasta.commit()?;
        }
        report.commit()?;

        info!(
            pass = %class,
            selected = outcome.filtered,
            dataset = outcome.dataset,
            pgenome = pgenome,
            "Pass committed"
        );
        let result = ClassResult {
            trf_file: files.trf,
            gff_file: files.gff,
            report_file: files.report,
            fasta_file: files.fasta,
            clouds_file: files.clouds,
            n: outcome.filtered,
            pgenome,
        };
        ctx.commit(outcome, result);
        Ok(())
    }

    /// K-mer index and summary table of the microsatellite pass.
    fn microsatellite_extras(&self, records: &[TandemRepeatRecord], layout: &OutputLayout) -> Result<()> {
        if self.config.kmers.enabled {
            let settings = &self.config.classification;
            let micro: Vec<TandemRepeatRecord> = records
                .iter()
                .filter(|r| RepeatClass::Microsatellite.accepts(r, settings))
                .cloned()
                .collect();
            let entries = kmer_index(&micro, &self.config.kmers)?;
            let mut out = AtomicOutput::create(layout.micro_kmers())?;
            write_kmer_index(&entries, &mut out)?;
            out.commit()?;
        }

        let micro_gff = layout.class_files(RepeatClass::Microsatellite).gff;
        let rows = micro_summary(&micro_gff)?;
        let mut out = AtomicOutput::create(layout.micro_summary())?;
        write_summary(&rows, &mut out)?;
        out.commit()?;
        info!(families = rows.len(), "Microsatellite summary written");
        Ok(())
    }
}

/// Index the arrays of `records` on a dedicated rayon pool.
pub fn kmer_index(records: &[TandemRepeatRecord], settings: &KmerSettings) -> Result<Vec<KmerIndexEntry>> {
    let indexer = KmerIndexer::new(settings.k)?
        .cutoff(settings.cutoff)
        .complexity_bounds(settings.min_complexity, settings.max_complexity)
        .track_documents(settings.track_documents);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.threads)
        .build()?;
    pool.install(|| indexer.index_records(records))
}

/// Index every record of a TRF file and write the index to `output`.
pub fn index_file(input: &Path, output: &Path, settings: &KmerSettings) -> Result<usize> {
    let records = TrfFile::new(input).read_all()?;
    let entries = kmer_index(&records, settings)?;
    let mut out = AtomicOutput::create(output)?;
    write_kmer_index(&entries, &mut out)?;
    out.commit()?;
    Ok(entries.len())
}

fn write_canonical(
    layout: &OutputLayout,
    map: &ConsensusRenameMap,
    ranked: &[CanonicalFamily],
) -> Result<(PathBuf, PathBuf)> {
    let mut rules = AtomicOutput::create(layout.canonical_map())?;
    for (consensus, representative) in map.sorted_rules() {
        writeln!(rules, "{}\t{}", consensus, representative)?;
    }

    let mut families = AtomicOutput::create(layout.canonical_families())?;
    for family in ranked {
        writeln!(families, "{}\t{}", family.representative, family.count)?;
    }

    Ok((rules.commit()?, families.commit()?))
}

/// Canonicalize the consensus sequences of a TRF file and write the rename
/// map and the ranked families. Returns the two paths.
pub fn canonicalize_file(input: &Path, layout: &OutputLayout) -> Result<(PathBuf, PathBuf)> {
    let mut records = TrfFile::new(input).read_all()?;
    let (map, ranked) = canonical::apply_to_records(&mut records)?;
    write_canonical(layout, &map, &ranked)
}

/// Convert BED intervals over a FASTA assembly into 18-column records.
/// With `fasta_output`, the extracted arrays are also written as FASTA.
pub fn bed_to_trf(
    assembly_path: &Path,
    bed_path: &Path,
    output: &Path,
    fasta_output: Option<&Path>,
    project: &str,
) -> Result<usize> {
    let assembly = Assembly::from_fasta(assembly_path)?;
    let intervals = parse_bed(BufReader::new(File::open(bed_path)?))?;
    let records = records_from_bed(&assembly, &intervals, project);

    let mut out = AtomicOutput::create(output)?;
    for record in &records {
        write!(out, "{}", record)?;
    }
    let mut fasta = fasta_output.map(AtomicOutput::create).transpose()?;
    if let Some(fasta) = fasta.as_mut() {
        for record in &records {
            fasta.write_all(extracted_fasta(record).as_bytes())?;
        }
    }

    out.commit()?;
    if let Some(fasta) = fasta {
        fasta.commit()?;
    }
    info!(
        intervals = intervals.len(),
        records = records.len(),
        "BED intervals converted"
    );
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::record_line;
    use std::fs;
    use tempfile::TempDir;

    fn write_trf(dir: &Path, lines: &[String]) -> PathBuf {
        let path = dir.join("sample.trf");
        fs::write(&path, lines.concat()).unwrap();
        path
    }

    fn pipeline(out: &Path) -> Pipeline {
        PipelineBuilder::new()
            .output_dir(out)
            .dataset("test")
            .genome_size(1000)
            .kmer_length(3)
            .threads(2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        assert!(PipelineBuilder::new().genome_size(0).build().is_err());
        assert!(PipelineBuilder::new().kmer_length(0).build().is_err());
    }

    #[test]
    fn test_run_writes_micro_outputs() {
        let dir = TempDir::new().unwrap();
        let input = write_trf(
            dir.path(),
            &[
                record_line(1, "chr2", 2, 100.0, "AT", "ATATATATAT"),
                record_line(2, "chr1", 2, 90.0, "AT", "ATATATTTAT"),
                record_line(3, "chr1", 4, 100.0, "AAAC", "AAACAAACAAAC"),
            ],
        );
        let out = dir.path().join("out");
        let ctx = pipeline(&out).run(&input).unwrap();

        assert_eq!(ctx.outcomes.len(), RepeatClass::ALL.len());
        let micro = ctx.outcome(RepeatClass::Microsatellite).unwrap();
        assert_eq!(micro.filtered, 3);
        assert_eq!(ctx.outcome(RepeatClass::PerfectMicrosatellite).unwrap().filtered, 2);

        let gff = fs::read_to_string(out.join("sample.micro.gff")).unwrap();
        let mut lines = gff.lines();
        assert_eq!(lines.next(), Some("##gff-version 3"));
        // head-sorted: chr1 records come first
        let first = gff.lines().find(|l| !l.starts_with('#')).unwrap();
        assert!(first.starts_with("chr1\t"));

        let summary = fs::read_to_string(out.join("reports/microsatellites.summary.tsv")).unwrap();
        assert!(summary.starts_with("#Name\t#\tLength (bp)"));
        assert!(summary.contains("(AT)n\t2\t"));

        let kmers = fs::read_to_string(out.join("sample.micro.kmers")).unwrap();
        assert!(kmers.lines().any(|l| l.starts_with("ATA\tTAT\t")));

        assert!(out.join("sample.canonical.tsv").exists());
        assert!(out.join("results.yaml").exists());
    }

    #[test]
    fn test_failed_pass_leaves_no_files() {
        let dir = TempDir::new().unwrap();
        // An empty array passes the tSSR filter but cannot be named.
        let mut line = record_line(1, "chr1", 2, 100.0, "AT", "ATATAT");
        line = line.replace("\tATATAT\t", "\t\t");
        let input = write_trf(dir.path(), &[line]);
        let out = dir.path().join("out");

        let err = pipeline(&out).run(&input).unwrap_err();
        assert!(err.is_data_integrity());
        assert!(out.join("sample.micro.trf").exists());
        assert!(!out.join("sample.tssr.trf").exists());
        assert!(!out.join("sample.tssr.gff").exists());
        assert!(!out.join("results.yaml").exists());
    }

    #[test]
    fn test_index_file() {
        let dir = TempDir::new().unwrap();
        let input = write_trf(dir.path(), &[record_line(1, "chr1", 2, 100.0, "AC", "ACACAC")]);
        let output = dir.path().join("index.tsv");
        let settings = KmerSettings {
            k: 2,
            ..KmerSettings::default()
        };
        let n = index_file(&input, &output, &settings).unwrap();
        assert_eq!(n, 2);
        let text = fs::read_to_string(&output).unwrap();
        assert_eq!(text, "AC\tGT\t3\t1\nCA\tTG\t2\t1\n");
    }

    #[test]
    fn test_bed_to_trf() {
        let dir = TempDir::new().unwrap();
        let fasta = dir.path().join("asm.fa");
        fs::write(&fasta, ">chr1 test\nACACACACGGGG\n").unwrap();
        let bed = dir.path().join("repeats.bed");
        fs::write(&bed, "chr1\t0\t8\t2\t0\t+\nchr1\t4\t40\t2\t0\t+\n").unwrap();
        let output = dir.path().join("repeats.trf");
        let extracted = dir.path().join("repeats.fa");

        let n = bed_to_trf(&fasta, &bed, &output, Some(&extracted), "FasTAN").unwrap();
        assert_eq!(n, 1);
        let records = TrfFile::new(&output).read_all().unwrap();
        assert_eq!(records[0].array, "ACACACAC");
        assert_eq!(records[0].left_index, 1);
        assert_eq!(
            fs::read_to_string(&extracted).unwrap(),
            ">chr1_0_8_8_2\nACACACAC\n"
        );
    }
}
