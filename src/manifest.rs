//! Results manifest
//!
//! `dataset -> class -> ClassResult`, saved as YAML. Each pass adds its own
//! entry; entries from earlier passes are never replaced wholesale.

use crate::classify::{PassOutcome, RepeatClass};
use crate::error::Result;
use crate::output::AtomicOutput;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Output files and coverage of one class in one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassResult {
    pub trf_file: PathBuf,
    pub gff_file: PathBuf,
    pub report_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fasta_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clouds_file: Option<PathBuf>,
    /// Records claimed by the pass
    pub n: usize,
    /// Percentage of the genome covered
    pub pgenome: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultsManifest {
    datasets: BTreeMap<String, BTreeMap<String, ClassResult>>,
}

impl ResultsManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, dataset: &str, class: RepeatClass, result: ClassResult) {
        self.datasets
            .entry(dataset.to_string())
            .or_default()
            .insert(class.key().to_string(), result);
    }

    pub fn get(&self, dataset: &str, class: RepeatClass) -> Option<&ClassResult> {
        self.datasets.get(dataset)?.get(class.key())
    }

    pub fn datasets(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write the manifest as YAML, replacing `path` only once fully written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let mut out = AtomicOutput::create(path)?;
        out.write_all(self.to_yaml()?.as_bytes())?;
        out.commit()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Mutable state shared by the passes of one run
#[derive(Debug)]
pub struct RunContext {
    pub dataset: String,
    pub genome_size: u64,
    pub manifest: ResultsManifest,
    /// Outcomes in execution order
    pub outcomes: Vec<PassOutcome>,
}

impl RunContext {
    pub fn new(dataset: impl Into<String>, genome_size: u64) -> Self {
        Self {
            dataset: dataset.into(),
            genome_size,
            manifest: ResultsManifest::new(),
            outcomes: Vec::new(),
        }
    }

    /// Store a pass outcome and its manifest entry.
    pub fn commit(&mut self, outcome: PassOutcome, result: ClassResult) {
        self.manifest.record(&self.dataset, outcome.class, result);
        self.outcomes.push(outcome);
    }

    pub fn outcome(&self, class: RepeatClass) -> Option<&PassOutcome> {
        self.outcomes.iter().find(|o| o.class == class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(n: usize) -> ClassResult {
        ClassResult {
            trf_file: PathBuf::from("out/x.micro.trf"),
            gff_file: PathBuf::from("out/x.micro.gff"),
            report_file: PathBuf::from("out/x.micro.report"),
            fasta_file: None,
            clouds_file: None,
            n,
            pgenome: 0.123,
        }
    }

    #[test]
    fn test_manifest_yaml_round_trip() {
        let mut manifest = ResultsManifest::new();
        manifest.record("asm", RepeatClass::Microsatellite, result(3));
        manifest.record("asm", RepeatClass::TrueSsr, result(1));

        let yaml = manifest.to_yaml().unwrap();
        assert!(yaml.starts_with("asm:\n"));
        assert!(yaml.contains("  micro:\n"));
        assert!(yaml.contains("  tSSR:\n"));
        assert!(!yaml.contains("fasta_file"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.yaml");
        assert_eq!(manifest.save(&path).unwrap(), path);
        let loaded = ResultsManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.get("asm", RepeatClass::Microsatellite).unwrap().n, 3);
        assert!(loaded.get("asm", RepeatClass::ComplexTr).is_none());
    }

    #[test]
    fn test_record_keeps_other_classes() {
        let mut manifest = ResultsManifest::new();
        manifest.record("asm", RepeatClass::Microsatellite, result(3));
        manifest.record("asm", RepeatClass::Microsatellite, result(5));
        manifest.record("asm", RepeatClass::Band1kb, result(1));
        assert_eq!(manifest.get("asm", RepeatClass::Microsatellite).unwrap().n, 5);
        assert_eq!(manifest.datasets().count(), 1);
    }
}
