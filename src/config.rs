//! Run configuration
//!
//! Loaded from YAML, TOML or JSON (picked by file extension), then
//! overridden from `TREVIS_*` environment variables and finally from
//! command-line flags. Every section is validated before a run starts.

use crate::error::{Result, TrevisError};
use crate::logging::{LogLevel, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use validator::{Validate, ValidationError, ValidationErrors};

/// Configuration for one classification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrevisConfig {
    /// Total length of the reference genome in bp
    pub genome_size: u64,

    pub logging: LoggingConfig,

    /// Pass thresholds
    pub classification: ClassificationSettings,

    /// Microsatellite k-mer index
    pub kmers: KmerSettings,

    pub output: OutputSettings,
}

impl Default for TrevisConfig {
    fn default() -> Self {
        Self {
            genome_size: 1,
            logging: LoggingConfig::default(),
            classification: ClassificationSettings::default(),
            kmers: KmerSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

/// Thresholds of the classification passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ClassificationSettings {
    /// Periods below this are microsatellites
    #[validate(range(min = 1, max = 1000))]
    pub micro_max_period: u32,

    /// pmatch value of a perfect repeat
    #[validate(range(min = 0.0, max = 100.0))]
    pub perfect_pmatch: f64,

    /// A base below this frequency is absent from a fuzzy SSR
    #[validate(range(min = 0.0, max = 1.0))]
    pub fuzzy_min_frequency: f64,

    /// A base seen fewer times than this is absent from a fuzzy SSR
    pub fuzzy_min_count: usize,

    /// Complex repeats need a consensus longer than this
    pub complex_min_consensus_length: usize,

    /// Complex repeats need an array longer than this
    pub complex_min_array_length: u64,

    /// Exclusive GC window of complex repeats, as fractions
    #[validate(range(min = 0.0, max = 1.0))]
    pub complex_min_gc: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub complex_max_gc: f64,

    pub complex_min_copy_number: f64,

    /// Shannon entropy (bits) a complex array must exceed
    #[validate(range(min = 0.0, max = 2.0))]
    pub complex_min_entropy: f64,

    pub band_1kb: u64,
    pub band_3kb: u64,
    pub band_10kb: u64,

    /// Label records without a family by their canonical consensus before the passes
    pub canonicalize_families: bool,
}

impl Default for ClassificationSettings {
    fn default() -> Self {
        Self {
            micro_max_period: 6,
            perfect_pmatch: 100.0,
            fuzzy_min_frequency: 0.01,
            fuzzy_min_count: 4,
            complex_min_consensus_length: 4,
            complex_min_array_length: 100,
            complex_min_gc: 0.2,
            complex_max_gc: 0.8,
            complex_min_copy_number: 4.0,
            complex_min_entropy: 1.82,
            band_1kb: 1000,
            band_3kb: 3000,
            band_10kb: 10_000,
            canonicalize_families: true,
        }
    }
}

/// Microsatellite k-mer index settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct KmerSettings {
    pub enabled: bool,

    #[validate(range(min = 1, max = 1024))]
    pub k: usize,

    /// Drop k-mers seen in this many documents or fewer
    pub cutoff: Option<u64>,

    /// Arrays whose compression ratio falls outside these bounds are not indexed
    pub min_complexity: Option<f64>,
    pub max_complexity: Option<f64>,

    /// Write document ids and per-document counts
    pub track_documents: bool,

    /// Worker threads (0 = rayon default)
    #[validate(range(min = 0, max = 256))]
    pub threads: usize,
}

impl Default for KmerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            k: crate::kmer::DEFAULT_K,
            cutoff: None,
            min_complexity: None,
            max_complexity: None,
            track_documents: false,
            threads: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct OutputSettings {
    pub output_dir: PathBuf,

    /// Dataset key in the results manifest
    #[validate(length(min = 1))]
    pub dataset: String,

    /// Start GFF3 files with the version pragma
    pub write_gff_header: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("trevis_out"),
            dataset: "dataset".to_string(),
            write_gff_header: true,
        }
    }
}

fn invalid(errors: &mut ValidationErrors, field: &'static str, message: &'static str) {
    let mut error = ValidationError::new("invalid");
    error.message = Some(message.into());
    errors.add(field, error);
}

impl Validate for TrevisConfig {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.genome_size == 0 {
            invalid(&mut errors, "genome_size", "genome size must be at least 1");
        }
        let c = &self.classification;
        if c.complex_min_gc >= c.complex_max_gc {
            invalid(&mut errors, "complex_gc", "GC window is empty");
        }
        if !(c.band_1kb <= c.band_3kb && c.band_3kb <= c.band_10kb) {
            invalid(&mut errors, "bands", "length bands must be non-decreasing");
        }
        if let (Some(min), Some(max)) = (self.kmers.min_complexity, self.kmers.max_complexity) {
            if min > max {
                invalid(&mut errors, "complexity", "complexity bounds are reversed");
            }
        }

        let mut result = if errors.is_empty() { Ok(()) } else { Err(errors) };
        result = ValidationErrors::merge(result, "classification", self.classification.validate());
        result = ValidationErrors::merge(result, "kmers", self.kmers.validate());
        result = ValidationErrors::merge(result, "output", self.output.validate());
        result
    }
}

impl TrevisConfig {
    /// Load and validate a configuration file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TrevisError::io_error(format!("Failed to read config file {}: {}", path.display(), e)))?;

        let config: TrevisConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => {
                return Err(TrevisError::config(
                    "Unsupported config file format. Use .toml, .yaml, .yml, or .json",
                ))
            }
        };

        config.check()?;
        Ok(config)
    }

    /// Save to a file whose extension selects the format.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::to_string_pretty(self)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => {
                return Err(TrevisError::config(
                    "Unsupported config file format. Use .toml, .yaml, .yml, or .json",
                ))
            }
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate, reporting failures as [`TrevisError::Config`].
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| TrevisError::config(format!("Configuration validation failed: {}", e)))
    }

    /// Apply `TREVIS_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(|key| env::var(key).ok())
    }

    /// Apply `TREVIS_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("TREVIS_LOG_LEVEL") {
            self.logging.level = level.parse::<LogLevel>()?;
        }

        if let Some(dir) = lookup("TREVIS_OUTPUT_DIR") {
            self.output.output_dir = PathBuf::from(dir);
        }

        if let Some(threads) = lookup("TREVIS_THREADS") {
            self.kmers.threads = threads
                .parse()
                .map_err(|e| TrevisError::config(format!("Invalid TREVIS_THREADS: {}", e)))?;
        }

        if let Some(size) = lookup("TREVIS_GENOME_SIZE") {
            self.genome_size = size
                .parse()
                .map_err(|e| TrevisError::config(format!("Invalid TREVIS_GENOME_SIZE: {}", e)))?;
        }

        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = TrevisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.classification.micro_max_period, 6);
        assert_eq!(config.kmers.k, 23);
        assert_eq!(config.output.dataset, "dataset");
    }

    #[test]
    fn test_config_serialization() {
        let config = TrevisConfig::default();

        let toml_str = toml::to_string(&config).unwrap();
        let from_toml: TrevisConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(from_toml, config);

        let json_str = serde_json::to_string(&config).unwrap();
        let from_json: TrevisConfig = serde_json::from_str(&json_str).unwrap();
        assert_eq!(from_json, config);

        let yaml_str = serde_yaml::to_string(&config).unwrap();
        let from_yaml: TrevisConfig = serde_yaml::from_str(&yaml_str).unwrap();
        assert_eq!(from_yaml, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "genome_size: 5000\nclassification:\n  band_1kb: 500").unwrap();
        file.flush().unwrap();

        let config = TrevisConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.genome_size, 5000);
        assert_eq!(config.classification.band_1kb, 500);
        assert_eq!(config.classification.band_3kb, 3000);
        assert!(config.kmers.enabled);
    }

    #[test]
    fn test_save_and_load_toml() {
        let mut config = TrevisConfig::default();
        config.genome_size = 1_000_000;
        config.kmers.cutoff = Some(2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trevis.toml");
        config.save_to_file(&path).unwrap();
        let loaded = TrevisConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = TrevisConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, TrevisError::Config(_)));
    }

    #[test]
    fn test_environment_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TREVIS_LOG_LEVEL", "debug"),
            ("TREVIS_OUTPUT_DIR", "/tmp/trevis"),
            ("TREVIS_THREADS", "8"),
            ("TREVIS_GENOME_SIZE", "3100000000"),
        ]
        .into_iter()
        .collect();

        let mut config = TrevisConfig::default();
        config
            .apply_env_overrides_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.output.output_dir, PathBuf::from("/tmp/trevis"));
        assert_eq!(config.kmers.threads, 8);
        assert_eq!(config.genome_size, 3_100_000_000);
    }

    #[test]
    fn test_invalid_environment_override() {
        let mut config = TrevisConfig::default();
        let result = config.apply_env_overrides_from(|key| {
            (key == "TREVIS_GENOME_SIZE").then(|| "0".to_string())
        });
        assert!(result.is_err());

        let result = config.apply_env_overrides_from(|key| {
            (key == "TREVIS_THREADS").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = TrevisConfig::default();
        assert!(config.validate().is_ok());

        config.genome_size = 0;
        assert!(config.validate().is_err());
        config.genome_size = 10;

        config.classification.complex_min_gc = 0.9;
        assert!(config.validate().is_err());
        config.classification.complex_min_gc = 0.2;

        config.kmers.k = 0;
        assert!(config.validate().is_err());
        config.kmers.k = 23;

        config.classification.band_3kb = 500;
        assert!(config.validate().is_err());
        config.classification.band_3kb = 3000;

        config.output.dataset.clear();
        assert!(config.validate().is_err());
    }
}
