//! Error handling for the classification pipeline
//!
//! Data-integrity problems (malformed records, unmapped consensus sequences,
//! SSR naming gaps) are fatal for the pass that hits them. Callers never
//! skip a bad record: the error travels up to the binary, which prints the
//! offending record and exits non-zero.

use thiserror::Error;

/// Error type for all trevis operations
#[derive(Error, Debug)]
pub enum TrevisError {
    /// I/O errors (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A tab-delimited record line that does not follow the 18-column layout
    #[error("Malformed record at line {line}: {message}")]
    MalformedRecord { line: usize, message: String },

    /// Zero-length or otherwise unusable monomer handed to the canonicalizer
    #[error("Invalid monomer sequence '{0}'")]
    InvalidMonomer(String),

    /// Consensus that the rename map does not cover
    #[error("Consensus '{consensus}' (length {length}) has no canonical representative")]
    UnmappedConsensus { consensus: String, length: usize },

    /// SSR naming found no base present in the array
    #[error("No nucleotide present for SSR naming (a={a}, c={c}, g={g}, t={t})")]
    SsrNaming { a: usize, c: usize, g: usize, t: usize },

    /// Statistics requested over an empty sample
    #[error("Empty data for {0} computation")]
    EmptyStatistics(&'static str),

    /// Negative variance handed to the standard deviation
    #[error("Wrong variance value {0}")]
    NegativeVariance(f64),

    /// Invalid k-mer length
    #[error("K-mer length {k} is invalid (must be between {min} and {max})")]
    InvalidKmerLength { k: usize, min: usize, max: usize },

    /// A record failed inside a classification pass
    #[error("Classification pass '{pass}' failed on record {id} ({head}, consensus '{consensus}', array '{array}'): {source}")]
    Classification {
        pass: String,
        head: String,
        id: u64,
        consensus: String,
        array: String,
        #[source]
        source: Box<TrevisError>,
    },

    /// Invalid FASTA content
    #[error("Invalid FASTA format at record {record}: {message}")]
    InvalidFasta { record: usize, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parse error for numeric or other structured data
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Thread pool build error: {0}")]
    ThreadPoolBuildError(#[from] rayon::ThreadPoolBuildError),

    /// Needletail parser error
    #[error("FASTA parsing error: {0}")]
    NeedletailError(#[from] needletail::errors::ParseError),
}

impl TrevisError {
    /// Create a MalformedRecord error with line number and message
    pub fn malformed(line: usize, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            message: message.into(),
        }
    }

    /// Create an InvalidKmerLength error with current and valid ranges
    pub fn invalid_kmer_length(k: usize, min: usize, max: usize) -> Self {
        Self::InvalidKmerLength { k, min, max }
    }

    /// Create an InvalidFasta error
    pub fn invalid_fasta(record: usize, message: impl Into<String>) -> Self {
        Self::InvalidFasta {
            record,
            message: message.into(),
        }
    }

    /// Create a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Create an I/O error
    pub fn io_error(message: impl Into<String>) -> Self {
        Self::Io(std::io::Error::other(message.into()))
    }

    /// True for errors that describe bad input data rather than environment problems
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            Self::MalformedRecord { .. }
                | Self::InvalidMonomer(_)
                | Self::UnmappedConsensus { .. }
                | Self::SsrNaming { .. }
                | Self::Classification { .. }
        )
    }
}

/// Result type alias for trevis operations
pub type Result<T> = std::result::Result<T, TrevisError>;
