//! Classification and per-family statistics for genome-wide tandem repeat
//! annotations.
//!
//! Records in the 18-column tab-delimited layout are sorted by sequence head
//! and run through a fixed series of passes (perfect microsatellites,
//! microsatellites, true and fuzzy SSRs, complex repeats and three length
//! bands). Each pass writes its own record, GFF3 and report files and a
//! manifest entry with its share of the genome.

pub mod bed;
pub mod canonical;
pub mod classify;
pub mod config;
pub mod error;
pub mod family;
pub mod genome;
pub mod gff;
pub mod kmer;
pub mod logging;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod record;
pub mod sequence;
pub mod stats;
pub mod summary;

pub use classify::{run_pass, PassOutcome, PassSinks, RepeatClass};
pub use config::{ClassificationSettings, KmerSettings, OutputSettings, TrevisConfig};
pub use error::{Result, TrevisError};
pub use family::{FamilyStatsAccumulator, FamilySummary, FamilyTable};
pub use manifest::{ClassResult, ResultsManifest, RunContext};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use record::{TandemRepeatRecord, TrfFile};
