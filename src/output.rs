//! Output files
//!
//! Every file is written to a temporary file in its destination directory
//! and renamed into place on commit. Dropping an uncommitted output removes
//! the temporary file, so a failed pass leaves no partial files behind.

use crate::classify::RepeatClass;
use crate::error::Result;
use crate::gff::GFF3_HEADER;
use chrono::Utc;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A buffered writer whose file only appears at its path after [`AtomicOutput::commit`].
pub struct AtomicOutput {
    path: PathBuf,
    writer: BufWriter<NamedTempFile>,
}

impl AtomicOutput {
    /// Start writing `path`, creating its parent directory if needed.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let file = NamedTempFile::new_in(&dir)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and move the file into place.
    pub fn commit(self) -> Result<PathBuf> {
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(self.path)
    }
}

impl Write for AtomicOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// GFF3 preamble: version pragma, date and producer.
pub fn write_gff3_header<W: Write>(writer: &mut W) -> Result<()> {
    writeln!(writer, "{}", GFF3_HEADER)?;
    writeln!(writer, "##date {}", Utc::now().format("%Y-%m-%d"))?;
    writeln!(writer, "##source Trevis {}", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}

/// Paths one pass writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFiles {
    pub trf: PathBuf,
    pub gff: PathBuf,
    pub report: PathBuf,
    pub clouds: Option<PathBuf>,
    pub fasta: Option<PathBuf>,
}

/// File naming for one input file inside the output directory
#[derive(Debug, Clone)]
pub struct OutputLayout {
    dir: PathBuf,
    stem: String,
    dataset: String,
}

impl OutputLayout {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
            dataset: dataset.into(),
        }
    }

    /// Layout named after the input file's stem.
    pub fn for_input(dir: impl Into<PathBuf>, input: &Path, dataset: impl Into<String>) -> Self {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "trevis".to_string());
        Self::new(dir, stem, dataset)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, name: String) -> PathBuf {
        self.dir.join(name)
    }

    fn class_prefix(&self, class: RepeatClass) -> String {
        match class {
            RepeatClass::ComplexTr => format!("{}.{}.{}", self.stem, class.file_tag(), self.dataset),
            _ => format!("{}.{}", self.stem, class.file_tag()),
        }
    }

    pub fn class_files(&self, class: RepeatClass) -> ClassFiles {
        let prefix = self.class_prefix(class);
        ClassFiles {
            trf: self.file(format!("{}.trf", prefix)),
            gff: self.file(format!("{}.gff", prefix)),
            report: self.file(format!("{}.report", prefix)),
            clouds: class
                .writes_clouds()
                .then(|| self.file(format!("{}.clouds", prefix))),
            fasta: class
                .writes_fasta()
                .then(|| self.file(format!("{}.fasta", prefix))),
        }
    }

    pub fn micro_kmers(&self) -> PathBuf {
        self.file(format!("{}.micro.kmers", self.stem))
    }

    pub fn micro_summary(&self) -> PathBuf {
        self.dir.join("reports").join("microsatellites.summary.tsv")
    }

    pub fn manifest(&self) -> PathBuf {
        self.file("results.yaml".to_string())
    }

    /// Raw consensus to representative rules
    pub fn canonical_map(&self) -> PathBuf {
        self.file(format!("{}.canonical.tsv", self.stem))
    }

    /// Representatives ranked by occurrence
    pub fn canonical_families(&self) -> PathBuf {
        self.file(format!("{}.families.tsv", self.stem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_commit_moves_file_into_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.txt");
        let mut output = AtomicOutput::create(&path).unwrap();
        writeln!(output, "hello").unwrap();
        assert!(!path.exists());

        let committed = output.commit().unwrap();
        assert_eq!(committed, path);
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn test_dropped_output_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        {
            let mut output = AtomicOutput::create(&path).unwrap();
            writeln!(output, "partial").unwrap();
        }
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_gff3_header() {
        let mut out = Vec::new();
        write_gff3_header(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("##gff-version 3\n##date "));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_layout() {
        let layout = OutputLayout::for_input("/out", Path::new("/data/genome.trf"), "hg");
        let micro = layout.class_files(RepeatClass::Microsatellite);
        assert_eq!(micro.trf, PathBuf::from("/out/genome.micro.trf"));
        assert_eq!(micro.clouds, None);

        let fssr = layout.class_files(RepeatClass::FuzzySsr);
        assert_eq!(fssr.trf, PathBuf::from("/out/genome.fssr.trf"));
        assert_eq!(fssr.gff, PathBuf::from("/out/genome.fssr.gff"));

        let complex = layout.class_files(RepeatClass::ComplexTr);
        assert_eq!(complex.report, PathBuf::from("/out/genome.complex.hg.report"));
        assert_eq!(complex.clouds, Some(PathBuf::from("/out/genome.complex.hg.clouds")));

        let band = layout.class_files(RepeatClass::Band10kb);
        assert_eq!(band.fasta, Some(PathBuf::from("/out/genome.10kb.fasta")));

        assert_eq!(layout.micro_kmers(), PathBuf::from("/out/genome.micro.kmers"));
        assert_eq!(
            layout.micro_summary(),
            PathBuf::from("/out/reports/microsatellites.summary.tsv")
        );
        assert_eq!(layout.manifest(), PathBuf::from("/out/results.yaml"));
    }
}
