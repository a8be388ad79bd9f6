use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use trevis::bed::DEFAULT_PROJECT;
use trevis::config::TrevisConfig;
use trevis::error::Result;
use trevis::logging::{self, LogLevel};
use trevis::pipeline::{bed_to_trf, canonicalize_file, index_file, PipelineBuilder};

/// Classify tandem repeat annotations and summarize their families.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (.yaml, .yml, .toml or .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every classification pass over a record file
    Classify(ClassifyArgs),
    /// Write the consensus rename map and ranked families of a record file
    Canonicalize {
        /// Input record file
        #[arg(long)]
        input: PathBuf,
        /// Output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Build a k-mer index over the arrays of a record file
    Kmers {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// K-mer length
        #[arg(short)]
        k: Option<usize>,
        /// Drop k-mers found in this many documents or fewer
        #[arg(long)]
        cutoff: Option<u64>,
        /// Also write document ids and per-document counts
        #[arg(long)]
        documents: bool,
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Convert BED intervals over a FASTA assembly into records
    BedToTrf {
        #[arg(long)]
        fasta: PathBuf,
        #[arg(long)]
        bed: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Write the extracted arrays here as FASTA
        #[arg(long)]
        extracted: Option<PathBuf>,
        /// Project name written in the first column
        #[arg(long, default_value = DEFAULT_PROJECT)]
        project: String,
    },
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// Input record file
    #[arg(long)]
    input: PathBuf,

    /// Total genome length in bp
    #[arg(long)]
    genome_size: Option<u64>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Dataset name used in the results manifest
    #[arg(long)]
    dataset: Option<String>,

    /// Worker threads for the k-mer index
    #[arg(long)]
    threads: Option<usize>,

    /// Microsatellite k-mer length
    #[arg(short)]
    k: Option<usize>,

    /// Skip the microsatellite k-mer index
    #[arg(long)]
    no_kmers: bool,
}

fn load_config(cli: &Cli) -> Result<TrevisConfig> {
    let mut config = match &cli.config {
        Some(path) => TrevisConfig::load_from_file(path)?,
        None => TrevisConfig::default(),
    };
    config.apply_env_overrides()?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.parse::<LogLevel>()?;
    }
    if cli.json_logs {
        config.logging.json_format = true;
    }
    Ok(config)
}

fn run(cli: Cli, config: TrevisConfig) -> Result<()> {
    match cli.command {
        Command::Classify(args) => {
            let mut builder = PipelineBuilder::new().config(config);
            if let Some(size) = args.genome_size {
                builder = builder.genome_size(size);
            }
            if let Some(dir) = args.output_dir {
                builder = builder.output_dir(dir);
            }
            if let Some(dataset) = args.dataset {
                builder = builder.dataset(dataset);
            }
            if let Some(threads) = args.threads {
                builder = builder.threads(threads);
            }
            if let Some(k) = args.k {
                builder = builder.kmer_length(k);
            }
            if args.no_kmers {
                builder = builder.kmers(false);
            }
            let pipeline = builder.build()?;
            let ctx = pipeline.run(&args.input)?;
            for outcome in &ctx.outcomes {
                println!(
                    "{}\t{}\t{}\t{}",
                    outcome.class,
                    outcome.filtered,
                    outcome.dataset,
                    outcome.genome_fraction(ctx.genome_size)?
                );
            }
        }
        Command::Canonicalize { input, output_dir } => {
            let dir = output_dir.unwrap_or_else(|| config.output.output_dir.clone());
            let pipeline = PipelineBuilder::new().config(config).output_dir(dir).build()?;
            let (map, families) = canonicalize_file(&input, &pipeline.layout(&input))?;
            println!("{}\n{}", map.display(), families.display());
        }
        Command::Kmers {
            input,
            output,
            k,
            cutoff,
            documents,
            threads,
        } => {
            let mut settings = config.kmers;
            if let Some(k) = k {
                settings.k = k;
            }
            if cutoff.is_some() {
                settings.cutoff = cutoff;
            }
            if let Some(threads) = threads {
                settings.threads = threads;
            }
            settings.track_documents |= documents;
            let n = index_file(&input, &output, &settings)?;
            println!("{} k-mers written to {}", n, output.display());
        }
        Command::BedToTrf {
            fasta,
            bed,
            output,
            extracted,
            project,
        } => {
            let n = bed_to_trf(&fasta, &bed, &output, extracted.as_deref(), &project)?;
            println!("{} records written to {}", n, output.display());
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let status = match run(cli, config) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, data_integrity = e.is_data_integrity(), "Run failed");
            eprintln!("Error: {}", e);
            1
        }
    };
    // flush the log file before exiting
    drop(guard);
    process::exit(status);
}
