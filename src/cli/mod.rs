//! Command-line interface for rust_scmetrics

use clap::{Parser, Subcommand};

use crate::rng::DEFAULT_SEED;

#[derive(Parser)]
#[command(name = "rust_scmetrics")]
#[command(version)]
#[command(about = "Evaluation metrics for single-cell generative models")]
#[command(disable_help_flag = true)]
#[command(disable_version_flag = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate the baseline model on a dataset
    #[command(
        about = "Evaluate the baseline model on a dataset",
        long_about = "Evaluate the baseline model on a dataset\n\n\
            Fits a per-feature count model to the gene table, optionally corrupts\n\
            the genes the way a denoising model is trained, and reports negative\n\
            log-likelihood, imputation error and gene/protein correlation.",
        after_long_help = "\
Examples:
  # All applicable metrics, genes and proteins from files
  rust_scmetrics evaluate -g genes.csv -p proteins.csv -o report.json

  # Registered dataset layout, 25% binomial corruption
  rust_scmetrics evaluate --dataset citeseq --data-dir data/pbmc \\
    --corruption-rate 0.25 --corruption-dist binomial

  # Only imputation error, zero-inflated Poisson baseline, 10 posterior samples
  rust_scmetrics evaluate -g genes.tsv --metric imputation --family zip -n 10"
    )]
    Evaluate {
        /// Gene expression table (cells x genes)
        #[arg(short, long,
            long_help = "Gene expression table.\n\
                Format: first column = cell IDs, header = gene names.\n\
                Supports both CSV (comma) and TSV (tab) delimiters (auto-detected).")]
        genes: Option<String>,

        /// Protein expression table (cells x proteins)
        #[arg(short, long,
            long_help = "Protein (antibody) expression table measured on the same cells.\n\
                Protein names are matched to gene names after removing assay\n\
                suffixes such as _TotalSeqB or _ADT.")]
        proteins: Option<String>,

        /// Registered dataset name (see `datasets`)
        #[arg(long, value_name = "NAME", conflicts_with = "genes")]
        dataset: Option<String>,

        /// Directory holding the registered dataset files
        #[arg(long, value_name = "DIR", requires = "dataset")]
        data_dir: Option<String>,

        /// Input tables have features as rows
        #[arg(long)]
        transposed: bool,

        /// Baseline count family: poisson, nb, zip, zinb
        #[arg(long, default_value = "zinb")]
        family: String,

        /// Fraction of entries to corrupt before prediction
        #[arg(long, value_name = "RATE")]
        corruption_rate: Option<f64>,

        /// Corruption process: uniform or binomial
        #[arg(long, default_value = "binomial")]
        corruption_dist: String,

        /// Metric to run (nllk, imputation, correlation); repeatable
        #[arg(short, long = "metric", value_name = "METRIC",
            long_help = "Metric to run: nllk, imputation or correlation.\n\
                Can be specified multiple times. Defaults to every metric the\n\
                inputs support (correlation needs a protein table).")]
        metrics: Vec<String>,

        /// Posterior samples per cell
        #[arg(short, long, default_value = "1")]
        n_samples: usize,

        /// Cells per prediction batch
        #[arg(long, default_value = "128")]
        batch_size: usize,

        /// Seed for corruption
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        /// Output report path (.json or .tsv)
        #[arg(short, long)]
        output: Option<String>,

        /// Report format (json or tsv); guessed from the output path if omitted
        #[arg(long)]
        format: Option<String>,

        /// Number of threads (0 = all available)
        #[arg(short, long, default_value = "0")]
        threads: usize,
    },

    /// Write a corrupted copy of an expression table
    #[command(
        about = "Write a corrupted copy of an expression table",
        after_long_help = "\
Examples:
  rust_scmetrics corrupt -i genes.csv -o genes_corrupted.tsv --rate 0.25
  rust_scmetrics corrupt -i genes.csv -o out.tsv --rate 0.1 --dist uniform --retain-rate 0"
    )]
    Corrupt {
        /// Input expression table
        #[arg(short, long)]
        input: String,

        /// Output path (TSV)
        #[arg(short, long)]
        output: String,

        /// Fraction of entries to corrupt
        #[arg(long)]
        rate: f64,

        /// Corruption process: uniform or binomial
        #[arg(long, default_value = "binomial")]
        dist: String,

        /// Probability a corrupted value (or count) survives
        #[arg(long, default_value_t = crate::data::DEFAULT_RETAIN_RATE)]
        retain_rate: f64,

        /// Input table has features as rows
        #[arg(long)]
        transposed: bool,

        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },

    /// List registered dataset layouts
    Datasets,
}
