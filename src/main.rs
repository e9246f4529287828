//! rust_scmetrics command-line interface

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use log::{info, warn, LevelFilter};

use rust_scmetrics::cli::{Cli, Commands};
use rust_scmetrics::data::DatasetRegistry;
use rust_scmetrics::io::{read_expression_table_transposed, render_report, write_expression_table};
use rust_scmetrics::prelude::*;
use rust_scmetrics::rng::rng_from_seed;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Find the first non-flag argument (potential subcommand)
    let first_positional = args.iter().skip(1).find(|a| !a.starts_with('-'));
    let subcommands = ["evaluate", "corrupt", "datasets", "help"];
    let has_subcommand = first_positional.map_or(false, |a| subcommands.contains(&a.as_str()));

    if !has_subcommand {
        if args.len() == 1 {
            print_no_args();
            return;
        }
        if args.iter().any(|a| a == "--help") {
            print_long_help();
            return;
        }
        if args.iter().any(|a| a == "-h") {
            print_short_help();
            return;
        }
        if args.iter().any(|a| a == "-V" || a == "--version") {
            println!("rust_scmetrics {}", VERSION);
            return;
        }
        print_no_args();
        return;
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Some(Commands::Evaluate {
            genes,
            proteins,
            dataset,
            data_dir,
            transposed,
            family,
            corruption_rate,
            corruption_dist,
            metrics,
            n_samples,
            batch_size,
            seed,
            output,
            format,
            threads,
        }) => run_evaluate(EvaluateArgs {
            genes,
            proteins,
            dataset,
            data_dir,
            transposed,
            family,
            corruption_rate,
            corruption_dist,
            metrics,
            n_samples,
            batch_size,
            seed,
            verbose: cli.verbose,
            output,
            format,
            threads,
        }),
        Some(Commands::Corrupt {
            input,
            output,
            rate,
            dist,
            retain_rate,
            transposed,
            seed,
        }) => run_corrupt(&input, &output, rate, &dist, retain_rate, transposed, seed),
        Some(Commands::Datasets) => {
            run_datasets();
            Ok(())
        }
        None => {
            print_no_args();
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Custom help output
// ---------------------------------------------------------------------------

fn print_no_args() {
    println!("rust_scmetrics v{}", VERSION);
    println!("Run `rust_scmetrics -h` for usage or `rust_scmetrics --help` for detailed information.");
}

fn print_short_help() {
    println!("rust_scmetrics v{}", VERSION);
    println!();
    println!("Usage: rust_scmetrics <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  evaluate   Evaluate the baseline model on a dataset");
    println!("  corrupt    Write a corrupted copy of an expression table");
    println!("  datasets   List registered dataset layouts");
    println!();
    println!("Run `rust_scmetrics <COMMAND> -h` for command-specific options.");
}

fn print_long_help() {
    println!("rust_scmetrics v{}", VERSION);
    println!("Evaluation metrics for single-cell generative models");
    println!();
    println!("Usage: rust_scmetrics <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  evaluate   Evaluate the baseline model on a dataset");
    println!("               - Negative log-likelihood per input table");
    println!("               - Imputation error on corrupted entries");
    println!("               - Gene/protein Spearman and Pearson correlation");
    println!("               - Baseline families: poisson, nb, zip, zinb");
    println!("  corrupt    Write a corrupted copy of an expression table");
    println!("  datasets   List registered dataset layouts");
    println!();
    println!("Global Options:");
    println!("  -v, --verbose    Enable verbose output");
    println!("  -h               Print short help");
    println!("      --help       Print detailed help");
    println!("  -V, --version    Print version");
    println!();
    println!("Examples:");
    println!("  rust_scmetrics evaluate -g genes.csv -p proteins.csv -o report.json");
    println!();
    println!("  rust_scmetrics evaluate --dataset citeseq --data-dir data/pbmc \\");
    println!("    --corruption-rate 0.25 --metric imputation");
    println!();
    println!("  rust_scmetrics corrupt -i genes.csv -o corrupted.tsv --rate 0.25");
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

struct EvaluateArgs {
    genes: Option<String>,
    proteins: Option<String>,
    dataset: Option<String>,
    data_dir: Option<String>,
    transposed: bool,
    family: String,
    corruption_rate: Option<f64>,
    corruption_dist: String,
    metrics: Vec<String>,
    n_samples: usize,
    batch_size: usize,
    seed: u64,
    verbose: bool,
    output: Option<String>,
    format: Option<String>,
    threads: usize,
}

fn read_table(path: &str, transposed: bool) -> Result<ExpressionTable> {
    info!("Loading expression table from: {}", path);
    let table = if transposed {
        read_expression_table_transposed(path)?
    } else {
        read_expression_table(path)?
    };
    info!("  {} cells x {} features", table.n_cells(), table.n_features());
    Ok(table)
}

fn load_dataset(args: &EvaluateArgs) -> Result<Dataset> {
    if let Some(name) = &args.dataset {
        let dir = args.data_dir.as_deref().map_or_else(|| PathBuf::from("."), PathBuf::from);
        return DatasetRegistry::builtin().load(name, &dir);
    }

    let genes = match &args.genes {
        Some(path) => read_table(path, args.transposed)?,
        None => {
            return Err(MetricError::InvalidInput {
                reason: "either --genes or --dataset is required".to_string(),
            })
        }
    };
    let proteins = match &args.proteins {
        Some(path) => Some(read_table(path, args.transposed)?),
        None => None,
    };
    Dataset::new(genes, proteins)
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .ok();
    }

    let dataset = load_dataset(&args)?;
    let family: BaselineFamily = args.family.parse()?;

    let mut model = BaselineModel::new(family).with_seed(args.seed);
    if let Some(rate) = args.corruption_rate {
        let dist: CorruptionDist = args.corruption_dist.parse()?;
        model = model.with_corruption(CorruptionParams::new(rate, dist));
        info!("Corruption: rate={}, dist={}", rate, dist);
    }
    let model: SharedModel = Arc::new(model);

    let requested: Vec<String> = if args.metrics.is_empty() {
        let mut all = vec!["nllk".to_string(), "imputation".to_string()];
        if dataset.proteins.is_some() {
            all.push("correlation".to_string());
        } else {
            warn!("No protein table given; skipping correlation");
        }
        all
    } else {
        args.metrics.iter().map(|m| m.trim().to_lowercase()).collect()
    };

    let config = MetricConfig::default()
        .with_inputs(dataset.genes.clone())
        .with_n_samples(args.n_samples)
        .with_batch_size(args.batch_size)
        .with_verbose(usize::from(args.verbose))
        .with_seed(args.seed);

    let mut callbacks: Vec<Box<dyn EpochCallback>> = Vec::with_capacity(requested.len());
    for name in &requested {
        let callback: Box<dyn EpochCallback> = match name.as_str() {
            "nllk" | "negativeloglikelihood" => {
                let mut metric = SingleCellMetric::new(NegativeLogLikelihood, config.clone())?;
                metric.bind(model.clone())?;
                Box::new(metric)
            }
            "imputation" | "imputationerror" => {
                let mut metric = SingleCellMetric::new(ImputationError, config.clone())?;
                metric.bind(model.clone())?;
                Box::new(metric)
            }
            "correlation" => {
                let proteins = dataset.proteins.clone().ok_or_else(|| MetricError::InvalidInput {
                    reason: "the correlation metric needs a protein table (--proteins)".to_string(),
                })?;
                let mut metric = SingleCellMetric::new(Correlation, config.clone().with_extras(proteins))?;
                metric.bind(model.clone())?;
                Box::new(metric)
            }
            other => {
                return Err(MetricError::InvalidInput {
                    reason: format!(
                        "Unknown metric '{}'. Use 'nllk', 'imputation' or 'correlation'.",
                        other
                    ),
                })
            }
        };
        callbacks.push(callback);
    }

    info!("Running {} metric(s) with the {} baseline", callbacks.len(), family);
    let refs: Vec<&dyn EpochCallback> = callbacks.iter().map(|c| c.as_ref()).collect();
    let report = evaluate_all(&refs, 0)?;

    render_report(std::io::stdout().lock(), &report, ReportFormat::Tsv)?;

    if let Some(output) = &args.output {
        let format = match &args.format {
            Some(f) => f.parse()?,
            None => ReportFormat::from_path(Path::new(output)),
        };
        write_report(output, &report, format)?;
        info!("Report written to: {}", output);
    }

    Ok(())
}

fn run_corrupt(
    input: &str,
    output: &str,
    rate: f64,
    dist: &str,
    retain_rate: f64,
    transposed: bool,
    seed: u64,
) -> Result<()> {
    let table = read_table(input, transposed)?;
    let params = CorruptionParams::new(rate, dist.parse()?).with_retain_rate(retain_rate);

    let corrupted = table.corrupt(&params, &mut rng_from_seed(Some(seed)))?;
    let changed = table
        .matrix()
        .iter()
        .zip(corrupted.matrix().iter())
        .filter(|(a, b)| a != b)
        .count();
    info!(
        "Changed {} of {} entries ({:.2}%)",
        changed,
        table.matrix().len(),
        100.0 * changed as f64 / table.matrix().len().max(1) as f64
    );

    write_expression_table(output, &corrupted)?;
    info!("Corrupted table written to: {}", output);
    Ok(())
}

fn run_datasets() {
    let registry = DatasetRegistry::builtin();
    println!("{:<12} {}", "name", "layout");
    for (name, loader) in registry.entries() {
        println!("{:<12} {}", name, loader.description);
    }
}
