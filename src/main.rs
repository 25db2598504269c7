use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use culling_forest::{MaxFeatures, OobMode, RandomForestConfig, SplitMethod};
use culling_io::{Dataset, DatasetReader, ExperimentName, ResultWriter, read_json};
use culling_rfe::{
    CheckpointStore, CorrelationMatrix, ForestGrid, ForestTrainer, ImportanceKind, Metric,
    NullBaseline, PerformanceTable, PrunePass, RankTable, ResampleConfig, RfeConfig, RfeEngine,
    SubsetSchedule, WorkerPool, fit_final, prune, select_top, tidy,
};

#[derive(Parser)]
#[command(name = "culling")]
#[command(about = "Resampled recursive feature elimination for random-forest regression")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of worker threads (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Input table and column roles.
#[derive(Args, Debug, Clone)]
struct DataArgs {
    /// Path to the input CSV file
    #[arg(long)]
    input: PathBuf,

    /// Response column
    #[arg(long)]
    response: String,

    /// Comma-separated categorical predictors
    #[arg(long, value_delimiter = ',')]
    categorical: Vec<String>,

    /// Comma-separated columns to ignore
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,
}

/// Where results go.
#[derive(Args, Debug, Clone)]
struct OutputArgs {
    /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
    #[arg(long)]
    experiment: String,

    /// Output directory for result files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

/// Random-forest learner and tuning grid.
#[derive(Args, Debug, Clone)]
struct ForestArgs {
    /// Number of trees per forest
    #[arg(long, default_value_t = 200)]
    trees: usize,

    /// Minimum samples per leaf
    #[arg(long, default_value_t = 5)]
    min_samples_leaf: usize,

    /// Importance measure: "impurity" or "permutation"
    #[arg(long, default_value = "impurity")]
    importance: String,

    /// Split search: "exact" or "extra-trees" (one random threshold per feature)
    #[arg(long, default_value = "exact")]
    split_method: String,

    /// Internal cross-validation folds used for tuning
    #[arg(long, default_value_t = 7)]
    cv_folds: usize,
}

/// Stratified train/holdout resampling.
#[derive(Args, Debug, Clone)]
struct SplitArgs {
    /// Fraction of rows used for training in each resample
    #[arg(long, default_value_t = 0.8)]
    train_fraction: f64,

    /// Number of response quantile groups to stratify on
    #[arg(long, default_value_t = 5)]
    groups: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Run elimination over every resample, then tidy the checkpoints
    Run {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        forest: ForestArgs,

        #[command(flatten)]
        split: SplitArgs,

        /// Comma-separated, strictly decreasing subset sizes
        #[arg(long, value_delimiter = ',', required = true)]
        schedule: Vec<usize>,

        /// Number of resamples
        #[arg(long, default_value_t = 10)]
        resamples: usize,

        /// Null baseline: "holdout" or "internal-folds"
        #[arg(long, default_value = "holdout")]
        null_baseline: String,
    },

    /// Rebuild rank and performance tables from existing checkpoints
    Tidy {
        #[command(flatten)]
        output: OutputArgs,

        /// Number of resamples the run was configured with
        #[arg(long)]
        resamples: usize,
    },

    /// Keep the best-ranked predictors, then drop the lower-ranked member of
    /// highly correlated pairs
    Prune {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Rank table to order features by (defaults to the experiment's)
        #[arg(long)]
        ranks: Option<PathBuf>,

        /// Keep the k best-ranked predictors (defaults to the best subset
        /// size by holdout RMSE in the experiment's performance table)
        #[arg(long)]
        top: Option<usize>,

        /// Pass: "first" (|r| > 0.925) or "subsequent" (|r| > 0.85)
        #[arg(long, default_value = "first")]
        pass: String,

        /// Explicit absolute-correlation threshold, overrides --pass
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Tune and score the final model on a feature subset
    Fit {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        forest: ForestArgs,

        #[command(flatten)]
        split: SplitArgs,

        /// Comma-separated predictors to keep
        #[arg(long, value_delimiter = ',', conflicts_with = "top")]
        features: Vec<String>,

        /// Keep the k best-ranked predictors of the experiment's rank table
        #[arg(long)]
        top: Option<usize>,

        /// Rank table used with --top (defaults to the experiment's)
        #[arg(long)]
        ranks: Option<PathBuf>,

        /// Also score the final forest on its out-of-bag rows
        #[arg(long)]
        oob: bool,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct RunOutput {
    experiment: String,
    n_rows: usize,
    n_predictors: usize,
    resumed: Vec<usize>,
    computed: Vec<usize>,
    best_subset_size: Option<usize>,
    top_features: Vec<String>,
}

#[derive(Serialize)]
struct TidyOutput {
    experiment: String,
    n_checkpoints: usize,
    subset_sizes: Vec<usize>,
    best_subset_size: Option<usize>,
}

#[derive(Serialize)]
struct PruneOutput {
    experiment: String,
    top: usize,
    threshold: f64,
    n_pairs: usize,
    dropped: Vec<String>,
    n_remaining: usize,
}

#[derive(Serialize)]
struct FitOutput {
    experiment: String,
    features: Vec<String>,
    n_train: usize,
    n_holdout: usize,
    test_rmse: f64,
    test_r_squared: f64,
    null_rmse: f64,
    oob_rmse: Option<f64>,
    oob_r_squared: Option<f64>,
}

fn parse_importance(s: &str) -> Result<ImportanceKind> {
    match s {
        "impurity" => Ok(ImportanceKind::Impurity),
        "permutation" => Ok(ImportanceKind::Permutation),
        other => anyhow::bail!("unknown importance: {other} (expected impurity or permutation)"),
    }
}

fn parse_split_method(s: &str) -> Result<SplitMethod> {
    match s {
        "exact" => Ok(SplitMethod::Exact),
        "extra-trees" => Ok(SplitMethod::ExtraTrees),
        other => anyhow::bail!("unknown split method: {other} (expected exact or extra-trees)"),
    }
}

fn parse_null_baseline(s: &str) -> Result<NullBaseline> {
    match s {
        "holdout" => Ok(NullBaseline::Holdout),
        "internal-folds" => Ok(NullBaseline::InternalFolds),
        other => anyhow::bail!("unknown null baseline: {other} (expected holdout or internal-folds)"),
    }
}

fn parse_pass(s: &str, threshold: Option<f64>) -> Result<PrunePass> {
    if let Some(t) = threshold {
        anyhow::ensure!((0.0..=1.0).contains(&t), "threshold must be in [0, 1], got {t}");
        return Ok(PrunePass::Threshold(t));
    }
    match s {
        "first" => Ok(PrunePass::First),
        "subsequent" => Ok(PrunePass::Subsequent),
        other => anyhow::bail!("unknown pass: {other} (expected first or subsequent)"),
    }
}

fn read_dataset(data: &DataArgs) -> Result<Dataset> {
    let dataset = DatasetReader::new(&data.input, data.response.clone())
        .with_categorical(data.categorical.iter().cloned())
        .with_excluded(data.exclude.iter().cloned())
        .read()
        .with_context(|| format!("failed to read {}", data.input.display()))?;
    Ok(dataset)
}

fn writer_for(output: &OutputArgs) -> Result<ResultWriter> {
    let experiment = ExperimentName::new(output.experiment.clone())?;
    ResultWriter::new(&output.output_dir, experiment).context("failed to prepare output directory")
}

fn build_trainer(forest: &ForestArgs, seed: u64, oob: OobMode) -> Result<ForestTrainer> {
    let base = RandomForestConfig::new(forest.trees)?
        .with_split_method(parse_split_method(&forest.split_method)?)
        .with_oob_mode(oob)
        .with_seed(seed);
    let rules: Vec<MaxFeatures> = ForestGrid::default().mtry_rules().to_vec();
    let grid = ForestGrid::new(rules, vec![forest.min_samples_leaf])?;
    Ok(ForestTrainer::new(base)
        .with_grid(grid)
        .with_importance(parse_importance(&forest.importance)?))
}

fn best_subset_size(writer: &ResultWriter) -> Result<usize> {
    let path = writer.path_for("performance.json");
    let performance: PerformanceTable = read_json(&path)
        .with_context(|| format!("failed to read performance table {}", path.display()))?;
    performance
        .best_subset_size(Metric::Rmse)
        .context("performance table has no holdout RMSE rows")
}

fn load_ranks(writer: &ResultWriter, path: Option<&Path>) -> Result<RankTable> {
    let path = path.map_or_else(|| writer.path_for("ranks.json"), Path::to_path_buf);
    read_json(&path).with_context(|| format!("failed to read rank table {}", path.display()))
}

fn write_tables(
    writer: &ResultWriter,
    performance: &PerformanceTable,
    ranks: &RankTable,
) -> Result<()> {
    let perf_path = writer.write_json("performance.json", performance)?;
    let ranks_path = writer.write_json("ranks.json", ranks)?;
    info!(
        performance = %perf_path.display(),
        ranks = %ranks_path.display(),
        "tables written"
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let threads = cli.threads.unwrap_or_else(rayon::current_num_threads);

    match cli.command {
        Command::Run {
            data,
            output,
            forest,
            split,
            schedule,
            resamples,
            null_baseline,
        } => {
            let dataset = read_dataset(&data)?;
            let writer = writer_for(&output)?;

            let resampling = ResampleConfig::new(split.train_fraction, resamples)?
                .with_groups(split.groups)
                .with_seed(cli.seed);
            let config = RfeConfig::new(SubsetSchedule::new(schedule)?, resampling)
                .with_cv_folds(forest.cv_folds)
                .with_null_baseline(parse_null_baseline(&null_baseline)?)
                .with_seed(cli.seed);

            let pool = WorkerPool::new(threads).context("failed to build worker pool")?;
            let store = CheckpointStore::new(&writer.checkpoint_dir(), writer.experiment().clone())?;
            let engine = RfeEngine::new(
                build_trainer(&forest, cli.seed, OobMode::Disabled)?,
                config,
                &pool,
                store,
            )?;

            let run = engine.run(&dataset).context("elimination failed")?;
            let checkpoints = engine.store().load_completed(resamples)?;
            let (performance, ranks) = tidy(&checkpoints)?;
            write_tables(&writer, &performance, &ranks)?;

            let output = RunOutput {
                experiment: output.experiment,
                n_rows: dataset.n_rows(),
                n_predictors: dataset.n_predictors(),
                resumed: run.resumed,
                computed: run.computed,
                best_subset_size: performance.best_subset_size(Metric::Rmse),
                top_features: ranks.top(10),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Tidy { output, resamples } => {
            let writer = writer_for(&output)?;
            let store = CheckpointStore::new(&writer.checkpoint_dir(), writer.experiment().clone())?;
            let checkpoints = store
                .load_completed(resamples)
                .context("failed to load checkpoints")?;
            let (performance, ranks) = tidy(&checkpoints)?;
            write_tables(&writer, &performance, &ranks)?;

            let output = TidyOutput {
                experiment: output.experiment,
                n_checkpoints: checkpoints.len(),
                subset_sizes: performance.subset_sizes(),
                best_subset_size: performance.best_subset_size(Metric::Rmse),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Prune {
            data,
            output,
            ranks,
            top,
            pass,
            threshold,
        } => {
            let dataset = read_dataset(&data)?;
            let writer = writer_for(&output)?;
            let ranks = load_ranks(&writer, ranks.as_deref())?;
            let top = match top {
                Some(k) => k,
                None => best_subset_size(&writer)?,
            };
            let reduced = select_top(&dataset, &ranks, top)?;

            let matrix = CorrelationMatrix::from_dataset(&reduced);
            let report = prune(&matrix, &ranks, parse_pass(&pass, threshold)?)?;
            let pruned = report.apply(&reduced)?;
            writer.write_json("prune.json", &report)?;
            let csv_path = writer.write_dataset("pruned.csv", &pruned)?;
            info!(path = %csv_path.display(), "pruned dataset written");

            let output = PruneOutput {
                experiment: output.experiment,
                top,
                threshold: report.threshold,
                n_pairs: report.pairs.len(),
                dropped: report.dropped,
                n_remaining: pruned.n_predictors(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Fit {
            data,
            output,
            forest,
            split,
            features,
            top,
            ranks,
            oob,
        } => {
            let dataset = read_dataset(&data)?;
            let writer = writer_for(&output)?;

            let selected = match top {
                Some(k) => load_ranks(&writer, ranks.as_deref())?.top(k),
                None if features.is_empty() => dataset.predictor_names(),
                None => features,
            };
            let dataset = dataset
                .select_predictors(&selected)
                .context("unknown feature in selection")?;

            let split = ResampleConfig::new(split.train_fraction, 1)?
                .with_groups(split.groups)
                .with_seed(cli.seed);
            let oob = if oob { OobMode::Enabled } else { OobMode::Disabled };
            let trainer = build_trainer(&forest, cli.seed, oob)?;
            let pool = WorkerPool::new(threads).context("failed to build worker pool")?;
            let fitted = pool
                .install(|| fit_final(&trainer, &dataset, &split, forest.cv_folds, cli.seed))
                .context("final fit failed")?;

            fitted
                .model
                .save(writer.model_path())
                .context("failed to save model")?;
            info!(path = %writer.model_path().display(), "model saved");
            writer.write_json("final.json", &fitted.report)?;

            let report = fitted.report;
            let output = FitOutput {
                experiment: output.experiment,
                features: report.features,
                n_train: report.n_train,
                n_holdout: report.holdout.len(),
                test_rmse: report.test.rmse,
                test_r_squared: report.test.r_squared,
                null_rmse: report.null.rmse,
                oob_rmse: report.oob.map(|m| m.rmse),
                oob_r_squared: report.oob.map(|m| m.r_squared),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
