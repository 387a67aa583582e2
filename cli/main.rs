#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use macropanel::config::{PipelineConfig, default_recognized_formats};
use macropanel::data::{load_raw_table, write_dataset};
use macropanel::outliers::DEFAULT_IQR_MULTIPLIER;
use macropanel::store::{DatasetQuery, PanelStore};

#[derive(Parser)]
#[command(
    name = "macropanel",
    about = "Prepare FRED-MD style macro panels for forecasting",
    long_about = "Applies per-series stationarity transforms, screens outliers, imputes gaps \
                 and slices the panel into train/test sets or ranks variables by PCA loading."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build one train/test dataset as described by a TOML configuration
    #[command(about = "Assemble a dataset (outputs: train.csv, test.csv)")]
    Dataset {
        /// Path to the raw FRED-MD CSV file
        raw_data: PathBuf,

        /// Path to the pipeline configuration (.toml)
        #[arg(long)]
        config: PathBuf,

        /// Directory that receives train.csv and test.csv
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Rank the derived panel's variables by their first-component loading
    Rank {
        /// Path to the raw FRED-MD CSV file
        raw_data: PathBuf,

        /// Source tag that selects the format policy (defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        /// Number of variables to keep
        #[arg(long, short = 'k', default_value = "10")]
        k: usize,

        /// Skip the outlier screen
        #[arg(long)]
        no_outliers: bool,

        /// Skip mean imputation
        #[arg(long)]
        no_impute: bool,

        /// Multiplier on the IQR for the outlier band
        #[arg(long, default_value_t = DEFAULT_IQR_MULTIPLIER)]
        outlier_multiplier: f64,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Dataset {
            raw_data,
            config,
            out_dir,
        } => dataset_command(&raw_data, &config, out_dir.as_deref()),
        Commands::Rank {
            raw_data,
            name,
            k,
            no_outliers,
            no_impute,
            outlier_multiplier,
        } => rank_command(
            &raw_data,
            name,
            k,
            !no_outliers,
            !no_impute,
            outlier_multiplier,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn dataset_command(
    raw_path: &Path,
    config_path: &Path,
    out_dir: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::load(config_path)?;
    let raw = load_raw_table(raw_path)?;
    let mut store = PanelStore::initialize_with_formats(
        raw,
        &config.name,
        config.begin,
        config.end,
        &config.recognized_formats,
    )?;

    if store.derived().is_some() {
        if config.remove_outliers {
            store.remove_outliers(config.outlier_multiplier()?)?;
        }
        if config.impute {
            store.impute_missing()?;
        }
    }

    let mut query = DatasetQuery::new(&config.dependent).view(config.view);
    if let Some(columns) = config.columns.as_deref() {
        query = query.with_columns(columns);
    }
    let dataset = store.create_dataset(&query)?;

    println!(
        "Train: {} rows x {} features | Test: {} rows, label {} = {}",
        dataset.train_features.n_rows(),
        dataset.train_features.n_columns(),
        dataset.test_features.n_rows(),
        config.dependent,
        dataset.test_label
    );

    if let Some(k) = config.top_k {
        let ranked = store.rank_top_variables(k)?;
        println!(
            "Top {} variables ({:.2}% variance): {}",
            k,
            ranked.cumulative_explained_percent,
            ranked.names.join(", ")
        );
    }

    if let Some(dir) = out_dir {
        fs::create_dir_all(dir)?;
        write_dataset(dir, &config.dependent, &dataset)?;
        println!("Dataset written to {}", dir.display());
    }
    Ok(())
}

fn rank_command(
    raw_path: &Path,
    name: Option<String>,
    k: usize,
    remove_outliers: bool,
    impute: bool,
    outlier_multiplier: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = name.unwrap_or_else(|| {
        raw_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let raw = load_raw_table(raw_path)?;
    let (begin, end) = match raw_bounds(&raw.date_labels) {
        Some(bounds) => bounds,
        None => return Err("the raw table holds no parsable dates".into()),
    };
    let mut store = PanelStore::initialize_with_formats(
        raw,
        &name,
        begin,
        end,
        &default_recognized_formats(),
    )?;

    if remove_outliers {
        store.remove_outliers(outlier_multiplier)?;
    }
    if impute {
        store.impute_missing()?;
    }
    let ranked = store.rank_top_variables(k)?;

    for (rank, variable) in ranked.names.iter().enumerate() {
        println!("{:>3}. {}", rank + 1, variable);
    }
    println!(
        "Cumulative explained variance of {} components: {:.2}%",
        k, ranked.cumulative_explained_percent
    );
    Ok(())
}

/// First and last parsable dates, used as default store bounds for ranking.
fn raw_bounds(labels: &[String]) -> Option<(chrono::NaiveDate, chrono::NaiveDate)> {
    let mut dates = labels.iter().filter_map(|l| macropanel::data::parse_date(l));
    let first = dates.next()?;
    let last = dates.last().unwrap_or(first);
    Some((first, last))
}
