use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiftiff::cache::{CacheManager, CacheSettings};
use tiftiff::config::{self, ConfigStore, ProcessingOptions};
use tiftiff::geo::{COMMON_CRS, GeoTransformEngine, Verbosity};
use tiftiff::logger::{self, AsyncLogger, LogLevel, LoggerConfig};
use tiftiff::metadata::{self, MetadataExtractor};
use tiftiff::process::BatchOrchestrator;
use tiftiff::{output, scan};

#[derive(Parser)]
#[command(name = "tiftiff")]
#[command(about = "Batch raster conversion and GeoTIFF reprojection")]
#[command(long_about = "\
Batch raster conversion and GeoTIFF reprojection

Inputs may be files or directories. A directory contributes the .tif, .tiff,
.png, .jpg, .jpeg and .bmp files directly inside it.

Conversion pipeline (per file):

  load → brightness → contrast → saturation → remove black/white → resize → save

With geo handling enabled, TIFF inputs are also reprojected to the target CRS
and saved as a georeferenced raster next to (or instead of) the pixel output.

Conversion settings come from the settings store ('tiftiff config list') or,
with --options, from a TOML run file:

  output_format = \".png\"
  scale_ratio = 0.5
  remove_black = true

  [geo]
  enable_reproject = true
  preserve_geospatial = true
  target_crs = \"EPSG:4326\"")]
#[command(version)]
struct Cli {
    /// Settings file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Append log entries to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Show debug entries in the log stream
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Adjust, resize and re-encode images
    Convert {
        /// Files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
        /// TOML run file; overrides the settings store
        #[arg(long)]
        options: Option<PathBuf>,
        /// Maximum number of parallel workers
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Reproject GeoTIFFs into another CRS
    Reproject {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        /// Target CRS, e.g. EPSG:4326
        #[arg(long, default_value = "EPSG:4326")]
        target_crs: String,
        /// Log each reprojection step
        #[arg(long)]
        steps: bool,
    },
    /// Print the CRS embedded in each file
    DetectCrs {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Export per-file metadata as CSV and/or JSON
    Metadata {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Read or change stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Inspect or clear the cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// List the common CRS codes
    CrsList,
}

#[derive(Subcommand)]
enum ConfigAction {
    Get { key: String },
    /// Values are parsed as JSON, falling back to a plain string
    Set { key: String, value: String },
    List,
    Reset,
}

#[derive(Subcommand)]
enum CacheAction {
    Info,
    Clear {
        /// Only clear entries in this category
        #[arg(long)]
        category: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logger::init_tracing();

    let logger = Arc::new(AsyncLogger::new(LoggerConfig {
        log_file: cli.log_file.clone(),
        min_level: if cli.verbose { LogLevel::Debug } else { LogLevel::Info },
        ..LoggerConfig::default()
    })?);

    let cache_dir = cli
        .cache_dir
        .clone()
        .unwrap_or_else(CacheSettings::default_location);
    let cache = CacheManager::open(CacheSettings::new(cache_dir))?;
    let config_path = cli.config.clone().unwrap_or_else(ConfigStore::default_path);

    let result = run(cli.command, &logger, &cache, &config_path);
    logger.shutdown();
    result
}

fn run(
    command: Command,
    logger: &Arc<AsyncLogger>,
    cache: &CacheManager,
    config_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Convert {
            inputs,
            output: output_dir,
            options,
            workers,
        } => {
            let mut options = match options {
                Some(path) => config::load_options(&path)?,
                None => {
                    let store = ConfigStore::open(config_path, cache.clone());
                    ProcessingOptions::from_config(&store)?
                }
            };
            if workers.is_some() {
                options.max_workers = workers;
            }
            let files = scan::collect_inputs(&inputs)?;

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_process_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let orchestrator = BatchOrchestrator::new(Arc::clone(logger)).with_events(tx);
            let report = orchestrator.run_detailed(&files, &output_dir, &options);
            drop(orchestrator);
            let _ = printer.join();
            report?;
        }
        Command::Reproject {
            inputs,
            output: output_dir,
            target_crs,
            steps,
        } => {
            let files = scan::collect_inputs(&inputs)?;
            std::fs::create_dir_all(&output_dir)?;
            let verbosity = if steps { Verbosity::Steps } else { Verbosity::Quiet };
            let engine = GeoTransformEngine::new(Arc::clone(logger)).with_verbosity(verbosity);
            let outcomes = engine.batch_reproject(&files, &output_dir, &target_crs);
            logger.flush();
            output::print_reproject_output(&outcomes, &target_crs);
        }
        Command::DetectCrs { inputs } => {
            let files = scan::collect_inputs(&inputs)?;
            let engine = GeoTransformEngine::new(Arc::clone(logger));
            for file in &files {
                let crs = engine.detect_crs(file);
                logger.flush();
                println!("{}", output::format_detect_crs(file, crs.as_deref()));
            }
        }
        Command::Metadata { inputs, csv, json } => {
            if csv.is_none() && json.is_none() {
                return Err("metadata needs --csv and/or --json".into());
            }
            let files = scan::collect_inputs(&inputs)?;
            let extractor = MetadataExtractor::new(Arc::clone(logger));
            let records = extractor.extract_batch(&files);
            let mut written = Vec::new();
            if let Some(path) = &csv {
                metadata::save_csv(&records, path)?;
                written.push(path.as_path());
            }
            if let Some(path) = &json {
                metadata::save_json(&records, path)?;
                written.push(path.as_path());
            }
            logger.flush();
            output::print_metadata_summary(&metadata::summarize(records.values()), &written);
        }
        Command::Config { action } => {
            let store = ConfigStore::open(config_path, cache.clone());
            match action {
                ConfigAction::Get { key } => {
                    println!("{}", output::format_config_value(&key, store.get(&key).as_ref()));
                }
                ConfigAction::Set { key, value } => {
                    let value = serde_json::from_str(&value)
                        .unwrap_or(serde_json::Value::String(value));
                    if !store.set(&key, value, true) {
                        return Err(format!("failed to save {}", store.path().display()).into());
                    }
                    println!("{}", output::format_config_value(&key, store.get(&key).as_ref()));
                }
                ConfigAction::List => output::print_config_list(&store.get_all()),
                ConfigAction::Reset => {
                    if !store.reset(true) {
                        return Err(format!("failed to save {}", store.path().display()).into());
                    }
                    output::print_config_list(&store.get_all());
                }
            }
        }
        Command::Cache { action } => match action {
            CacheAction::Info => output::print_cache_info(cache.cache_dir(), &cache.get_cache_info()),
            CacheAction::Clear { category } => {
                let removed = cache.clear_cache(category.as_deref());
                println!("Removed {removed} cache entries");
            }
        },
        Command::CrsList => output::print_crs_list(COMMON_CRS),
    }
    Ok(())
}
