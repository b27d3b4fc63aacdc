use clap::{Parser, Subcommand};
use imgpipe::config::{self, Configuration};
use imgpipe::imaging::{Quality, RustBackend};
use imgpipe::transform::FileTransformer;
use imgpipe::{output, stream};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Shared flag for commands that read a pipeline configuration.
#[derive(clap::Args, Clone)]
struct ConfigArgs {
    /// Pipeline configuration (.json or .toml); key order is application order
    #[arg(long, short)]
    config: PathBuf,

    /// Override the configured output format (jpeg, png, webp, tiff, avif)
    #[arg(long)]
    output: Option<String>,
}

#[derive(Parser)]
#[command(name = "imgpipe")]
#[command(about = "Apply a declarative image pipeline to a tree of images")]
#[command(long_about = "\
Apply a declarative image pipeline to a tree of images

The configuration maps operation names to arguments. Operations run in the
order they are written:

  {
    \"extract\": { \"left\": 0, \"top\": 0, \"width\": 800, \"height\": 600 },
    \"resize\":  [400, null, { \"fit\": \"inside\" }],
    \"scale\":   [0.5, null],
    \"rotate\":  true,
    \"output\":  \"webp\"
  }

At least one of resize, extract or scale is required. `output` converts the
result and renames its extension. Unknown operations are skipped with a
warning.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transform every image under --source into --dest
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        /// Source directory
        #[arg(long, default_value = "src")]
        source: PathBuf,

        /// Destination directory
        #[arg(long, default_value = "dist")]
        dest: PathBuf,

        /// Let the decoder read files from disk instead of loading them up front
        #[arg(long)]
        from_path: bool,

        /// Max parallel workers (default: all cores)
        #[arg(long)]
        jobs: Option<usize>,

        /// Lossy encoding quality for JPEG and AVIF output, 1-100
        #[arg(long, default_value_t = 90)]
        quality: u32,
    },
    /// Print the compiled steps of a configuration
    Plan(ConfigArgs),
    /// Validate a configuration without touching any image
    Check(ConfigArgs),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            source,
            dest,
            from_path,
            jobs,
            quality,
        } => {
            let configuration = load_configuration(&config)?;
            let backend = RustBackend::with_quality(Quality::new(quality));
            let transformer = FileTransformer::with_backend(backend, &configuration)?;
            init_thread_pool(jobs);

            println!("==> Gathering {}", source.display());
            let records = stream::gather(&source, !from_path)?;
            println!("==> Transforming {} files", records.len());

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_file_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let results = stream::run(&transformer, records, Some(tx));
            printer.join().ok();

            let (written, write_errors) = stream::write_all(&dest, &results);
            let failed = results.len() - written;
            println!(
                "==> {} → {}",
                output::format_summary(written, failed),
                dest.display()
            );
            if !write_errors.is_empty() {
                println!("    {} of the failures were write errors", write_errors.len());
            }
            if failed > 0 {
                return Err(format!("{failed} files failed").into());
            }
        }
        Command::Plan(config) => {
            let configuration = load_configuration(&config)?;
            let transformer = FileTransformer::new(&configuration)?;
            for line in output::format_plan(transformer.pipeline()) {
                println!("{}", line);
            }
        }
        Command::Check(config) => {
            let configuration = load_configuration(&config)?;
            FileTransformer::new(&configuration)?;
            println!("==> {} is valid", config.config.display());
        }
    }

    Ok(())
}

/// Load the configuration file and layer any command-line overrides on top.
fn load_configuration(args: &ConfigArgs) -> Result<Configuration, config::ConfigError> {
    let mut value = config::load(&args.config)?;
    if let Some(format) = args.output.as_ref().filter(|_| value.is_object()) {
        value = config::merge(&value, &json!({ "output": format }));
    }
    Configuration::from_value(&value)
}

/// Initialize the rayon thread pool.
///
/// Caps at the number of available CPU cores: users can constrain down, not up.
fn init_thread_pool(jobs: Option<usize>) {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let threads = jobs.map(|n| n.clamp(1, cores)).unwrap_or(cores);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
