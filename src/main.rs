use chrono::Local;
use clap::Parser;
use simple_press::config::{self, CONFIG_FILENAME, SiteConfig};
use simple_press::engine::EngineSettings;
use simple_press::output;
use simple_press::watch::{self, WatchLoop};
use std::fs::File;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "simple-press")]
#[command(about = "Pipeline-driven static content generator")]
#[command(long_about = "\
Pipeline-driven static content generator

Documents flow through named pipelines of steps: files are read from the
input folder, transformed (front matter, markdown, grouping, ordering) and
written to the output folder. Pipelines run in the order they are declared.

Folder structure:

  site/
  ├── config.toml        # Pipelines and metadata (optional)
  ├── input/             # Source files
  │   ├── index.md       # → output/index.html
  │   ├── posts/
  │   │   └── first.md   # → output/posts/first.html
  │   └── style.css      # → output/style.css (copied as-is)
  └── output/            # Generated site (emptied before every run)

Without a config.toml the stock configuration is used: markdown files are
rendered to HTML and every other file is copied. Run with --help to see
the flags, and see the documented stock configuration for the schema.")]
#[command(version = version_string())]
struct Cli {
    /// Root folder; input, output and config paths resolve against it
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Input folder (overrides the config)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Output folder (overrides the config)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Configuration file [default: <path>/config.toml]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep existing files in the output folder
    #[arg(long)]
    noclean: bool,

    /// Disable the execution cache
    #[arg(long)]
    nocache: bool,

    /// Re-execute when input files or the config change
    #[arg(long)]
    watch: bool,

    /// Preview server [force-ext] [port] (not available)
    #[arg(long, num_args = 0..=2, value_name = "ARGS")]
    preview: Option<Vec<String>>,

    /// Also write the log to a file [default: simple-press-<timestamp>.log]
    #[arg(long, num_args = 0..=1, value_name = "FILE")]
    log: Option<Option<PathBuf>>,

    /// Debug-level logging
    #[arg(long)]
    verbose: bool,

    /// Wait for Enter before starting
    #[arg(long)]
    pause: bool,

    /// Print the documented stock config.toml and exit
    #[arg(long)]
    gen_config: bool,
}

/// CLI flags that override configuration values.
#[derive(Clone)]
struct Overrides {
    root: PathBuf,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    noclean: bool,
    nocache: bool,
}

impl Overrides {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            root: cli.path.clone(),
            input: cli.input.clone(),
            output: cli.output.clone(),
            noclean: cli.noclean,
            nocache: cli.nocache,
        }
    }

    fn settings(&self, config: &SiteConfig) -> EngineSettings {
        let mut settings = config.engine_settings(&self.root);
        if let Some(input) = &self.input {
            settings.input_folder = input.clone();
        }
        if let Some(output) = &self.output {
            settings.output_folder = output.clone();
        }
        settings.no_cache = self.nocache;
        if self.noclean {
            settings.clean_output_on_execute = false;
        }
        settings
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.gen_config {
        print!("{}", config::stock_config_toml());
        return ExitCode::SUCCESS;
    }

    if let Err(e) = init_logging(&cli.path, cli.verbose, cli.log.as_ref()) {
        eprintln!("Error: could not open log file: {e}");
        return ExitCode::FAILURE;
    }

    if cli.pause {
        println!("Press Enter to continue...");
        let mut line = String::new();
        if let Err(e) = std::io::stdin().lock().read_line(&mut line) {
            warn!(error = %e, "could not read from stdin, continuing");
        }
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let overrides = Overrides::from_cli(cli);
    let config_path = cli
        .path
        .join(cli.config.as_deref().unwrap_or(Path::new(CONFIG_FILENAME)));

    let site_config = config::load_config(&config_path)?;
    let settings = overrides.settings(&site_config);
    output::print_folders(&settings, &config_path, config_path.exists());

    if cli.preview.is_some() {
        warn!("preview server is not available, ignoring --preview");
    }

    if !cli.watch {
        let mut engine = site_config.build_engine(settings)?;
        let summary = engine.execute()?;
        output::print_summary(&summary);
        return Ok(());
    }

    let input = settings.input_path();
    let factory_config = config_path.clone();
    let mut watch_loop = WatchLoop::new(move || {
        let site_config = config::load_config(&factory_config)?;
        Ok(site_config.build_engine(overrides.settings(&site_config))?)
    })
    .with_reporter(output::print_summary);
    watch_loop.start()?;
    watch::run(watch_loop, &input, &config_path)?;
    Ok(())
}

/// Log to stderr, and to a file when `--log` is given. The log file
/// resolves against the root folder.
///
/// `RUST_LOG` overrides the level chosen by `--verbose`.
fn init_logging(root: &Path, verbose: bool, log: Option<&Option<PathBuf>>) -> std::io::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match log {
        Some(path) => {
            let path = root.join(path.clone().unwrap_or_else(default_log_file));
            let file = File::create(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn default_log_file() -> PathBuf {
    let stamp = Local::now().format("%Y%m%d%H%M%S%3f");
    PathBuf::from(format!("simple-press-{stamp}.log"))
}
