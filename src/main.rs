use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rusty_loader::config;
use rusty_loader::{exit_code, print_info, ExtensionKey, Lifecycle, Loader, Symbol};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to loader configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Print resolved symbols as JSON
    #[arg(long)]
    json: bool,

    /// Initialize and tear down implicitly around each operation
    #[arg(long)]
    lazy: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load script files and resolve symbols across them
    Load {
        /// Script files to load, dispatched by extension
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Symbol to resolve after loading (repeatable)
        #[arg(short, long = "get")]
        symbols: Vec<String>,
    },

    /// Load source from stdin (or a file) as an in-memory buffer
    Eval {
        /// Extension selecting the language, e.g. `py`
        #[arg(short, long)]
        ext: String,

        /// Read the buffer from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Symbol to resolve after loading (repeatable)
        #[arg(short, long = "get")]
        symbols: Vec<String>,
    },

    /// Print version and build information
    Info,

    /// List supported file types
    ListSupported,

    /// Write a default configuration file
    InitConfig {
        /// Where to write it; defaults to the user config directory
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loader_config = config::load_config(cli.config.as_deref())?;
    if cli.lazy {
        loader_config.lifecycle = Some(Lifecycle::Lazy);
    }
    setup_logging(cli.verbose, loader_config.log_level.as_deref());

    let mut loader = loader_config.build_loader();
    info!("Loader lifecycle: {:?}", loader.lifecycle());

    let code = match cli.command {
        Commands::Load { files, symbols } => {
            with_lifecycle(&mut loader, |loader| {
                let mut status = 0;
                for file in &files {
                    let result = loader.load_from_file(file);
                    match &result {
                        Ok(()) => info!("Loaded {:?}", file),
                        Err(e) => {
                            error!("Failed to load {:?}: {}", file, e);
                            eprintln!("Failed to load {:?}: {}", file, e);
                        }
                    }
                    if status == 0 {
                        status = exit_code(&result);
                    }
                }
                resolve(loader, &symbols, cli.json).and(Ok(status))
            })?
        }

        Commands::Eval { ext, file, symbols } => {
            let buffer = read_buffer(file.as_ref())?;
            let extension = ExtensionKey::new(ext);
            with_lifecycle(&mut loader, |loader| {
                let result = loader.load_from_memory(&extension, &buffer);
                if let Err(e) = &result {
                    error!("Failed to load buffer: {}", e);
                    eprintln!("Failed to load buffer: {}", e);
                }
                resolve(loader, &symbols, cli.json).and(Ok(exit_code(&result)))
            })?
        }

        Commands::Info => {
            print!("{}", print_info());
            0
        }

        Commands::ListSupported => {
            println!("Supported file types:");
            for extension in loader.registry().factory().list_supported_extensions() {
                println!("- .{}", extension);
            }
            0
        }

        Commands::InitConfig { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Wrote default configuration to {:?}", written);
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}

/// Runs `f` with the registry initialized, then tears everything down the
/// way the loader's lifecycle asks for.
fn with_lifecycle(loader: &mut Loader, f: impl FnOnce(&mut Loader) -> Result<i32>) -> Result<i32> {
    if loader.lifecycle() == Lifecycle::Explicit {
        loader.initialize();
    }

    let outcome = f(loader);

    if let Err(e) = loader.unload() {
        error!("Failed to unload loaders: {}", e);
    }
    if loader.lifecycle() == Lifecycle::Explicit {
        loader.destroy();
    }

    outcome
}

fn resolve(loader: &mut Loader, names: &[String], json: bool) -> Result<()> {
    let resolved: Vec<(String, Option<Symbol>)> = names
        .iter()
        .map(|name| (name.clone(), loader.get(name)))
        .collect();

    if json {
        let symbols: Vec<Option<&Symbol>> =
            resolved.iter().map(|(_, symbol)| symbol.as_ref()).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&symbols).context("Failed to serialize symbols")?
        );
        return Ok(());
    }

    for (name, symbol) in &resolved {
        match symbol {
            Some(symbol) => println!(
                "{} ({} {}) {}:{}",
                symbol.name, symbol.extension, symbol.kind, symbol.origin, symbol.line
            ),
            None => println!("{}: not found", name),
        }
    }

    Ok(())
}

fn read_buffer(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("Failed to read buffer from {:?}", path))
        }
        None => {
            let mut buffer = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buffer)
                .context("Failed to read buffer from stdin")?;
            Ok(buffer)
        }
    }
}

fn setup_logging(verbose: bool, configured_level: Option<&str>) {
    let default_level = if verbose {
        "debug"
    } else {
        configured_level.unwrap_or("info")
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}
