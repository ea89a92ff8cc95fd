use clap::Parser;
use std::path::Path;

use cpu_reveal::cli::{self, Args, Command};
use cpu_reveal::config::Config;

/// Load .env file.
///
/// Loads environment variables from .env file in the working directory.
/// Does not override existing environment variables.
fn load_env() {
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();
}

/// Initialise logging. `RUST_LOG` wins over the default filter.
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "info" } else { "warn" };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());

    let mut builder = pretty_env_logger::formatted_builder();
    builder.parse_filters(&filter);
    let _ = builder.try_init();
}

fn load_config(path: Option<&Path>) -> Result<Config, String> {
    Config::load(path).map_err(|e| e.to_string())
}

fn run(args: Args) -> Result<(), String> {
    let config_path = args.config.as_deref();

    match args.command {
        Some(Command::Config { action }) => cli::handle_config_action(action, config_path),
        Some(Command::Check) => cli::run_check(),
        Some(Command::Generate(generate)) => {
            let config = load_config(config_path)?;
            block_on(cli::run_generate(generate, &config))
        }
        None => {
            let config = load_config(config_path)?;
            block_on(cli::run_interactive(&config))
        }
    }
}

/// Drive a future on a single-threaded runtime.
fn block_on<F>(future: F) -> Result<(), String>
where
    F: std::future::Future<Output = Result<(), String>>,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;
    rt.block_on(future)
}

fn main() {
    // Load .env file before anything else
    load_env();

    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
