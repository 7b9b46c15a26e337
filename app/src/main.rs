mod cli;
mod commands;
mod config;

use std::{fs, path::PathBuf};

use anyhow::Context as _;
use clap::Parser;
use cli::Cli;
use directories::BaseDirs;

type Result<T> = anyhow::Result<T>;

fn main() {
    if let Err(err) = run() {
        eprintln!("pamigrate failed: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let config_dir = resolve_config_dir()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(commands::dispatch(cli, &config_dir))
}

fn init_tracing() {
    use std::sync::OnceLock;
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    });
}

fn resolve_config_dir() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().context("Unable to determine config directory")?;
    let dir_name = if cfg!(target_os = "linux") {
        "pamigrate"
    } else {
        "PaMigrate"
    };
    let dir = base_dirs.config_dir().join(dir_name);
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(dir)
}
