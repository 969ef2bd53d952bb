//! CLI entry point for bnd-csharp.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

/// bnd-csharp — generate C# bindings and wrapper classes from C headers.
#[derive(Parser, Debug)]
#[command(name = "bnd-csharp", version, about)]
struct Cli {
    /// Root of the native source tree.
    #[arg(default_value = "../cef")]
    source: PathBuf,

    /// Output directory; cleared before writing.
    #[arg(short, long, default_value = "../Generated")]
    out: PathBuf,

    /// Use stdcall for every native callback regardless of platform.
    #[arg(long)]
    stdcall: bool,

    /// Path to the bnd-csharp.toml configuration file
    /// (default: `<source>/bnd-csharp.toml` if it exists).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bnd_csharp=info")),
        )
        .init();

    let cli = Cli::parse();
    match bnd_csharp::run(&cli.source, &cli.out, cli.stdcall, cli.config.as_deref()) {
        Ok(files) => info!(files, out = %cli.out.display(), "done"),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(-1);
        }
    }
}
