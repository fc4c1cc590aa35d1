mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{command, Parser};
use cuda_setup::evaluate;
use cuda_setup::TracingSink;

#[cfg(windows)]
const DEFAULT_CUDART: &str = "cudart64_110.dll";
#[cfg(not(windows))]
const DEFAULT_CUDART: &str = "libcudart.so";

/// Probes the CUDA driver and runtime and prints which bitsandbytes binary
/// variant this machine should load.
#[derive(Parser)]
#[command(about, long_about)]
struct Cli {
    /// Path to the CUDA runtime library, as produced by the path resolver.
    /// Defaults to the platform soname so the OS loader search path applies.
    #[arg(long, env = "CUDART_PATH", value_hint = clap::ValueHint::FilePath)]
    cudart_path: Option<PathBuf>,

    /// Print the full probe result as JSON instead of just the binary name.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();
    let cudart_path = cli
        .cudart_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CUDART));

    let result = evaluate(Some(&cudart_path), &TracingSink);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.binary_name);
    }
    Ok(())
}
