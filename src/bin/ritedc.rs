//! `ritedc`: the command-line driver. Takes a single
//! compiled `.mrb` file and prints its reconstructed source to stdout.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rite_decompile::config::DecompilerOptions;

/// Reconstructs Ruby-like source from a compiled Rite (mruby) bytecode file.
#[derive(Debug, Parser)]
#[command(name = "ritedc", version, about)]
struct Cli {
    /// Path to the `.mrb` file to decompile.
    file: PathBuf,

    /// Strip line-comment passthrough from the output.
    #[arg(long)]
    no_comments: bool,

    /// Treat an unrecognized jump shape as a soft diagnostic (default).
    #[arg(long, conflicts_with = "strict_jumps")]
    tolerant_jumps: bool,

    /// Treat an unrecognized jump shape as a fatal error.
    #[arg(long, conflicts_with = "tolerant_jumps")]
    strict_jumps: bool,

    /// Load decompiler options from a TOML config file, overriding defaults
    /// for any field the file sets (flags above still override the file).
    #[cfg(feature = "config-file")]
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut options = load_options(&cli);
    if cli.no_comments {
        options.include_comments = false;
    }
    if cli.strict_jumps {
        options.tolerant_jumps = false;
    } else if cli.tolerant_jumps {
        options.tolerant_jumps = true;
    }

    match run(&cli.file, &options) {
        Ok(text) => {
            print!("{text}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("ritedc: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "config-file")]
fn load_options(cli: &Cli) -> DecompilerOptions {
    match &cli.config {
        Some(path) => match DecompilerOptions::from_toml_file(path) {
            Ok(options) => options,
            Err(err) => {
                eprintln!("ritedc: {err}; falling back to defaults");
                DecompilerOptions::default()
            }
        },
        None => DecompilerOptions::default(),
    }
}

#[cfg(not(feature = "config-file"))]
fn load_options(_cli: &Cli) -> DecompilerOptions {
    DecompilerOptions::default()
}

fn run(path: &PathBuf, options: &DecompilerOptions) -> Result<String, rite_decompile::error::DecompileError> {
    let bytes = std::fs::read(path).unwrap_or_else(|err| {
        eprintln!("ritedc: failed to read {}: {err}", path.display());
        std::process::exit(1);
    });
    rite_decompile::decompile(&bytes, options)
}
