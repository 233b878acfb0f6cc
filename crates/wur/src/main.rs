//! WUR CLI - Wii U RPX static recompiler

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wur::{analyze, recompile_tests, Pipeline, RecompilerConfig, RpxImage};

#[derive(Parser)]
#[command(name = "wur")]
#[command(about = "Wii U RPX recompiler - statically recompiles RPX images to C++")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan an RPX for jump tables and write a switch-table TOML document
    Analyze {
        /// Input RPX file
        #[arg(value_name = "RPX")]
        input: PathBuf,

        /// Output TOML file
        #[arg(value_name = "TOML")]
        output: PathBuf,
    },
    /// Recompile an RPX into C++ translation units
    Recompile {
        /// Recompiler configuration TOML, or a directory of test images
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// PPC context header to bundle, or the batch output directory
        #[arg(value_name = "CONTEXT")]
        context: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("wur=info".parse().unwrap()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Analyze { input, output } => run_analyze(&input, &output),
        Commands::Recompile { config, context } => run_recompile(&config, &context),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn run_analyze(input: &PathBuf, output: &PathBuf) -> wur::Result<()> {
    let data = std::fs::read(input)
        .map_err(|source| wur::Error::Read { path: input.clone(), source })?;
    let image = RpxImage::parse(&data)?;
    info!(
        path = %input.display(),
        sections = image.sections.len(),
        base = format_args!("{:#010X}", image.base),
        "analyzing image"
    );

    let (doc, count) = analyze::scan_to_toml(&image);
    std::fs::write(output, doc)?;
    info!(switches = count, output = %output.display(), "analysis complete");
    Ok(())
}

fn run_recompile(config_path: &PathBuf, context_path: &PathBuf) -> wur::Result<()> {
    if !config_path.is_file() {
        info!(
            tests = %config_path.display(),
            output = %context_path.display(),
            "running batch test recompilation"
        );
        return recompile_tests(config_path, context_path);
    }

    let config = RecompilerConfig::load(config_path)?;
    config.validate()?;

    let context_header = std::fs::read_to_string(context_path)
        .map_err(|source| wur::Error::Read { path: context_path.clone(), source })?;

    let mut pipeline = Pipeline::load(config)?;
    info!("analyzing image");
    pipeline.discover();
    pipeline.rename_entry_symbol();

    info!("starting recompilation");
    pipeline.recompile(Some(&context_header))?;
    Ok(())
}
