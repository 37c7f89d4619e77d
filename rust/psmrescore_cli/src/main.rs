mod cli;
mod config;
mod errors;
mod processing;

use clap::Parser;
use cli::{
    Args,
    Commands,
};
use errors::CliError;
use psmrescore::PipelineConfig;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

fn prepare_output(config: &PipelineConfig) -> Result<(), CliError> {
    std::fs::create_dir_all(&config.output_folder).map_err(|source| CliError::Io {
        source,
        path: config.output_folder.clone(),
    })?;
    info!("Parsed configuration: {:#?}", config);
    Ok(())
}

fn main() -> std::result::Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        ) // This uses RUST_LOG environment variable
        .init();

    let args = Args::parse();

    match args.command {
        Commands::WriteTemplate(args) => {
            config::write_template(&args.output_path)?;
            println!("Wrote template config to {}", args.output_path.display());
        }
        Commands::Calibrate(args) => {
            let config = config::load_config(&args.config)?;
            prepare_output(&config)?;
            processing::run_calibrate(&config, &args.input, args.output.as_deref())?;
        }
        Commands::PredictBinding(args) => {
            let config = config::load_config(&args)?;
            prepare_output(&config)?;
            processing::run_predict_binding(&config)?;
        }
        Commands::Rescore(args) => {
            let config = config::load_config(&args.config)?;
            prepare_output(&config)?;
            processing::run_rescore(&config, &args.input, &args.prefix)?;
        }
        Commands::Finalize(args) => {
            let config = config::load_config(&args)?;
            prepare_output(&config)?;
            processing::run_finalize(&config)?;
        }
    }
    Ok(())
}
