use clap::{
    Parser,
    Subcommand,
};
use psmrescore::RescoreMethod;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add predicted retention time and deltaRT to a feature table.
    Calibrate(CalibrateArgs),
    /// Run the binding affinity predictor on every input length and allele.
    PredictBinding(ConfigArgs),
    /// Run the rescoring classifier on one feature matrix.
    Rescore(RescoreArgs),
    /// Final rescoring, feature reattachment and ranked output tables.
    Finalize(ConfigArgs),
    /// Write a template configuration file.
    WriteTemplate(WriteTemplateArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Output folder (will over-write the config file)
    #[arg(short, long)]
    pub output_folder: Option<PathBuf>,

    /// Rescoring method: mokapot, percolator or percolatorSeparate (will over-write the config file)
    #[arg(short = 'm', long)]
    pub rescore_method: Option<RescoreMethod>,

    /// Target false discovery rate (will over-write the config file)
    #[arg(short, long)]
    pub fdr: Option<f64>,
}

#[derive(Parser, Debug, Clone)]
pub struct CalibrateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Tab separated feature table to calibrate.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Where to write the calibrated table, defaults to over-writing the input.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct RescoreArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Feature matrix file name, relative to the output folder.
    #[arg(short, long)]
    pub input: String,

    /// File root of the classifier outputs.
    #[arg(short, long, default_value = "rescore")]
    pub prefix: String,
}

#[derive(Parser, Debug)]
pub struct WriteTemplateArgs {
    /// The path to the output file.
    #[arg(short, long)]
    pub output_path: PathBuf,
}
