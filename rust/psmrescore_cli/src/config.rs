use crate::cli::ConfigArgs;
use crate::errors::CliError;
use psmrescore::PipelineConfig;
use std::fs::File;
use std::io::{
    BufReader,
    BufWriter,
    Write,
};
use std::path::Path;

/// Reads the JSON config and applies the command line overrides.
pub fn load_config(args: &ConfigArgs) -> Result<PipelineConfig, CliError> {
    let file = File::open(&args.config).map_err(|source| CliError::Io {
        source,
        path: args.config.clone(),
    })?;
    let mut config: PipelineConfig = serde_json::from_reader(BufReader::new(file))?;

    if let Some(output_folder) = &args.output_folder {
        config.output_folder = output_folder.clone();
    }
    if let Some(method) = args.rescore_method {
        config.rescore_method = method;
    }
    if let Some(fdr) = args.fdr {
        config.fdr = fdr;
    }
    config.validate().map_err(CliError::Config)?;
    Ok(config)
}

pub fn template_config() -> PipelineConfig {
    let mut config = PipelineConfig::new("output");
    config.alleles = vec!["HLA-A*02:01".to_string(), "HLA-B*07:02".to_string()];
    config.accession_hierarchy = vec!["canonical".to_string(), "spliced".to_string()];
    config
}

pub fn write_template(path: &Path) -> Result<(), CliError> {
    let file = File::create(path).map_err(|source| CliError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &template_config())?;
    writer.flush().map_err(|source| CliError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    Ok(())
}
