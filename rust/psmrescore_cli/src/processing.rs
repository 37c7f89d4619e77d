use crate::errors::CliError;
use psmrescore::binding::predict_binding;
use psmrescore::{
    PipelineConfig,
    Table,
    calibrate_table,
    finalize,
    rescore,
};
use std::path::Path;
use std::time::Instant;
use tracing::info;

pub fn run_calibrate(
    config: &PipelineConfig,
    input: &Path,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let st = Instant::now();
    let mut table = Table::read_tsv(input)?;
    info!("Read {} PSMs from {}", table.len(), input.display());

    let reports = calibrate_table(&mut table, config)?;
    for (scan_file, report) in reports.iter() {
        info!(
            "{}: {:?} with {} linear fits",
            scan_file,
            report.path,
            report.linear_fits().count()
        );
    }

    let output = output.unwrap_or(input);
    table.write_tsv(output)?;
    info!("Wrote calibrated table to {} in {:?}", output.display(), st.elapsed());
    Ok(())
}

pub fn run_predict_binding(config: &PipelineConfig) -> Result<(), CliError> {
    let outputs = predict_binding(config)?;
    println!("Wrote {} binding prediction files", outputs.len());
    Ok(())
}

pub fn run_rescore(config: &PipelineConfig, input: &str, prefix: &str) -> Result<(), CliError> {
    let results = rescore(
        &config.output_folder,
        input,
        config.fdr,
        config.rescore_method,
        prefix,
        config.results_export,
        &config.classifier,
    )?;
    println!(
        "Rescored with {}: {} {:?} level results",
        config.rescore_method,
        results.len(),
        config.results_export
    );
    Ok(())
}

pub fn run_finalize(config: &PipelineConfig) -> Result<(), CliError> {
    let outputs = finalize(config)?;
    println!(
        "Wrote {} final assignments to {}",
        outputs.n_assignments,
        outputs.assignments.display()
    );
    if let Some(path) = outputs.psm_assignments {
        println!("Wrote PSM level assignments to {}", path.display());
    }
    Ok(())
}
