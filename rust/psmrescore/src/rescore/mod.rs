//! Runs the external classifier and turns its output into the final ranked
//! assignment tables.

pub mod method;
pub mod reattach;

pub use method::{
    IDENTIFIER_COLUMN,
    MethodProfile,
    RescoreMethod,
    RescorePaths,
};
pub use reattach::{
    decode_accession_strata,
    encode_accession_strata,
    reattach,
    split_identifier_columns,
};

use crate::columns;
use crate::config::{
    ClassifierConfig,
    PipelineConfig,
    ResultsExport,
};
use crate::errors::{
    RescoreError,
    Result,
};
use crate::identifiers::strip_flanking_residues;
use crate::table::Table;
use std::fs::File;
use std::io::Read;
use std::path::{
    Path,
    PathBuf,
};
use std::process::{
    Child,
    Command,
    ExitStatus,
    Stdio,
};
use std::time::{
    Duration,
    Instant,
};
use tracing::{
    debug,
    info,
    warn,
};

/// File root of the final classifier run.
pub const FINAL_PREFIX: &str = "final";

const TIMEOUT_POLL: Duration = Duration::from_millis(50);

/// Runs the classifier on `{output_dir}/{input_filename}` and parses the
/// requested export.
///
/// Peptides come back with their flanking residues stripped and the
/// identifier column under [`IDENTIFIER_COLUMN`]. A non-zero exit is fatal.
#[tracing::instrument(skip_all, fields(method = %method))]
pub fn rescore(
    output_dir: &Path,
    input_filename: &str,
    fdr: f64,
    method: RescoreMethod,
    output_prefix: &str,
    export: ResultsExport,
    classifier: &ClassifierConfig,
) -> Result<Table> {
    let paths = RescorePaths::new(output_dir, input_filename, output_prefix, method);
    let st = Instant::now();
    run_classifier(method, &paths, fdr, classifier)?;
    info!("Rescoring with {} finished in {:?}", method, st.elapsed());

    read_classifier_output(paths.export(export), &method.profile())
}

/// Parses one tab-separated classifier export.
pub fn read_classifier_output(path: &Path, profile: &MethodProfile) -> Result<Table> {
    let file = File::open(path).map_err(|e| RescoreError::io(e, path))?;
    let mut table = Table::from_reader_spilling_last(file, b'\t', ";")?;
    table.map_column(columns::PEPTIDE, strip_flanking_residues)?;
    if let Some(output_id) = profile.output_identifier {
        table.rename_column(output_id, profile.identifier);
    }
    debug!("Read {} rows from {}", table.len(), path.display());
    Ok(table)
}

fn run_classifier(
    method: RescoreMethod,
    paths: &RescorePaths,
    fdr: f64,
    config: &ClassifierConfig,
) -> Result<()> {
    let program = config
        .executable
        .clone()
        .unwrap_or_else(|| PathBuf::from(method.program()));
    let args = method.command_args(paths, fdr, config.iterations);
    info!(
        "Running {} {}",
        program.display(),
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let log = File::create(&paths.log).map_err(|e| RescoreError::io(e, &paths.log))?;
    let mut child = Command::new(&program)
        .args(&args)
        .stdout(Stdio::from(log))
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| RescoreError::io(e, &program))?;

    // Drain stderr concurrently so a chatty classifier cannot block on a full pipe.
    let stderr = child.stderr.take();
    let stderr_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = stderr {
            if let Err(e) = pipe.read_to_end(&mut buf) {
                debug!("Stopped reading classifier stderr: {}", e);
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    });

    let program_name = program.display().to_string();
    let status = match config.timeout_secs {
        Some(secs) => wait_with_timeout(&mut child, Duration::from_secs(secs)),
        None => child.wait().map(Some),
    }
    .map_err(|e| RescoreError::io(e, &program))?;

    let Some(status) = status else {
        // Processes spawned by the classifier may still hold stderr open,
        // so the reader is left detached.
        warn!(
            "{} timed out, processes it started may still be running",
            program_name
        );
        return Err(RescoreError::ClassifierTimeout {
            program: program_name,
            seconds: config.timeout_secs.unwrap_or_default(),
        });
    };

    let stderr = stderr_reader.join().unwrap_or_default();
    if status.success() {
        return Ok(());
    }
    Err(RescoreError::ClassifierFailed {
        program: program_name,
        status: status.code(),
        log: paths.log.clone(),
        stderr: stderr.trim().to_string(),
    })
}

/// Waits for `child`, killing it once `timeout` has passed. `None` means killed.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        std::thread::sleep(TIMEOUT_POLL);
    }
}

/// Paths of the ranked tables written by [`finalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct FinalOutputs {
    pub assignments: PathBuf,
    pub n_assignments: usize,
    /// Only written for peptide level exports.
    pub psm_assignments: Option<PathBuf>,
    pub key_features: Vec<String>,
}

/// Reattaches features, canonicalizes names, selects the output columns and
/// ranks by final score.
pub fn build_final_table(
    classifier_output: &Table,
    all_features: &Table,
    config: &PipelineConfig,
    profile: &MethodProfile,
) -> Result<(Table, Vec<String>)> {
    let (mut enriched, key_features) = reattach(classifier_output, all_features, config, profile)?;
    enriched.rename_column(profile.score, columns::FINAL_SCORE);
    enriched.rename_column(profile.q_value, columns::FINAL_Q_VALUE);
    enriched.rename_column(profile.posterior_error_prob, columns::FINAL_POSTERIOR_ERROR_PROB);
    enriched.rename_column(profile.accession, columns::ACCESSION);

    let final_columns: Vec<&str> = [
        columns::SOURCE,
        columns::SCAN,
        columns::PEPTIDE,
        columns::MODIFIED_SEQUENCE,
        columns::FINAL_SCORE,
        columns::FINAL_Q_VALUE,
        columns::FINAL_POSTERIOR_ERROR_PROB,
    ]
    .into_iter()
    .chain(key_features.iter().map(String::as_str))
    .chain(std::iter::once(columns::ACCESSION))
    .collect();

    let mut output = enriched.select(&final_columns)?;
    output.sort_descending_by(columns::FINAL_SCORE)?;
    Ok((output, key_features))
}

/// Final rescoring of `final_input.tab` and the ranked output tables.
///
/// Writes `finalAssignments.csv` (PSM or peptide level, per
/// `resultsExport`) and, for peptide exports, `finalPsmAssignments.csv`.
/// Nothing is written unless every step succeeds.
#[tracing::instrument(skip_all)]
pub fn finalize(config: &PipelineConfig) -> Result<FinalOutputs> {
    let method = config.rescore_method;
    let profile = method.profile();
    let out = config.output_folder.as_path();

    let results = rescore(
        out,
        columns::FINAL_INPUT_FILE,
        config.fdr,
        method,
        FINAL_PREFIX,
        config.results_export,
        &config.classifier,
    )?;
    info!("Rescoring complete, {} rows", results.len());

    let all_features = Table::read_tsv(&out.join(columns::ALL_FEATURES_FILE))?;
    let (assignments, key_features) = build_final_table(&results, &all_features, config, &profile)?;

    let psm_assignments = match config.results_export {
        ResultsExport::Peptide => {
            let paths = RescorePaths::new(out, columns::FINAL_INPUT_FILE, FINAL_PREFIX, method);
            let psms = read_classifier_output(&paths.psms, &profile)?;
            Some(build_final_table(&psms, &all_features, config, &profile)?.0)
        }
        ResultsExport::Psm => None,
    };

    let psm_assignments_path = match psm_assignments {
        Some(table) => {
            let path = out.join(columns::FINAL_PSM_ASSIGNMENTS_FILE);
            table.write_csv(&path)?;
            info!("Wrote {} PSM assignments to {}", table.len(), path.display());
            Some(path)
        }
        None => None,
    };

    let assignments_path = out.join(columns::FINAL_ASSIGNMENTS_FILE);
    assignments.write_csv(&assignments_path)?;
    info!(
        "Final assignments ({} rows) written to {}",
        assignments.len(),
        assignments_path.display()
    );

    Ok(FinalOutputs {
        assignments: assignments_path,
        n_assignments: assignments.len(),
        psm_assignments: psm_assignments_path,
        key_features,
    })
}
