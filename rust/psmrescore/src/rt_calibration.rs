//! Cross-validated retention time calibration and the `deltaRT` feature.
//!
//! For every PSM the expected retention time is predicted by a model that
//! never saw that PSM, and `deltaRT = |predicted - observed|`. Models are
//! trained only on confident target PSMs: label 1, primary accession
//! stratum (when strata exist), and a spectral angle above the configured
//! quantile of those.

use crate::columns;
use crate::config::{
    PipelineConfig,
    RtCalibrationConfig,
};
use crate::errors::{
    RescoreError,
    Result,
};
use crate::ml::{
    Fold,
    KFold,
};
use crate::psm::PsmRecord;
use crate::table::Table;
use rayon::prelude::*;
use rtcalib::{
    LinearFit,
    RetentionCoefficients,
};
use std::collections::BTreeMap;
use std::path::{
    Path,
    PathBuf,
};
use std::time::Instant;
use tracing::{
    debug,
    info,
    warn,
};

/// Scan-file identifier used when the whole table is calibrated at once.
pub const COMBINED_SCAN_FILE: &str = "combined";

/// Residues the additive model often never sees in immunopeptidomics data.
const FILLED_RESIDUES: [&str; 2] = ["C", "W"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPath {
    /// Observed retention time has at most one distinct value, `deltaRT` is 0.
    ConstantRetentionTime,
    /// Per fold linear fit of observed RT on library iRT.
    CrossValidatedLinear,
    /// Per fold additive retention coefficient model, used when any PSM lacks an iRT.
    CrossValidatedSequence,
    /// Too little data for the folds, a single linear fit on all targets.
    WholeDatasetLinear,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoldResult {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    /// Fitted line, only for the linear paths.
    pub linear: Option<LinearFit>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationReport {
    pub path: CalibrationPath,
    pub folds: Vec<FoldResult>,
}

impl CalibrationReport {
    pub fn fallback_used(&self) -> bool {
        self.path == CalibrationPath::WholeDatasetLinear
    }

    pub fn linear_fits(&self) -> impl Iterator<Item = &LinearFit> + '_ {
        self.folds.iter().filter_map(|f| f.linear.as_ref())
    }

    /// One row per linear fit. The header spelling is kept for compatibility
    /// with existing downstream readers.
    pub fn diagnostics_table(&self) -> Result<Table> {
        let mut table = Table::new(["coefficents", "intercepts"]);
        for fit in self.linear_fits() {
            table.push_row(vec![fit.coefficient.to_string(), fit.intercept.to_string()])?;
        }
        Ok(table)
    }

    /// Writes `rt_fit_<scan_file>.csv` into `output_folder`.
    pub fn write_diagnostics(&self, output_folder: &Path, scan_file: &str) -> Result<PathBuf> {
        let path = output_folder.join(format!("rt_fit_{}.csv", scan_file));
        self.diagnostics_table()?.write_csv(&path)?;
        debug!("Wrote retention time fit diagnostics to {}", path.display());
        Ok(path)
    }
}

fn has_retention_time_signal(psms: &[PsmRecord]) -> bool {
    let mut values = psms
        .iter()
        .map(|p| p.retention_time)
        .filter(|v| !v.is_nan());
    match values.next() {
        Some(first) => values.any(|v| v != first),
        None => false,
    }
}

/// Linearly interpolated quantile of the non-NaN values.
fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Indices of `train` that are confident enough to fit on.
fn training_rows(
    psms: &[PsmRecord],
    train: &[usize],
    has_strata: bool,
    config: &RtCalibrationConfig,
) -> Vec<usize> {
    let candidates: Vec<usize> = train
        .iter()
        .copied()
        .filter(|&i| {
            let psm = &psms[i];
            psm.is_target() && (!has_strata || psm.accession_stratum == Some(config.primary_stratum))
        })
        .collect();

    let angles: Vec<f64> = candidates.iter().map(|&i| psms[i].spectral_angle).collect();
    let Some(cut) = quantile(&angles, config.spectral_angle_quantile) else {
        return Vec::new();
    };
    candidates
        .into_iter()
        .filter(|&i| psms[i].spectral_angle > cut)
        .collect()
}

fn apply_prediction(psm: &mut PsmRecord, predicted: f64) {
    psm.predicted_rt = Some(predicted);
    psm.delta_rt = Some((predicted - psm.retention_time).abs());
}

/// Adds `predRT`/`deltaRT` to every PSM.
///
/// Rows are never reordered or dropped; every row is predicted by exactly
/// one model (its fold's, or the single fallback model). With `stratified`
/// set only primary stratum targets are trained on, whatever their values.
#[tracing::instrument(skip_all, level = "debug")]
pub fn calibrate(
    psms: &mut [PsmRecord],
    stratified: bool,
    config: &RtCalibrationConfig,
) -> Result<CalibrationReport> {
    if !has_retention_time_signal(psms) {
        info!("Retention time has no variance, setting deltaRT to 0");
        for psm in psms.iter_mut() {
            psm.predicted_rt = None;
            psm.delta_rt = Some(0.0);
        }
        return Ok(CalibrationReport {
            path: CalibrationPath::ConstantRetentionTime,
            folds: Vec::new(),
        });
    }

    let st = Instant::now();
    let use_sequence_model = psms.iter().any(|p| p.irt.is_none());

    let kfold = KFold::new(config.n_folds, config.seed);
    let Some(plans) = plan_folds(psms, &kfold, stratified, config) else {
        return Ok(whole_dataset_fallback(psms));
    };

    let view: &[PsmRecord] = psms;
    let fitted = plans
        .into_par_iter()
        .map(|(fold, train_rows)| fit_fold(view, fold, &train_rows, use_sequence_model, config))
        .collect::<Result<Vec<_>>>()?;

    let mut folds = Vec::with_capacity(fitted.len());
    for (fold_result, predictions) in fitted {
        for (i, predicted) in predictions {
            apply_prediction(&mut psms[i], predicted);
        }
        folds.push(fold_result);
    }

    let path = if use_sequence_model {
        CalibrationPath::CrossValidatedSequence
    } else {
        CalibrationPath::CrossValidatedLinear
    };
    info!(
        "Calibrated retention time of {} PSMs with {} folds ({:?}) in {:?}",
        psms.len(),
        folds.len(),
        path,
        st.elapsed()
    );
    Ok(CalibrationReport { path, folds })
}

/// Splits the rows and selects each fold's training rows.
///
/// Returns `None` when the data cannot support every fold, so the caller
/// can take the fallback before fitting anything.
fn plan_folds(
    psms: &[PsmRecord],
    kfold: &KFold,
    has_strata: bool,
    config: &RtCalibrationConfig,
) -> Option<Vec<(Fold, Vec<usize>)>> {
    if !kfold.can_split(psms.len()) {
        warn!(
            "Only {} PSMs for {} folds, using a single linear retention time fit",
            psms.len(),
            kfold.n_splits
        );
        return None;
    }

    let min_rows = config.min_training_psms.max(1);
    let mut plans = Vec::with_capacity(kfold.n_splits);
    for (fold_idx, fold) in kfold.split(psms.len()).into_iter().enumerate() {
        let train_rows = training_rows(psms, &fold.train, has_strata, config);
        if train_rows.len() < min_rows {
            warn!(
                "Fold {} has {} confident training PSMs (need {}), using a single linear retention time fit",
                fold_idx,
                train_rows.len(),
                min_rows
            );
            return None;
        }
        plans.push((fold, train_rows));
    }
    Some(plans)
}

fn fit_fold(
    psms: &[PsmRecord],
    fold: Fold,
    train_rows: &[usize],
    use_sequence_model: bool,
    config: &RtCalibrationConfig,
) -> Result<(FoldResult, Vec<(usize, f64)>)> {
    let rts: Vec<f64> = train_rows.iter().map(|&i| psms[i].retention_time).collect();

    if use_sequence_model {
        let sequences: Vec<&str> = train_rows.iter().map(|&i| psms[i].peptide.as_str()).collect();
        let mut model = RetentionCoefficients::fit(&sequences, &rts, &config.additive_options())?;
        for residue in FILLED_RESIDUES {
            if model.fill_missing(
                residue,
                &config.missing_residue_donor,
                config.missing_residue_factor,
            ) {
                debug!(
                    "No {} in training data, using {} * {}",
                    residue, config.missing_residue_donor, config.missing_residue_factor
                );
            }
        }
        let predictions = fold
            .test
            .iter()
            .map(|&i| (i, model.predict(&psms[i].peptide)))
            .collect();
        return Ok((
            FoldResult {
                train: fold.train,
                test: fold.test,
                linear: None,
            },
            predictions,
        ));
    }

    let irts = train_rows
        .iter()
        .map(|&i| psms[i].irt)
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(|| RescoreError::missing_column(columns::IRT, "linear retention time fit"))?;
    let fit = LinearFit::fit(&irts, &rts)?;
    let predictions = fold
        .test
        .iter()
        .filter_map(|&i| psms[i].irt.map(|irt| (i, fit.predict(irt))))
        .collect();
    Ok((
        FoldResult {
            train: fold.train,
            test: fold.test,
            linear: Some(fit),
        },
        predictions,
    ))
}

/// Single linear fit of RT on iRT over all targets, applied to every row.
///
/// Rows without an iRT (or every row, if nothing can be fitted) get a
/// `deltaRT` of 0.
fn whole_dataset_fallback(psms: &mut [PsmRecord]) -> CalibrationReport {
    let train: Vec<usize> = (0..psms.len())
        .filter(|&i| psms[i].is_target() && psms[i].irt.is_some_and(f64::is_finite))
        .collect();
    let x: Vec<f64> = train.iter().filter_map(|&i| psms[i].irt).collect();
    let y: Vec<f64> = train.iter().map(|&i| psms[i].retention_time).collect();

    let fit = match LinearFit::fit(&x, &y) {
        Ok(fit) => Some(fit),
        Err(e) => {
            warn!("Fallback retention time fit failed ({}), setting deltaRT to 0", e);
            None
        }
    };

    for psm in psms.iter_mut() {
        match (fit, psm.irt) {
            (Some(fit), Some(irt)) => apply_prediction(psm, fit.predict(irt)),
            _ => {
                psm.predicted_rt = None;
                psm.delta_rt = Some(0.0);
            }
        }
    }

    CalibrationReport {
        path: CalibrationPath::WholeDatasetLinear,
        folds: fit
            .map(|fit| FoldResult {
                train,
                test: (0..psms.len()).collect(),
                linear: Some(fit),
            })
            .into_iter()
            .collect(),
    }
}

fn write_fit_diagnostics(report: &CalibrationReport, out: &Path, scan_file: &str) -> Result<()> {
    if report.path != CalibrationPath::ConstantRetentionTime {
        report.write_diagnostics(out, scan_file)?;
    }
    Ok(())
}

/// Calibrates a combined feature table in place, adding `predRT` and `deltaRT`.
///
/// With `deltaRtPerFile` every source file is calibrated on its own (in
/// parallel) and gets its own diagnostics file; otherwise the whole table is
/// calibrated once under [`COMBINED_SCAN_FILE`]. Constant retention time
/// writes no diagnostics. Training is limited to the primary stratum
/// whenever the `accessionGroup` column is present.
#[tracing::instrument(skip_all)]
pub fn calibrate_table(
    table: &mut Table,
    config: &PipelineConfig,
) -> Result<Vec<(String, CalibrationReport)>> {
    let mut records = PsmRecord::from_table(table)?;
    let rt_config = &config.rt_calibration;
    let stratified = table.has_column(columns::ACCESSION_STRATUM);

    let reports = if config.delta_rt_per_file {
        table.require_column(columns::SOURCE, "per file retention time calibration")?;
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, record) in records.iter().enumerate() {
            groups
                .entry(record.source.clone().unwrap_or_default())
                .or_default()
                .push(i);
        }

        let calibrated = groups
            .into_par_iter()
            .map(|(source, indices)| {
                let mut group: Vec<PsmRecord> =
                    indices.iter().map(|&i| records[i].clone()).collect();
                let report = calibrate(&mut group, stratified, rt_config)?;
                Ok((source, indices, group, report))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut reports = Vec::with_capacity(calibrated.len());
        for (source, indices, group, report) in calibrated {
            for (i, record) in indices.into_iter().zip(group) {
                records[i] = record;
            }
            write_fit_diagnostics(&report, &config.output_folder, &source)?;
            reports.push((source, report));
        }
        reports
    } else {
        let report = calibrate(&mut records, stratified, rt_config)?;
        write_fit_diagnostics(&report, &config.output_folder, COMBINED_SCAN_FILE)?;
        vec![(COMBINED_SCAN_FILE.to_string(), report)]
    };

    PsmRecord::write_to_table(&records, table)?;
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::TargetDecoy;
    use rand::{
        Rng,
        SeedableRng,
    };
    use rand_chacha::ChaCha8Rng;

    const RESIDUES: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";

    fn synthetic_psms(n: usize, with_irt: bool, seed: u64) -> Vec<PsmRecord> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let len = rng.gen_range(8..13);
                let peptide: String = (0..len)
                    .map(|_| RESIDUES[rng.gen_range(0..RESIDUES.len())] as char)
                    .collect();
                let irt = rng.gen_range(-20.0..120.0);
                let is_target = i % 3 != 0;
                let noise = if is_target {
                    rng.gen_range(-0.5..0.5)
                } else {
                    rng.gen_range(-30.0..30.0)
                };
                PsmRecord {
                    source: Some(format!("run_{}", i % 2)),
                    peptide,
                    label: if is_target {
                        TargetDecoy::Target
                    } else {
                        TargetDecoy::Decoy
                    },
                    spectral_angle: rng.gen_range(0.0..1.0),
                    retention_time: 0.5 * irt + 40.0 + noise,
                    irt: with_irt.then_some(irt),
                    accession_stratum: None,
                    predicted_rt: None,
                    delta_rt: None,
                }
            })
            .collect()
    }

    #[test]
    fn test_quantile_matches_linear_interpolation() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&v, 0.9), Some(4.6));
        assert_eq!(quantile(&v, 0.0), Some(1.0));
        assert_eq!(quantile(&v, 1.0), Some(5.0));
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&[f64::NAN, 2.0], 0.5), Some(2.0));
    }

    #[test]
    fn test_constant_retention_time_short_circuits() {
        let mut psms = synthetic_psms(50, true, 1);
        psms.iter_mut().for_each(|p| p.retention_time = 12.0);
        let report = calibrate(&mut psms, false, &RtCalibrationConfig::default()).unwrap();
        assert_eq!(report.path, CalibrationPath::ConstantRetentionTime);
        assert!(report.folds.is_empty());
        assert!(psms.iter().all(|p| p.delta_rt == Some(0.0)));
        assert_eq!(report.diagnostics_table().unwrap().len(), 0);
    }

    #[test]
    fn test_linear_path_covers_every_row_once() {
        let mut psms = synthetic_psms(1000, true, 2);
        let original: Vec<String> = psms.iter().map(|p| p.peptide.clone()).collect();
        let report = calibrate(&mut psms, false, &RtCalibrationConfig::default()).unwrap();

        assert_eq!(report.path, CalibrationPath::CrossValidatedLinear);
        assert!(!report.fallback_used());
        assert_eq!(report.folds.len(), 10);
        assert_eq!(report.linear_fits().count(), 10);

        let mut tested = vec![0; psms.len()];
        for fold in report.folds.iter() {
            fold.test.iter().for_each(|&i| tested[i] += 1);
        }
        assert!(tested.iter().all(|&c| c == 1));

        // Order untouched, every row predicted.
        assert_eq!(psms.len(), original.len());
        assert!(psms.iter().zip(original.iter()).all(|(p, o)| &p.peptide == o));
        assert!(psms.iter().all(|p| p.delta_rt.is_some_and(|d| d >= 0.0)));

        for fit in report.linear_fits() {
            assert!((fit.coefficient - 0.5).abs() < 0.05, "{:?}", fit);
            assert!((fit.intercept - 40.0).abs() < 2.0, "{:?}", fit);
        }
        // Targets sit close to the fitted line.
        let target_mean = psms
            .iter()
            .filter(|p| p.is_target())
            .map(|p| p.delta_rt.unwrap())
            .sum::<f64>()
            / psms.iter().filter(|p| p.is_target()).count() as f64;
        assert!(target_mean < 1.0, "mean target deltaRT {}", target_mean);
    }

    #[test]
    fn test_missing_irt_uses_sequence_model() {
        let mut psms = synthetic_psms(400, true, 3);
        psms[7].irt = None;
        let report = calibrate(&mut psms, false, &RtCalibrationConfig::default()).unwrap();
        assert_eq!(report.path, CalibrationPath::CrossValidatedSequence);
        assert_eq!(report.linear_fits().count(), 0);
        assert!(psms.iter().all(|p| p.delta_rt.is_some_and(|d| d >= 0.0)));
        assert!(psms.iter().all(|p| p.predicted_rt.is_some()));
    }

    #[test]
    fn test_tiny_input_takes_fallback() {
        let mut psms = synthetic_psms(8, true, 4);
        let report = calibrate(&mut psms, false, &RtCalibrationConfig::default()).unwrap();
        assert!(report.fallback_used());
        assert_eq!(report.linear_fits().count(), 1);
        assert_eq!(report.folds[0].test.len(), 8);
        assert!(psms.iter().all(|p| p.delta_rt.is_some_and(|d| d >= 0.0)));
    }

    #[test]
    fn test_fallback_without_irt_sets_zero() {
        let mut psms = synthetic_psms(8, false, 5);
        let report = calibrate(&mut psms, false, &RtCalibrationConfig::default()).unwrap();
        assert!(report.fallback_used());
        assert!(report.folds.is_empty());
        assert!(psms.iter().all(|p| p.delta_rt == Some(0.0)));
    }

    #[test]
    fn test_strata_restrict_training_rows() {
        let mut psms = synthetic_psms(200, true, 6);
        for (i, p) in psms.iter_mut().enumerate() {
            p.accession_stratum = Some((i % 2) as i64);
        }
        let config = RtCalibrationConfig::default();
        let all: Vec<usize> = (0..psms.len()).collect();
        let rows = training_rows(&psms, &all, true, &config);
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|&i| psms[i].accession_stratum == Some(0)));
        assert!(rows.iter().all(|&i| psms[i].is_target()));

        let candidates = all
            .iter()
            .filter(|&&i| psms[i].is_target() && psms[i].accession_stratum == Some(0))
            .count();
        // Top 10% of the candidates, give or take ties.
        assert!(rows.len() <= candidates / 10 + 1);
    }

    #[test]
    fn test_stratified_without_values_trains_on_nothing() {
        let mut psms = synthetic_psms(400, true, 7);
        let report = calibrate(&mut psms, true, &RtCalibrationConfig::default()).unwrap();
        assert_eq!(report.path, CalibrationPath::WholeDatasetLinear);

        let mut psms = synthetic_psms(400, true, 7);
        let report = calibrate(&mut psms, false, &RtCalibrationConfig::default()).unwrap();
        assert_eq!(report.path, CalibrationPath::CrossValidatedLinear);
    }

    #[test]
    fn test_calibrate_table_per_file_writes_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let psms = synthetic_psms(300, true, 7);
        let mut table = Table::new([
            columns::SOURCE,
            columns::PEPTIDE,
            columns::LABEL,
            columns::SPECTRAL_ANGLE,
            columns::RETENTION_TIME,
            columns::IRT,
            "otherFeature",
        ]);
        for p in psms.iter() {
            table
                .push_row(vec![
                    p.source.clone().unwrap(),
                    p.peptide.clone(),
                    if p.is_target() { "1" } else { "-1" }.to_string(),
                    p.spectral_angle.to_string(),
                    p.retention_time.to_string(),
                    p.irt.unwrap().to_string(),
                    "x".to_string(),
                ])
                .unwrap();
        }

        let mut config = PipelineConfig::new(dir.path());
        config.delta_rt_per_file = true;
        let reports = calibrate_table(&mut table, &config).unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(table.len(), 300);
        assert!(table.has_column("otherFeature"));
        let deltas = table.parse_column::<f64>(columns::DELTA_RT).unwrap();
        assert!(deltas.iter().all(|&d| d >= 0.0));

        for source in ["run_0", "run_1"] {
            let diag = Table::read_csv(&dir.path().join(format!("rt_fit_{}.csv", source))).unwrap();
            assert_eq!(diag.columns(), &["coefficents", "intercepts"]);
            assert_eq!(diag.len(), 10);
        }
    }
}
