use crate::rescore::RescoreMethod;
use rtcalib::AdditiveFitOptions;
use serde::{
    Deserialize,
    Serialize,
};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub output_folder: PathBuf,
    #[serde(default)]
    pub alleles: Vec<String>,
    /// Longest peptide sent to the binding predictor.
    #[serde(default = "default_ba_pred_limit")]
    pub ba_pred_limit: usize,
    #[serde(default = "default_n_cores")]
    pub n_cores: usize,
    #[serde(default)]
    pub rescore_method: RescoreMethod,
    #[serde(default = "default_fdr")]
    pub fdr: f64,
    #[serde(default)]
    pub results_export: ResultsExport,
    #[serde(default)]
    pub use_accession_stratum: bool,
    /// Stratum names, position `i` is the name of stratum code `i`.
    #[serde(default)]
    pub accession_hierarchy: Vec<String>,
    #[serde(default)]
    pub collision_energy: Option<CollisionEnergy>,
    #[serde(default)]
    pub delta_rt_per_file: bool,
    #[serde(default)]
    pub rt_calibration: RtCalibrationConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub binding: BindingConfig,
}

fn default_ba_pred_limit() -> usize {
    15
}

fn default_n_cores() -> usize {
    1
}

fn default_fdr() -> f64 {
    0.01
}

impl PipelineConfig {
    pub fn new(output_folder: impl Into<PathBuf>) -> Self {
        Self {
            output_folder: output_folder.into(),
            alleles: Vec::new(),
            ba_pred_limit: default_ba_pred_limit(),
            n_cores: default_n_cores(),
            rescore_method: RescoreMethod::default(),
            fdr: default_fdr(),
            results_export: ResultsExport::default(),
            use_accession_stratum: false,
            accession_hierarchy: Vec::new(),
            collision_energy: None,
            delta_rt_per_file: false,
            rt_calibration: RtCalibrationConfig::default(),
            classifier: ClassifierConfig::default(),
            binding: BindingConfig::default(),
        }
    }

    /// Whether more than one collision energy was searched, in which case
    /// the energy is a feature of its own.
    pub fn uses_multiple_collision_energies(&self) -> bool {
        matches!(&self.collision_energy, Some(CollisionEnergy::Multiple(v)) if v.len() > 1)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.fdr > 0.0 && self.fdr < 1.0) {
            return Err(format!("fdr must be in (0, 1), got {}", self.fdr));
        }
        if self.n_cores == 0 {
            return Err("nCores must be at least 1".to_string());
        }
        self.rt_calibration.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CollisionEnergy {
    Single(f64),
    Multiple(Vec<f64>),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultsExport {
    #[default]
    Psm,
    Peptide,
}

/// Settings of the cross-validated retention time calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RtCalibrationConfig {
    pub n_folds: usize,
    pub seed: u64,
    /// Only training PSMs with a spectral angle strictly above this quantile
    /// (of the filtered training set) are used to fit.
    pub spectral_angle_quantile: f64,
    /// Stratum code kept for training when a stratum column is present.
    pub primary_stratum: i64,
    /// Every fold needs at least this many training PSMs, otherwise the
    /// whole-dataset linear fallback is used.
    pub min_training_psms: usize,
    pub lcp_range: (f64, f64),
    pub lcp_accuracy: f64,
    /// Residue whose coefficient stands in for unobserved C and W.
    pub missing_residue_donor: String,
    pub missing_residue_factor: f64,
}

impl Default for RtCalibrationConfig {
    fn default() -> Self {
        Self {
            n_folds: 10,
            seed: 42,
            spectral_angle_quantile: 0.9,
            primary_stratum: 0,
            min_training_psms: 2,
            lcp_range: (-1.0, 1.0),
            lcp_accuracy: 0.1,
            missing_residue_donor: "P".to_string(),
            missing_residue_factor: 0.956,
        }
    }
}

impl RtCalibrationConfig {
    pub fn additive_options(&self) -> AdditiveFitOptions {
        AdditiveFitOptions {
            lcp_range: self.lcp_range,
            lcp_accuracy: self.lcp_accuracy,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.n_folds < 2 {
            return Err(format!("nFolds must be at least 2, got {}", self.n_folds));
        }
        if !(0.0..=1.0).contains(&self.spectral_angle_quantile) {
            return Err(format!(
                "spectralAngleQuantile must be in [0, 1], got {}",
                self.spectral_angle_quantile
            ));
        }
        if self.lcp_range.0 >= self.lcp_range.1 {
            return Err(format!("lcpRange is empty: {:?}", self.lcp_range));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierConfig {
    pub iterations: usize,
    /// Program to run instead of the method's default executable name.
    pub executable: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            executable: None,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BindingConfig {
    pub pan_command: PathBuf,
    pub pan_docker: bool,
    pub docker_image: String,
    /// Location the docker image expects the predictor installation at.
    pub docker_mount: String,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            pan_command: PathBuf::from("netMHCpan"),
            pan_docker: false,
            docker_image: "johncormican/basic-pan-execution".to_string(),
            docker_mount: "/net/sund-nas.win.dtu.dk/storage/services/www/packages/netMHCpan/4.1/netMHCpan-4.1"
                .to_string(),
        }
    }
}
