use crate::config::ResultsExport;
use serde::{
    Deserialize,
    Serialize,
};
use std::ffi::OsString;
use std::fmt;
use std::path::{
    Path,
    PathBuf,
};
use std::str::FromStr;

/// Column the upstream feature tables carry the match identifier in.
pub const IDENTIFIER_COLUMN: &str = "SpecId";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RescoreMethod {
    Mokapot,
    /// Percolator with concatenated target/decoy competition.
    #[default]
    Percolator,
    /// Percolator with separate target and decoy outputs.
    PercolatorSeparate,
}

/// Everything that differs between classifiers once they have run: the
/// names of the columns they write.
///
/// Resolved once per run and passed to reattachment and finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodProfile {
    /// Identifier column name shared with the feature tables.
    pub identifier: &'static str,
    /// Identifier column name in the classifier output, if it renames it.
    pub output_identifier: Option<&'static str>,
    pub score: &'static str,
    pub q_value: &'static str,
    pub posterior_error_prob: &'static str,
    pub accession: &'static str,
}

const PERCOLATOR_PROFILE: MethodProfile = MethodProfile {
    identifier: IDENTIFIER_COLUMN,
    output_identifier: Some("PSMId"),
    score: "score",
    q_value: "q-value",
    posterior_error_prob: "posterior_error_prob",
    accession: "proteinIds",
};

const MOKAPOT_PROFILE: MethodProfile = MethodProfile {
    identifier: IDENTIFIER_COLUMN,
    output_identifier: None,
    score: "mokapot score",
    q_value: "mokapot q-value",
    posterior_error_prob: "mokapot PEP",
    accession: "Proteins",
};

impl RescoreMethod {
    pub const ALL: [RescoreMethod; 3] = [
        RescoreMethod::Mokapot,
        RescoreMethod::Percolator,
        RescoreMethod::PercolatorSeparate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RescoreMethod::Mokapot => "mokapot",
            RescoreMethod::Percolator => "percolator",
            RescoreMethod::PercolatorSeparate => "percolatorSeparate",
        }
    }

    /// Default executable name.
    pub fn program(&self) -> &'static str {
        match self {
            RescoreMethod::Mokapot => "mokapot",
            RescoreMethod::Percolator | RescoreMethod::PercolatorSeparate => "percolator",
        }
    }

    pub fn profile(&self) -> MethodProfile {
        match self {
            RescoreMethod::Mokapot => MOKAPOT_PROFILE,
            RescoreMethod::Percolator | RescoreMethod::PercolatorSeparate => PERCOLATOR_PROFILE,
        }
    }

    /// Arguments for one classifier run; the input file always goes last.
    pub fn command_args(&self, paths: &RescorePaths, fdr: f64, iterations: usize) -> Vec<OsString> {
        let fdr = fdr.to_string();
        let mut args: Vec<OsString> = match self {
            RescoreMethod::Mokapot => vec![
                "--dest_dir".into(),
                paths.output_dir.clone().into(),
                "--keep_decoys".into(),
                "--train_fdr".into(),
                fdr.clone().into(),
                "--test_fdr".into(),
                fdr.into(),
                "--file_root".into(),
                paths.prefix.clone().into(),
                "--save_models".into(),
            ],
            RescoreMethod::PercolatorSeparate => vec![
                "-F".into(),
                fdr.clone().into(),
                "-t".into(),
                fdr.into(),
                "-i".into(),
                iterations.to_string().into(),
                "-M".into(),
                paths.decoy_psms.clone().into(),
                "--post-processing-tdc".into(),
                "-w".into(),
                paths.weights.clone().into(),
                "--override".into(),
                "--results-psms".into(),
                paths.psms.clone().into(),
                "--results-peptides".into(),
                paths.peptides.clone().into(),
            ],
            RescoreMethod::Percolator => vec![
                "-F".into(),
                fdr.clone().into(),
                "-t".into(),
                fdr.into(),
                "-i".into(),
                iterations.to_string().into(),
                "-M".into(),
                paths.decoy_psms.clone().into(),
                "--post-processing-tdc".into(),
                "-I".into(),
                "concatenated".into(),
                "-w".into(),
                paths.weights.clone().into(),
                "-v".into(),
                "0".into(),
                "--results-psms".into(),
                paths.psms.clone().into(),
                "--results-peptides".into(),
                paths.peptides.clone().into(),
                "--override".into(),
            ],
        };
        args.push(paths.input.clone().into());
        args
    }
}

impl fmt::Display for RescoreMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RescoreMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RescoreMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "Unknown rescore method '{}', expected one of {:?}",
                    s,
                    RescoreMethod::ALL.map(|m| m.as_str())
                )
            })
    }
}

/// Files of one classifier run, all inside the output folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescorePaths {
    pub output_dir: PathBuf,
    pub prefix: String,
    pub input: PathBuf,
    pub psms: PathBuf,
    pub peptides: PathBuf,
    pub decoy_psms: PathBuf,
    pub weights: PathBuf,
    pub log: PathBuf,
}

impl RescorePaths {
    pub fn new(output_dir: &Path, input_filename: &str, prefix: &str, method: RescoreMethod) -> Self {
        let named = |suffix: &str| output_dir.join(format!("{}.{}.{}", prefix, method, suffix));
        Self {
            output_dir: output_dir.to_path_buf(),
            prefix: prefix.to_string(),
            input: output_dir.join(input_filename),
            psms: named("psms.txt"),
            peptides: named("peptides.txt"),
            decoy_psms: named("decoy.psms.txt"),
            weights: named("weights.csv"),
            log: output_dir.join(crate::columns::RESCORE_LOG_FILE),
        }
    }

    pub fn export(&self, export: ResultsExport) -> &Path {
        match export {
            ResultsExport::Psm => &self.psms,
            ResultsExport::Peptide => &self.peptides,
        }
    }
}
