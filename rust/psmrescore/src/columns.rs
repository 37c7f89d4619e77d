//! Column names shared by the feature tables and the final outputs.

pub const SOURCE: &str = "source";
pub const SCAN: &str = "scan";
pub const PEPTIDE: &str = "peptide";
pub const MODIFIED_SEQUENCE: &str = "modifiedSequence";
pub const CHARGE: &str = "charge";
pub const LABEL: &str = "Label";

pub const ENGINE_SCORE: &str = "engineScore";
pub const SPECTRAL_ANGLE: &str = "spectralAngle";
pub const SPEARMAN_R: &str = "spearmanR";
pub const MATCHED_COVERAGE: &str = "matchedCoverage";
pub const RETENTION_TIME: &str = "retentionTime";
pub const IRT: &str = "iRT";
pub const PREDICTED_RT: &str = "predRT";
pub const DELTA_RT: &str = "deltaRT";
pub const COLLISION_ENERGY: &str = "collisionEnergy";

/// Integer stratum code before one-hot encoding, decoded stratum name after.
pub const ACCESSION_STRATUM: &str = "accessionGroup";
/// Prefix of the one-hot encoded stratum columns, `accession_<stratum>`.
pub const ACCESSION_ONE_HOT_PREFIX: &str = "accession_";
pub const ACCESSION: &str = "accession";

pub const FINAL_SCORE: &str = "finalScore";
pub const FINAL_Q_VALUE: &str = "finalQValue";
pub const FINAL_POSTERIOR_ERROR_PROB: &str = "finalPostErrProb";

/// Features reattached to every rescored PSM, in output order.
pub const KEY_FEATURES: [&str; 7] = [
    SPECTRAL_ANGLE,
    RETENTION_TIME,
    SPEARMAN_R,
    MATCHED_COVERAGE,
    DELTA_RT,
    ENGINE_SCORE,
    CHARGE,
];

pub const ALL_FEATURES_FILE: &str = "input_all_features.tab";
pub const FINAL_INPUT_FILE: &str = "final_input.tab";
pub const FINAL_ASSIGNMENTS_FILE: &str = "finalAssignments.csv";
pub const FINAL_PSM_ASSIGNMENTS_FILE: &str = "finalPsmAssignments.csv";
pub const RESCORE_LOG_FILE: &str = "rescore.log";
