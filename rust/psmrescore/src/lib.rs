pub mod binding;
pub mod columns;
pub mod config;
pub mod errors;
pub mod identifiers;
pub mod ml;
pub mod psm;
pub mod rescore;
pub mod rt_calibration;
pub mod table;

pub use config::{
    CollisionEnergy,
    PipelineConfig,
    ResultsExport,
};
pub use errors::{
    RescoreError,
    Result,
};
pub use identifiers::{
    MatchIdentifier,
    strip_flanking_residues,
};
pub use ml::TargetDecoy;
pub use psm::PsmRecord;
pub use rescore::{
    FinalOutputs,
    RescoreMethod,
    finalize,
    rescore,
};
pub use rt_calibration::{
    CalibrationReport,
    calibrate,
    calibrate_table,
};
pub use table::Table;
