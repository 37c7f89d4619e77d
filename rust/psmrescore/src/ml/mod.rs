pub mod cv;

pub use cv::{
    Fold,
    KFold,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetDecoy {
    Target,
    Decoy,
}

impl TargetDecoy {
    /// Feature tables label targets with `1`, everything else
    /// (`0` or `-1` depending on the classifier) is a decoy.
    pub fn from_label(label: i64) -> Self {
        if label == 1 {
            TargetDecoy::Target
        } else {
            TargetDecoy::Decoy
        }
    }

    pub fn is_target(&self) -> bool {
        matches!(self, TargetDecoy::Target)
    }
}
