//! Retention time models used to build the `deltaRT` feature.
//!
//! Two models are provided:
//! * [`LinearFit`]: ordinary least squares of observed RT on a library
//!   indexed retention time (iRT).
//! * [`RetentionCoefficients`]: an additive retention coefficient model,
//!   one contribution per residue, scaled by a length correction term
//!   `1 + lcp * ln(len)` and offset by a constant.
//!   See Krokhin et al., Mol. Cell. Proteomics 2004, 3, 908-919
//!   <https://doi.org/10.1074/mcp.M400031-MCP200>

pub mod additive;
pub mod linear;
mod solve;

pub use additive::{
    AdditiveFitOptions,
    RetentionCoefficients,
    tokenize_residues,
};
pub use linear::LinearFit;

/// Errors produced while fitting retention time models.
#[derive(Debug, Clone, PartialEq)]
pub enum RtModelError {
    /// Returned when a fit is attempted with no input points.
    NoPoints,
    /// Returned when the predictor and response slices differ in length.
    MismatchedLengths(usize, usize),
    /// Returned when the normal equations cannot be solved.
    Singular,
    /// Returned when the input (or the fitted model) contains NaN or infinite values.
    NonFinite,
}

impl std::fmt::Display for RtModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RtModelError::NoPoints => write!(f, "no points to fit"),
            RtModelError::MismatchedLengths(x, y) => {
                write!(f, "predictor has {} values but response has {}", x, y)
            }
            RtModelError::Singular => write!(f, "singular system of normal equations"),
            RtModelError::NonFinite => write!(f, "non-finite value encountered"),
        }
    }
}

impl std::error::Error for RtModelError {}

/// Pearson correlation between two equally sized slices.
///
/// Returns `None` when either side has zero variance or the lengths differ.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.is_empty() {
        return None;
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    let r = cov / (var_x * var_y).sqrt();
    r.is_finite().then_some(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pearson_perfect() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        let r = pearson(&x, &y).unwrap();
        assert!((r - 1.0).abs() < 1e-12);

        let y_neg = [8.0, 6.0, 4.0, 2.0];
        let r = pearson(&x, &y_neg).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_constant_is_none() {
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
        assert_eq!(pearson(&[], &[]), None);
    }
}
