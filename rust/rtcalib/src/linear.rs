use crate::RtModelError;
use serde::{
    Deserialize,
    Serialize,
};

/// Ordinary least squares fit of a single predictor, `y = coefficient * x + intercept`.
///
/// Used to map library iRT values onto the observed retention time scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub coefficient: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// Fits the model on paired slices.
    ///
    /// A predictor with zero variance yields a flat line through the mean of
    /// `y` (coefficient 0), which is the minimum norm least squares answer.
    pub fn fit(x: &[f64], y: &[f64]) -> Result<Self, RtModelError> {
        if x.len() != y.len() {
            return Err(RtModelError::MismatchedLengths(x.len(), y.len()));
        }
        if x.is_empty() {
            return Err(RtModelError::NoPoints);
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(RtModelError::NonFinite);
        }

        let n = x.len() as f64;
        let mean_x = x.iter().sum::<f64>() / n;
        let mean_y = y.iter().sum::<f64>() / n;

        let mut sxy = 0.0;
        let mut sxx = 0.0;
        for (a, b) in x.iter().zip(y.iter()) {
            sxy += (a - mean_x) * (b - mean_y);
            sxx += (a - mean_x) * (a - mean_x);
        }

        let coefficient = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        let intercept = mean_y - coefficient * mean_x;
        Ok(Self {
            coefficient,
            intercept,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.coefficient * x + self.intercept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_variance_predictor() {
        let fit = LinearFit::fit(&[3.0, 3.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(fit.coefficient, 0.0);
        assert!((fit.intercept - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_point() {
        let fit = LinearFit::fit(&[5.0], &[7.0]).unwrap();
        assert_eq!(fit.predict(5.0), 7.0);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(LinearFit::fit(&[], &[]), Err(RtModelError::NoPoints));
        assert_eq!(
            LinearFit::fit(&[1.0, 2.0], &[1.0]),
            Err(RtModelError::MismatchedLengths(2, 1))
        );
        assert_eq!(
            LinearFit::fit(&[1.0, f64::NAN], &[1.0, 2.0]),
            Err(RtModelError::NonFinite)
        );
    }
}
