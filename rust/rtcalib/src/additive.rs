use crate::solve::least_squares;
use crate::{
    RtModelError,
    pearson,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::{
    BTreeMap,
    BTreeSet,
};
use tracing::debug;

/// Number of length correction values tried per refinement round.
const LCP_GRID_POINTS: usize = 10;

/// Smallest refinement step accepted, guards against a zero accuracy setting.
const MIN_LCP_ACCURACY: f64 = 1e-6;

/// Splits a sequence into residue labels.
///
/// Plain residues are single upper case letters. A modified residue is written
/// with a lower case prefix glued to its residue (`oxM`, `camC`, `p2S`).
/// Any other character (flanking dots, dashes, brackets) is skipped.
///
/// ```
/// use rtcalib::tokenize_residues;
/// assert_eq!(tokenize_residues("PEoxMK"), vec!["P", "E", "oxM", "K"]);
/// ```
pub fn tokenize_residues(sequence: &str) -> Vec<String> {
    let mut out = Vec::with_capacity(sequence.len());
    let mut prefix = String::new();
    for c in sequence.chars() {
        if c.is_ascii_uppercase() {
            prefix.push(c);
            out.push(std::mem::take(&mut prefix));
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            prefix.push(c);
        } else {
            prefix.clear();
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdditiveFitOptions {
    /// Range searched for the length correction parameter.
    pub lcp_range: (f64, f64),
    /// The search stops refining once the grid step falls below this value.
    pub lcp_accuracy: f64,
}

impl Default for AdditiveFitOptions {
    fn default() -> Self {
        Self {
            lcp_range: (-1.0, 1.0),
            lcp_accuracy: 0.1,
        }
    }
}

/// Additive retention coefficient model.
///
/// `RT = (sum of residue coefficients) * (1 + lcp * ln(len)) + constant`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionCoefficients {
    residues: BTreeMap<String, f64>,
    length_correction: f64,
    constant: f64,
}

impl RetentionCoefficients {
    /// Fits residue coefficients, searching the length correction parameter
    /// on a grid that is refined around the best value so far.
    ///
    /// The best candidate is the one whose predictions on the training set
    /// correlate best (Pearson) with the observed retention times.
    pub fn fit<S: AsRef<str>>(
        sequences: &[S],
        retention_times: &[f64],
        options: &AdditiveFitOptions,
    ) -> Result<Self, RtModelError> {
        if sequences.len() != retention_times.len() {
            return Err(RtModelError::MismatchedLengths(
                sequences.len(),
                retention_times.len(),
            ));
        }
        if sequences.is_empty() {
            return Err(RtModelError::NoPoints);
        }
        if retention_times.iter().any(|v| !v.is_finite()) {
            return Err(RtModelError::NonFinite);
        }

        let tokenized: Vec<Vec<String>> = sequences
            .iter()
            .map(|s| tokenize_residues(s.as_ref()))
            .collect();

        let accuracy = options.lcp_accuracy.max(MIN_LCP_ACCURACY);
        let (mut lo, mut hi) = options.lcp_range;
        let mut step = (hi - lo) / LCP_GRID_POINTS as f64;
        let mut best: Option<(f64, Self)> = None;

        while step > accuracy {
            let width = (hi - lo) / LCP_GRID_POINTS as f64;
            for i in 0..LCP_GRID_POINTS {
                let lcp = lo + i as f64 * width;
                let candidate = Self::fit_fixed_lcp(&tokenized, retention_times, lcp)?;
                let predicted: Vec<f64> = tokenized
                    .iter()
                    .map(|tokens| candidate.predict_tokens(tokens))
                    .collect();
                let Some(r) = pearson(retention_times, &predicted) else {
                    continue;
                };
                if best.as_ref().is_none_or(|(best_r, _)| r > *best_r) {
                    best = Some((r, candidate));
                }
            }
            let Some((_, current)) = &best else {
                break;
            };
            lo = current.length_correction - step;
            hi = current.length_correction + step;
            step = (hi - lo) / LCP_GRID_POINTS as f64;
        }

        match best {
            Some((r, model)) => {
                debug!(
                    "Fitted retention coefficients for {} residues, lcp = {:.3}, r = {:.4}",
                    model.residues.len(),
                    model.length_correction,
                    r
                );
                Ok(model)
            }
            // No candidate produced a defined correlation (e.g. constant RTs),
            // the uncorrected fit is as good as any other.
            None => Self::fit_fixed_lcp(&tokenized, retention_times, 0.0),
        }
    }

    fn fit_fixed_lcp(
        tokenized: &[Vec<String>],
        retention_times: &[f64],
        lcp: f64,
    ) -> Result<Self, RtModelError> {
        let alphabet: BTreeSet<&str> = tokenized
            .iter()
            .flat_map(|tokens| tokens.iter().map(|t| t.as_str()))
            .collect();
        let column_of: BTreeMap<&str, usize> = alphabet
            .iter()
            .enumerate()
            .map(|(i, aa)| (*aa, i))
            .collect();
        let ncols = alphabet.len() + 1;

        let mut design = vec![0.0; tokenized.len() * ncols];
        for (row, tokens) in design.chunks_exact_mut(ncols).zip(tokenized.iter()) {
            let scale = length_scale(lcp, tokens.len());
            for token in tokens {
                row[column_of[token.as_str()]] += scale;
            }
            row[ncols - 1] = 1.0;
        }

        let beta = least_squares(&design, ncols, retention_times)?;
        let residues = alphabet
            .iter()
            .zip(beta.iter())
            .map(|(aa, rc)| (aa.to_string(), *rc))
            .collect();

        Ok(Self {
            residues,
            length_correction: lcp,
            constant: beta[ncols - 1],
        })
    }

    /// Predicts the retention time of a sequence.
    ///
    /// Modified residues without their own coefficient use the coefficient of
    /// the unmodified residue. Residues never seen during fitting contribute
    /// nothing.
    pub fn predict(&self, sequence: &str) -> f64 {
        self.predict_tokens(&tokenize_residues(sequence))
    }

    fn predict_tokens(&self, tokens: &[String]) -> f64 {
        if tokens.is_empty() {
            return self.constant;
        }
        let total: f64 = tokens
            .iter()
            .filter_map(|token| self.token_coefficient(token))
            .sum();
        total * length_scale(self.length_correction, tokens.len()) + self.constant
    }

    fn token_coefficient(&self, token: &str) -> Option<f64> {
        if let Some(rc) = self.residues.get(token) {
            return Some(*rc);
        }
        let base = token.get(token.len().saturating_sub(1)..)?;
        if base.len() < token.len() {
            return self.residues.get(base).copied();
        }
        None
    }

    /// Fills in the coefficient of `residue` as `factor` times the coefficient
    /// of `donor`, if `residue` was not observed and `donor` was.
    ///
    /// Returns whether a value was inserted.
    pub fn fill_missing(&mut self, residue: &str, donor: &str, factor: f64) -> bool {
        if self.residues.contains_key(residue) {
            return false;
        }
        match self.residues.get(donor).copied() {
            Some(rc) => {
                self.residues.insert(residue.to_string(), rc * factor);
                true
            }
            None => false,
        }
    }

    pub fn coefficient(&self, residue: &str) -> Option<f64> {
        self.residues.get(residue).copied()
    }

    pub fn length_correction(&self) -> f64 {
        self.length_correction
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn residues(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.residues.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

fn length_scale(lcp: f64, len: usize) -> f64 {
    1.0 + lcp * (len.max(1) as f64).ln()
}
