use crate::RtModelError;

/// Ridge added to the diagonal of the normal equations, relative to the
/// largest diagonal entry. Keeps rank deficient designs (e.g. a residue that
/// always co-occurs with another) solvable, close to the minimum norm answer.
const RELATIVE_RIDGE: f64 = 1e-10;

/// Least squares solution of `design * beta ~= response`.
///
/// `design` is row-major with `ncols` columns.
pub(crate) fn least_squares(
    design: &[f64],
    ncols: usize,
    response: &[f64],
) -> Result<Vec<f64>, RtModelError> {
    let nrows = response.len();
    if nrows == 0 || ncols == 0 {
        return Err(RtModelError::NoPoints);
    }
    if design.len() != nrows * ncols {
        return Err(RtModelError::MismatchedLengths(design.len(), nrows * ncols));
    }

    // X^T X (ncols x ncols) and X^T y
    let mut xtx = vec![0.0; ncols * ncols];
    let mut xty = vec![0.0; ncols];
    for (row, y) in design.chunks_exact(ncols).zip(response.iter()) {
        for i in 0..ncols {
            if row[i] == 0.0 {
                continue;
            }
            xty[i] += row[i] * y;
            for j in i..ncols {
                xtx[i * ncols + j] += row[i] * row[j];
            }
        }
    }
    for i in 0..ncols {
        for j in 0..i {
            xtx[i * ncols + j] = xtx[j * ncols + i];
        }
    }

    let max_diag = (0..ncols)
        .map(|i| xtx[i * ncols + i])
        .fold(0.0f64, f64::max);
    let ridge = (max_diag * RELATIVE_RIDGE).max(f64::MIN_POSITIVE);
    for i in 0..ncols {
        xtx[i * ncols + i] += ridge;
    }

    gauss_solve(xtx, xty, ncols)
}

/// Gaussian elimination with partial pivoting on a dense `n x n` system.
fn gauss_solve(mut a: Vec<f64>, mut b: Vec<f64>, n: usize) -> Result<Vec<f64>, RtModelError> {
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&r1, &r2| a[r1 * n + col].abs().total_cmp(&a[r2 * n + col].abs()))
            .ok_or(RtModelError::Singular)?;
        if a[pivot * n + col].abs() < f64::EPSILON * 1e-6 {
            return Err(RtModelError::Singular);
        }
        if pivot != col {
            for k in 0..n {
                a.swap(col * n + k, pivot * n + k);
            }
            b.swap(col, pivot);
        }

        let diag = a[col * n + col];
        for row in (col + 1)..n {
            let factor = a[row * n + col] / diag;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row * n + k] -= factor * a[col * n + k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in (row + 1)..n {
            acc -= a[row * n + k] * x[k];
        }
        x[row] = acc / a[row * n + row];
    }

    if x.iter().all(|v| v.is_finite()) {
        Ok(x)
    } else {
        Err(RtModelError::NonFinite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_two_parameter_system() {
        // y = 2 * x + 1
        let design = [1.0, 1.0, 2.0, 1.0, 3.0, 1.0];
        let response = [3.0, 5.0, 7.0];
        let beta = least_squares(&design, 2, &response).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-6);
        assert!((beta[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_collinear_columns_still_solve() {
        // Second column duplicates the first, the ridge splits the weight.
        let design = [1.0, 1.0, 2.0, 2.0, 3.0, 3.0];
        let response = [2.0, 4.0, 6.0];
        let beta = least_squares(&design, 2, &response).unwrap();
        assert!((beta[0] + beta[1] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_empty_is_error() {
        assert_eq!(least_squares(&[], 2, &[]), Err(RtModelError::NoPoints));
    }
}
