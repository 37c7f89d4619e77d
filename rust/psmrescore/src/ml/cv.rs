use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

/// One train/test partition of the row indices.
///
/// Both index lists are sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffled k-fold splitter.
///
/// The row indices are shuffled once with a seeded generator and cut into
/// `n_splits` contiguous blocks; the first `n % n_splits` blocks get one
/// extra row. Every row lands in exactly one test block, and the same seed
/// always gives the same folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    pub n_splits: usize,
    pub seed: u64,
}

impl KFold {
    pub fn new(n_splits: usize, seed: u64) -> Self {
        Self { n_splits, seed }
    }

    /// Whether `n_rows` rows can be split at all (each test block non-empty).
    pub fn can_split(&self, n_rows: usize) -> bool {
        self.n_splits >= 2 && n_rows >= self.n_splits
    }

    /// Splits `0..n_rows`, returns an empty list if [`KFold::can_split`] is false.
    pub fn split(&self, n_rows: usize) -> Vec<Fold> {
        if !self.can_split(n_rows) {
            return Vec::new();
        }

        let mut order: Vec<usize> = (0..n_rows).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        order.shuffle(&mut rng);

        let base = n_rows / self.n_splits;
        let extra = n_rows % self.n_splits;

        let mut assigned_fold = vec![0usize; n_rows];
        let mut start = 0;
        for fold in 0..self.n_splits {
            let size = base + usize::from(fold < extra);
            for &row in &order[start..start + size] {
                assigned_fold[row] = fold;
            }
            start += size;
        }

        (0..self.n_splits)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..n_rows).partition(|&row| assigned_fold[row] == fold);
                Fold { train, test }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_row_tested_exactly_once() {
        for n_rows in [10, 11, 99, 1000] {
            let folds = KFold::new(10, 42).split(n_rows);
            assert_eq!(folds.len(), 10);

            let mut seen = vec![0usize; n_rows];
            for fold in folds.iter() {
                assert_eq!(fold.train.len() + fold.test.len(), n_rows);
                for &i in fold.test.iter() {
                    seen[i] += 1;
                }
                assert!(fold.test.iter().all(|i| fold.train.binary_search(i).is_err()));
            }
            assert!(seen.iter().all(|&c| c == 1), "n_rows = {}", n_rows);
        }
    }

    #[test]
    fn test_fold_sizes_balanced() {
        let folds = KFold::new(10, 42).split(103);
        let sizes: Vec<usize> = folds.iter().map(|f| f.test.len()).collect();
        assert_eq!(sizes, vec![11, 11, 11, 10, 10, 10, 10, 10, 10, 10]);
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = KFold::new(5, 7).split(200);
        let b = KFold::new(5, 7).split(200);
        let c = KFold::new(5, 8).split(200);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_too_few_rows() {
        let kf = KFold::new(10, 42);
        assert!(!kf.can_split(9));
        assert!(kf.split(9).is_empty());
        assert!(kf.split(0).is_empty());
    }
}
