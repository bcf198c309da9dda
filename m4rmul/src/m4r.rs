//! Sequential table-driven ("Method of Four Russians") multiplication
//!
//! The product `c = a * b` is a sum of stripe products
//!
//! ```text
//!   c = Σ_g  a[:, gk..(g+1)k] × b[gk..(g+1)k, :]
//! ```
//!
//! For every stripe `g` we build a [`PrecalcTable`] of the `2^k` combinations of rows
//! `gk..(g+1)k` of `b`, after which row `i` of the stripe product is a single table entry, selected
//! by the `k` bits of row `i` of `a` in that stripe. This turns the `O(k)` row combination per
//! chunk into one lookup, for `O(n^3 / (BLOCKSIZE * k))` word operations overall.
//!
//! The right operand is passed transposed: the `k` rows of `b` making up a stripe are the `k`
//! columns `gk..(g+1)k` of `b_tr`, read as one column strip.

use crate::bitmatrix::BitMatrix;
use crate::config::Config;
use crate::error::M4rError;
use crate::precalc::PrecalcTable;

/// XORs into `c` the product of columns `first_col .. first_col + k` of `a` with the `k` rows the
/// table was built from, i.e. for every row `i` the entry selected by those `k` bits of row `i`
///
/// Several calls with tables covering disjoint column ranges accumulate into the full product.
pub fn m4r_accumulate(
    a: &BitMatrix,
    table: &PrecalcTable,
    first_col: usize,
    c: &mut BitMatrix,
) -> Result<(), M4rError> {
    if a.rows() != c.rows() || table.width() != c.cols() {
        return Err(M4rError::dimension(
            "output shape does not match the operand rows and the table width",
            (a.rows(), table.width()),
            (c.rows(), c.cols()),
        ));
    }
    if first_col + table.subvector_width() > a.cols() {
        return Err(M4rError::dimension(
            format!(
                "columns {}..{} out of range",
                first_col,
                first_col + table.subvector_width()
            ),
            (a.rows(), a.cols()),
            (table.len(), table.width()),
        ));
    }

    for i in 0..a.rows() {
        table.accumulate_chunk(a.row(i), first_col, c.row_mut(i));
    }
    Ok(())
}

/// Computes `a * b` where `b_tr` is the transpose of `b`, one table per `k` rows of `b`.
///
/// Only one table is alive at a time, so memory overhead is `2^k * n` bits. The result is
/// identical to [`crate::naive::multiply`]`(a, &transpose(b_tr))`.
///
/// # Errors
///
/// [`M4rError::DimensionMismatch`] unless `a` and `b_tr` are square of the same dimension `n` with
/// `n` a multiple of the word width and of `config.subvector_width`;
/// [`M4rError::InvalidConfig`] for an invalid `config`.
#[tracing::instrument(skip_all, fields(n = a.rows(), k = config.subvector_width))]
pub fn m4r_multiply(
    a: &BitMatrix,
    b_tr: &BitMatrix,
    config: &Config,
) -> Result<BitMatrix, M4rError> {
    let n = a.check_operands(b_tr)?;
    config.validate_dimension(n)?;
    let k = config.subvector_width;

    let mut c = BitMatrix::try_zeros(n, n)?;
    for first_col in (0..n).step_by(k) {
        let stripe = b_tr.column_strip(first_col, k)?;
        let table = PrecalcTable::build(&stripe, 0, k)?;
        m4r_accumulate(a, &table, first_col, &mut c)?;
    }

    tracing::debug!(tables = n / k, "table-driven multiply finished");
    Ok(c)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{bitmatrix::transpose, naive};
    use rand::{rngs::SmallRng, SeedableRng};

    fn check(n: usize, k: usize, seed: u64) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let a = BitMatrix::random(&mut rng, n, n);
        let b = BitMatrix::random(&mut rng, n, n);
        let config = Config::default()
            .with_subvector_width(k)
            .with_block_size(16 * k);
        let c = m4r_multiply(&a, &transpose(&b), &config).unwrap();
        assert_eq!(c, naive::multiply(&a, &b).unwrap(), "n {n} k {k}");
    }

    #[test]
    fn matches_naive() {
        for n in [32, 64, 128, 256] {
            check(n, 8, n as u64);
        }
    }

    #[test]
    fn other_subvector_widths() {
        check(64, 1, 1);
        check(64, 4, 2);
        check(32, 16, 3);
        check(128, 16, 4);
    }

    #[test]
    fn chunks_straddling_words() {
        // 12 does not divide 32, so some chunks span two words
        check(96, 12, 5);
        check(96, 6, 6);
    }

    #[test]
    fn stripes_accumulate() {
        let mut rng = SmallRng::seed_from_u64(7);
        let a = BitMatrix::random(&mut rng, 64, 64);
        let b = BitMatrix::random(&mut rng, 64, 64);

        // only the stripe of rows 8..16 of b
        let table = PrecalcTable::build(&b, 8, 8).unwrap();
        let mut c = BitMatrix::zeros(64, 64);
        m4r_accumulate(&a, &table, 8, &mut c).unwrap();

        let a_stripe = BitMatrix::build(64, 64, |i, j| (8..16).contains(&j) && a[(i, j)]);
        assert_eq!(c, naive::multiply(&a_stripe, &b).unwrap());

        // accumulating twice cancels out
        m4r_accumulate(&a, &table, 8, &mut c).unwrap();
        assert!(c.is_zero());
    }

    #[test]
    fn rejects_bad_inputs() {
        let a = BitMatrix::zeros(64, 64);
        let config = Config::default();
        assert!(matches!(
            m4r_multiply(&a, &BitMatrix::zeros(32, 32), &config),
            Err(M4rError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            m4r_multiply(&a, &a, &config.with_subvector_width(12).with_block_size(96)),
            Err(M4rError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            m4r_multiply(&a, &a, &config.with_subvector_width(0)),
            Err(M4rError::InvalidConfig(_))
        ));

        let table = PrecalcTable::build(&a, 0, 8).unwrap();
        let mut c = BitMatrix::zeros(64, 64);
        assert!(m4r_accumulate(&a, &table, 60, &mut c).is_err());
        let mut narrow = BitMatrix::zeros(64, 32);
        assert!(m4r_accumulate(&a, &table, 0, &mut narrow).is_err());
    }
}
