//! Reference GF(2) multiplication: every output bit is the parity of a row of `a` ANDed with a
//! column of `b`. Every other multiplier in the crate must agree with [`multiply`] bit for bit.

use crate::bitmatrix::BitMatrix;
use crate::bitvec::BitVec;
use crate::error::M4rError;

/// Column `j` of `m` as a packed vector, gathered bit by bit
fn column(m: &BitMatrix, j: usize) -> BitVec {
    (0..m.rows()).map(|t| m.bit(t, j)).collect()
}

/// Computes `c = a * b` over GF(2), with `c[(i, j)]` the dot product of row `i` of `a` and
/// column `j` of `b`.
///
/// Costs `O(n^3 / BLOCKSIZE)` word operations and performs no precomputation beyond collecting the
/// columns of `b`.
///
/// # Errors
///
/// [`M4rError::DimensionMismatch`] if the operands are not square matrices of the same
/// word-aligned dimension.
pub fn multiply(a: &BitMatrix, b: &BitMatrix) -> Result<BitMatrix, M4rError> {
    let n = a.check_operands(b)?;
    let columns: Vec<BitVec> = (0..n).map(|j| column(b, j)).collect();
    let mut c = BitMatrix::try_zeros(n, n)?;
    for i in 0..n {
        let row = a.row(i);
        for (j, col) in columns.iter().enumerate() {
            if row.dot(col) {
                c.set_bit(i, j, true);
            }
        }
    }
    Ok(c)
}
