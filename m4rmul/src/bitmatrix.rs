pub mod parallel;

use crate::bitvec::*;
use crate::error::M4rError;
use rand::Rng;
use std::{
    fmt,
    ops::{BitXor, BitXorAssign, Index},
};

/// A matrix of bits, represented as a vector of blocks of bits
///
/// The matrix is stored in row-major order, with each row represented as a `BitRange` of `BitBlock`s. If
/// the number of columns is not a multiple of `BLOCKSIZE`, the last block in each row will be padded with 0s.
/// Column `c` of a row lives in block `c / BLOCKSIZE` at bit `c % BLOCKSIZE`, counted from the least
/// significant bit.
///
/// The multipliers only accept square matrices whose dimension is a multiple of `BLOCKSIZE`, in which
/// case there is no padding and the whole matrix occupies exactly `n * n / 8` bytes.
#[derive(Clone, Debug)]
pub struct BitMatrix {
    /// the number of logical rows in the matrix
    rows: usize,

    /// the number of logical columns in the matrix
    cols: usize,

    /// the number of [`BitBlock`]s used to store each row, i.e. actual 2D matrix has `col_blocks * BLOCKSIZE` many columns
    col_blocks: usize,

    /// a [`BitVec`] containing the data of the matrix, stored in row-major order
    data: BitVec,
}

impl BitMatrix {
    #[inline]
    pub fn bit(&self, i: usize, j: usize) -> bool {
        self.data.bit(self.col_blocks * BLOCKSIZE * i + j)
    }

    #[inline]
    pub fn set_bit(&mut self, i: usize, j: usize, b: bool) {
        self.data.set_bit(self.col_blocks * BLOCKSIZE * i + j, b);
    }

    pub fn build(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let col_blocks = min_blocks(cols);
        let data = (0..rows)
            .flat_map(|i| (0..BLOCKSIZE * col_blocks).map(move |j| (i, j)))
            .map(|(i, j)| if j < cols { f(i, j) } else { false })
            .collect();
        BitMatrix {
            rows,
            cols,
            col_blocks,
            data,
        }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        let col_blocks = min_blocks(cols);
        BitMatrix {
            rows,
            cols,
            col_blocks,
            data: BitVec::zeros(rows * col_blocks),
        }
    }

    /// Like [`BitMatrix::zeros`], but reports a failed allocation as
    /// [`M4rError::ResourceExhaustion`]
    pub fn try_zeros(rows: usize, cols: usize) -> Result<Self, M4rError> {
        let col_blocks = min_blocks(cols);
        Ok(BitMatrix {
            rows,
            cols,
            col_blocks,
            data: BitVec::try_zeros(rows * col_blocks)?,
        })
    }

    /// Wraps row-major blocks as a `rows x cols` matrix
    pub fn from_bitvec(rows: usize, cols: usize, data: BitVec) -> Result<Self, M4rError> {
        let col_blocks = min_blocks(cols);
        if data.len() != rows * col_blocks {
            return Err(M4rError::dimension(
                format!(
                    "expected {} blocks of row-major data, got {}",
                    rows * col_blocks,
                    data.len()
                ),
                (rows, cols),
                (data.len(), BLOCKSIZE),
            ));
        }
        Ok(BitMatrix {
            rows,
            cols,
            col_blocks,
            data,
        })
    }

    pub fn identity(size: usize) -> Self {
        let mut m = BitMatrix::zeros(size, size);
        for i in 0..size {
            m.set_bit(i, i, true);
        }
        m
    }

    #[inline]
    pub fn random(rng: &mut impl Rng, rows: usize, cols: usize) -> Self {
        let col_blocks = min_blocks(cols);
        let num_blocks = rows * col_blocks;
        let mask = if cols % BLOCKSIZE == 0 {
            BitBlock::MAX
        } else {
            low_mask(cols % BLOCKSIZE) as BitBlock
        };
        let data = (0..num_blocks)
            .map(|i| {
                if i % col_blocks == col_blocks - 1 {
                    mask & rng.random::<BitBlock>()
                } else {
                    rng.random::<BitBlock>()
                }
            })
            .collect();
        BitMatrix {
            rows,
            cols,
            col_blocks,
            data,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of [`BitBlock`]s per row
    #[inline]
    pub fn col_blocks(&self) -> usize {
        self.col_blocks
    }

    /// Size of the packed data in bytes
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.data.len() * (BLOCKSIZE / 8)
    }

    /// All rows as one range of blocks, in row-major order
    #[inline]
    pub fn data(&self) -> &BitRange {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut BitRange {
        &mut self.data
    }

    #[inline]
    pub fn row(&self, row: usize) -> &BitRange {
        &self.data[row * self.col_blocks..(row + 1) * self.col_blocks]
    }

    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut BitRange {
        &mut self.data[row * self.col_blocks..(row + 1) * self.col_blocks]
    }

    /// Returns true if every bit is 0
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.data.is_zero()
    }

    /// The `width x rows` matrix whose row `b` is column `first_col + b` of this matrix.
    ///
    /// Reading a strip of `width <= BLOCKSIZE` columns of a transposed operand this way yields
    /// `width` consecutive rows of the untransposed operand, ready for table building.
    pub fn column_strip(&self, first_col: usize, width: usize) -> Result<Self, M4rError> {
        if width > BLOCKSIZE || first_col + width > self.cols {
            return Err(M4rError::dimension(
                format!("column strip {}..{} out of range", first_col, first_col + width),
                (self.rows, self.cols),
                (width, self.rows),
            ));
        }
        let mut strip = BitMatrix::try_zeros(width, self.rows)?;
        for j in 0..self.rows {
            let mut chunk = self.row(j).bits(first_col, width);
            while chunk != 0 {
                let b = chunk.trailing_zeros() as usize;
                strip.set_bit(b, j, true);
                chunk &= chunk - 1;
            }
        }
        Ok(strip)
    }

    /// Checks that `self` and `rhs` are square matrices of the same word-aligned dimension, and
    /// returns that dimension
    pub fn check_operands(&self, rhs: &BitMatrix) -> Result<usize, M4rError> {
        let left = (self.rows, self.cols);
        let right = (rhs.rows, rhs.cols);
        if self.rows != self.cols || rhs.rows != rhs.cols {
            return Err(M4rError::dimension("operands must be square", left, right));
        }
        if self.rows != rhs.rows {
            return Err(M4rError::dimension("operands differ in size", left, right));
        }
        if self.rows == 0 || self.rows % BLOCKSIZE != 0 {
            return Err(M4rError::dimension(
                format!("dimension is not a positive multiple of the word width {}", BLOCKSIZE),
                left,
                right,
            ));
        }
        Ok(self.rows)
    }

    /// Transposes a single `BLOCKSIZE x BLOCKSIZE` block held in `buffer`, so that bit `c` of
    /// `buffer[r]` moves to bit `r` of `buffer[c]`
    ///
    /// Works by iteratively swapping the off-diagonal halves of blocks of half the size until we
    /// get down to block size 1.
    #[inline]
    pub(crate) fn transpose_block(buffer: &mut [BitBlock; BLOCKSIZE]) {
        let mut swap_width = BLOCKSIZE;
        let mut swap_mask = BitBlock::MAX;
        while swap_width != 1 {
            swap_width >>= 1;

            // mask that picks the low half of the bits in each group of 2 * swap_width bits
            swap_mask ^= swap_mask << swap_width;

            for block_row in (0..BLOCKSIZE).step_by(swap_width * 2) {
                for row in block_row..block_row + swap_width {
                    let t = ((buffer[row] >> swap_width) ^ buffer[row + swap_width]) & swap_mask;
                    buffer[row + swap_width] ^= t;
                    buffer[row] ^= t << swap_width;
                }
            }
        }
    }

    /// Main working function for transposition: copies bits from `source` in transposed
    /// position into `self`, one `BLOCKSIZE x BLOCKSIZE` block at a time
    fn transpose_helper(&mut self, source: &BitMatrix) {
        let mut buffer: [BitBlock; BLOCKSIZE] = [0; BLOCKSIZE];
        for i in 0..min_blocks(self.rows) {
            for j in 0..self.col_blocks {
                // load block column i of source rows BLOCKSIZE * j .. into the buffer
                for (k, slot) in buffer.iter_mut().enumerate() {
                    let source_row = BLOCKSIZE * j + k;
                    *slot = if source_row < source.rows {
                        source.data[source_row * source.col_blocks + i]
                    } else {
                        0
                    };
                }

                Self::transpose_block(&mut buffer);

                for (k, &bits) in buffer.iter().enumerate() {
                    let dest_row = BLOCKSIZE * i + k;
                    if dest_row < self.rows {
                        self.data[dest_row * self.col_blocks + j] = bits;
                    }
                }
            }
        }
    }

    /// Returns a transposed copy of the matrix
    #[inline]
    pub fn transposed(&self) -> Self {
        let mut dest = Self::zeros(self.cols, self.rows);
        dest.transpose_helper(self);
        dest
    }
}

/// Returns the transpose `b_tr` of `b`, with `b_tr[(j, i)] == b[(i, j)]`
#[tracing::instrument(level = "trace", skip_all, fields(rows = b.rows(), cols = b.cols()))]
pub fn transpose(b: &BitMatrix) -> BitMatrix {
    b.transposed()
}

/// Two matrices are considered equal if they represent the same logical matrix
impl PartialEq for BitMatrix {
    fn eq(&self, other: &Self) -> bool {
        if self.rows() != other.rows() || self.cols() != other.cols() {
            return false;
        }

        for i in 0..self.rows() {
            if self.row(i) != other.row(i) {
                return false;
            }
        }

        true
    }
}

impl Eq for BitMatrix {}

impl Index<(usize, usize)> for BitMatrix {
    type Output = bool;

    #[inline]
    fn index(&self, index: (usize, usize)) -> &Self::Output {
        if self.bit(index.0, index.1) {
            &true
        } else {
            &false
        }
    }
}

impl fmt::Display for BitMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..self.rows {
            for j in 0..self.cols {
                write!(f, " {} ", if self[(i, j)] { 1 } else { 0 })?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

impl BitXorAssign<&BitMatrix> for BitMatrix {
    fn bitxor_assign(&mut self, rhs: &BitMatrix) {
        if self.rows != rhs.rows || self.cols != rhs.cols {
            panic!(
                "Attempting to add matrices of different shapes: {}x{} != {}x{}",
                self.rows, self.cols, rhs.rows, rhs.cols
            );
        }
        *self.data ^= &rhs.data;
    }
}

impl BitXor for &BitMatrix {
    type Output = BitMatrix;
    fn bitxor(self, rhs: Self) -> Self::Output {
        let mut res = self.clone();
        res ^= rhs;
        res
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn identity() {
        let m = BitMatrix::identity(100);
        for i in 0..100 {
            for j in 0..100 {
                assert_eq!(m[(i, j)], i == j);
            }
        }
    }

    #[test]
    fn random_is_padded_with_zeros() {
        let mut rng = SmallRng::seed_from_u64(1);
        let m = BitMatrix::random(&mut rng, 10, 40);
        for i in 0..m.rows() {
            for j in m.cols()..m.col_blocks() * BLOCKSIZE {
                assert!(!m.row(i).bit(j));
            }
        }
    }

    #[test]
    fn transpose_block_single() {
        let mut buffer = [0; BLOCKSIZE];
        buffer[3] = 1 << 17;
        BitMatrix::transpose_block(&mut buffer);
        for (r, &bits) in buffer.iter().enumerate() {
            assert_eq!(bits, if r == 17 { 1 << 3 } else { 0 });
        }
    }

    #[test]
    fn transpose() {
        let mut rng = SmallRng::seed_from_u64(1);
        let m = BitMatrix::random(&mut rng, 10, 4);
        let n = m.transposed();
        for i in 0..m.rows() {
            for j in 0..m.cols() {
                assert_eq!(m[(i, j)], n[(j, i)]);
            }
        }

        let m = BitMatrix::random(&mut rng, 300, 200);
        let n = m.transposed();
        for i in 0..m.rows() {
            for j in 0..m.cols() {
                assert_eq!(m[(i, j)], n[(j, i)]);
            }
        }
    }

    #[test]
    fn transpose_involution() {
        let mut rng = SmallRng::seed_from_u64(7);
        for n in [32, 64, 96, 160, 256] {
            let m = BitMatrix::random(&mut rng, n, n);
            assert_eq!(super::transpose(&super::transpose(&m)), m);
        }
    }

    #[test]
    fn column_strip() {
        let mut rng = SmallRng::seed_from_u64(2);
        let b = BitMatrix::random(&mut rng, 64, 64);
        let b_tr = b.transposed();
        for (first, width) in [(0, 8), (8, 8), (28, 8), (60, 4), (0, 32)] {
            let strip = b_tr.column_strip(first, width).unwrap();
            assert_eq!(strip.rows(), width);
            for r in 0..width {
                assert_eq!(strip.row(r), b.row(first + r));
            }
        }
        assert!(b_tr.column_strip(60, 8).is_err());
    }

    #[test]
    fn check_operands() {
        let a = BitMatrix::zeros(64, 64);
        assert_eq!(a.check_operands(&BitMatrix::zeros(64, 64)), Ok(64));
        assert!(a.check_operands(&BitMatrix::zeros(32, 32)).is_err());
        assert!(a.check_operands(&BitMatrix::zeros(64, 32)).is_err());
        assert!(BitMatrix::zeros(40, 40)
            .check_operands(&BitMatrix::zeros(40, 40))
            .is_err());
    }

    #[test]
    fn xor_is_elementwise() {
        let mut rng = SmallRng::seed_from_u64(4);
        let m1 = BitMatrix::random(&mut rng, 40, 70);
        let m2 = BitMatrix::random(&mut rng, 40, 70);
        let m3 = &m1 ^ &m2;
        for i in 0..m3.rows() {
            for j in 0..m3.cols() {
                assert_eq!(m3[(i, j)], m1[(i, j)] ^ m2[(i, j)]);
            }
        }
        assert!((&m3 ^ &m3).is_zero());
    }

    #[test]
    fn from_bitvec_checks_length() {
        let data = BitVec::zeros(4);
        assert!(BitMatrix::from_bitvec(2, 64, data.clone()).is_ok());
        assert!(BitMatrix::from_bitvec(3, 64, data).is_err());
    }
}
