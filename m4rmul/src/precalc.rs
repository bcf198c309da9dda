//! Precomputed tables of XOR-combinations ("Four Russians" tables)
//!
//! For a block of `k` consecutive rows of a source matrix, a [`PrecalcTable`] stores all `2^k`
//! linear combinations of those rows. Entry `s` is the XOR of the rows selected by the set bits of
//! `s` (bit `b` of `s` selects row `b` of the block), so entry 0 is the zero vector. Building the
//! table costs `O(2^k * n / BLOCKSIZE)`; afterwards combining any subset of the `k` rows costs a
//! single lookup and one row XOR.

use crate::bitmatrix::BitMatrix;
use crate::bitvec::*;
use crate::config::MAX_SUBVECTOR_WIDTH;
use crate::error::M4rError;

/// All `2^k` XOR-combinations of `k` consecutive rows of a source matrix
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrecalcTable {
    /// the subvector width `k`
    k: usize,

    /// `2^k` rows, each as wide as the source rows
    entries: BitMatrix,
}

pub(crate) fn check_source(
    source: &BitMatrix,
    first_row: usize,
    k: usize,
) -> Result<(), M4rError> {
    if k == 0 || k > MAX_SUBVECTOR_WIDTH {
        return Err(M4rError::InvalidConfig(format!(
            "subvector width {} outside 1..={}",
            k, MAX_SUBVECTOR_WIDTH
        )));
    }
    if first_row + k > source.rows() {
        return Err(M4rError::dimension(
            format!("source rows {}..{} out of range", first_row, first_row + k),
            (source.rows(), source.cols()),
            (k, source.cols()),
        ));
    }
    Ok(())
}

impl PrecalcTable {
    /// Builds the table for rows `first_row .. first_row + k` of `source`.
    ///
    /// The table is filled by doubling: once the entries below `2^b` hold every combination of
    /// the first `b` rows, entry `2^b + s` is entry `s` plus row `b`.
    pub fn build(source: &BitMatrix, first_row: usize, k: usize) -> Result<Self, M4rError> {
        check_source(source, first_row, k)?;
        let mut table = Self::zeroed(k, source.cols())?;
        let cb = source.col_blocks();
        let data = table.entries.data_mut().blocks_mut();
        for b in 0..k {
            let row = source.row(first_row + b).blocks();
            let half = 1 << b;
            let (lower, upper) = data.split_at_mut(half * cb);
            for s in 0..half {
                let target = &mut upper[s * cb..(s + 1) * cb];
                for ((t, &l), &r) in target.iter_mut().zip(&lower[s * cb..]).zip(row) {
                    *t = l ^ r;
                }
            }
        }
        Ok(table)
    }

    /// Computes entry `s` of the table for rows `first_row .. first_row + k` of `source` directly,
    /// writing it into `out`. Costs `O(k * n / BLOCKSIZE)` and touches nothing else, so every entry
    /// of a table can be produced by an independent unit.
    #[inline]
    pub fn entry(source: &BitMatrix, first_row: usize, s: usize, out: &mut BitRange) {
        out.clear();
        let mut bits = s;
        while bits != 0 {
            let b = bits.trailing_zeros() as usize;
            *out ^= source.row(first_row + b);
            bits &= bits - 1;
        }
    }

    /// An all-zero table, to be filled entry by entry
    pub(crate) fn zeroed(k: usize, width: usize) -> Result<Self, M4rError> {
        Ok(PrecalcTable {
            k,
            entries: BitMatrix::try_zeros(1 << k, width)?,
        })
    }

    /// The entries, for kernels that fill the table one entry per unit
    pub(crate) fn entries_mut(&mut self) -> &mut BitMatrix {
        &mut self.entries
    }

    /// The combination of source rows selected by the bits of `s`
    #[inline]
    pub fn get(&self, s: usize) -> &BitRange {
        self.entries.row(s)
    }

    /// XORs into `out` the entry selected by the `k` bits of `a_row` starting at column
    /// `first_col`
    #[inline]
    pub fn accumulate_chunk(&self, a_row: &BitRange, first_col: usize, out: &mut BitRange) {
        let s = a_row.bits(first_col, self.k);
        if s != 0 {
            *out ^= self.get(s);
        }
    }

    #[inline]
    pub fn subvector_width(&self) -> usize {
        self.k
    }

    /// Number of entries, `2^k`
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.rows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of bits per entry
    #[inline]
    pub fn width(&self) -> usize {
        self.entries.cols()
    }

    /// Bytes needed by a table with subvector width `k` and entries of `width` bits
    #[inline]
    pub fn size_bytes(k: usize, width: usize) -> usize {
        (1 << k) * min_blocks(width) * (BLOCKSIZE / 8)
    }
}

/// The tables of one row-block in the partitioned strategy: `block_size / k` tables covering
/// rows `first_row .. first_row + block_size` of the source, `k` rows each
#[derive(Clone, Debug)]
pub struct BlockTables {
    first_row: usize,
    tables: Vec<PrecalcTable>,
}

impl BlockTables {
    /// Builds every table of the block sequentially
    pub fn build(
        source: &BitMatrix,
        first_row: usize,
        block_size: usize,
        k: usize,
    ) -> Result<Self, M4rError> {
        Self::check_block(source, first_row, block_size, k)?;
        let tables = (0..block_size / k)
            .map(|g| PrecalcTable::build(source, first_row + g * k, k))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BlockTables { first_row, tables })
    }

    /// Groups tables built elsewhere, one per `k` rows starting at `first_row`
    pub(crate) fn from_tables(first_row: usize, tables: Vec<PrecalcTable>) -> Self {
        BlockTables { first_row, tables }
    }

    pub(crate) fn check_block(
        source: &BitMatrix,
        first_row: usize,
        block_size: usize,
        k: usize,
    ) -> Result<(), M4rError> {
        if k == 0 || block_size % k != 0 {
            return Err(M4rError::InvalidConfig(format!(
                "block size {} is not a multiple of the subvector width {}",
                block_size, k
            )));
        }
        if first_row + block_size > source.rows() {
            return Err(M4rError::dimension(
                format!("block rows {}..{} out of range", first_row, first_row + block_size),
                (source.rows(), source.cols()),
                (block_size, source.cols()),
            ));
        }
        Ok(())
    }

    /// Adds to `out` the partial product of `a_row` with the rows of this block, i.e. the XOR of
    /// the block rows selected by columns `first_row .. first_row + block_size` of `a_row`
    #[inline]
    pub fn accumulate_row(&self, a_row: &BitRange, out: &mut BitRange) {
        let mut col = self.first_row;
        for table in &self.tables {
            table.accumulate_chunk(a_row, col, out);
            col += table.subvector_width();
        }
    }

    #[inline]
    pub fn first_row(&self) -> usize {
        self.first_row
    }

    #[inline]
    pub fn tables(&self) -> &[PrecalcTable] {
        &self.tables
    }

    /// Bytes needed by the tables of one block
    #[inline]
    pub fn size_bytes(block_size: usize, k: usize, width: usize) -> usize {
        (block_size / k) * PrecalcTable::size_bytes(k, width)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    fn brute_force(source: &BitMatrix, first_row: usize, k: usize, s: usize) -> BitVec {
        let mut v = BitVec::zeros(source.col_blocks());
        for b in 0..k {
            if (s >> b) & 1 == 1 {
                *v ^= source.row(first_row + b);
            }
        }
        v
    }

    #[test]
    fn exhaustive_small_k() {
        let mut rng = SmallRng::seed_from_u64(1);
        let source = BitMatrix::random(&mut rng, 40, 96);
        for k in 1..=8 {
            let table = PrecalcTable::build(&source, 3, k).unwrap();
            assert_eq!(table.len(), 1 << k);
            assert_eq!(table.width(), 96);
            assert!(table.get(0).is_zero());
            for s in 0..(1 << k) {
                assert_eq!(table.get(s), &*brute_force(&source, 3, k, s), "k {k} s {s}");
            }
        }
    }

    #[test]
    fn entry_matches_build() {
        let mut rng = SmallRng::seed_from_u64(2);
        let source = BitMatrix::random(&mut rng, 16, 64);
        let table = PrecalcTable::build(&source, 8, 6).unwrap();
        let mut out = BitVec::zeros(2);
        for s in 0..table.len() {
            PrecalcTable::entry(&source, 8, s, &mut out);
            assert_eq!(table.get(s), &*out);
        }
    }

    #[test]
    fn single_rows() {
        let mut rng = SmallRng::seed_from_u64(3);
        let source = BitMatrix::random(&mut rng, 8, 32);
        let table = PrecalcTable::build(&source, 0, 8).unwrap();
        for b in 0..8 {
            assert_eq!(table.get(1 << b), source.row(b));
        }
    }

    #[test]
    fn accumulate_chunk_selects_by_columns() {
        let mut rng = SmallRng::seed_from_u64(4);
        let source = BitMatrix::random(&mut rng, 64, 64);
        let table = PrecalcTable::build(&source, 28, 8).unwrap();

        // a row with columns 28 and 35 set picks rows 28 and 35
        let mut a_row = BitVec::zeros(2);
        a_row.set_bit(28, true);
        a_row.set_bit(35, true);
        a_row.set_bit(36, true);
        let mut out = BitVec::zeros(2);
        table.accumulate_chunk(&a_row, 28, &mut out);

        let mut expected = source.row(28).to_vec();
        *expected ^= source.row(35);
        assert_eq!(out, expected);
    }

    #[test]
    fn rejects_bad_sources() {
        let source = BitMatrix::zeros(8, 32);
        assert!(matches!(
            PrecalcTable::build(&source, 4, 8),
            Err(M4rError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            PrecalcTable::build(&source, 0, 0),
            Err(M4rError::InvalidConfig(_))
        ));
        assert!(matches!(
            BlockTables::build(&source, 0, 6, 4),
            Err(M4rError::InvalidConfig(_))
        ));
    }

    #[test]
    fn block_tables_sum_block_rows() {
        let mut rng = SmallRng::seed_from_u64(5);
        let source = BitMatrix::random(&mut rng, 128, 64);
        let block = BlockTables::build(&source, 64, 32, 4).unwrap();
        assert_eq!(block.tables().len(), 8);
        assert_eq!(BlockTables::size_bytes(32, 4, 64), 8 * 16 * 8);

        let a_row = BitVec::random(&mut rng, 4);
        let mut out = BitVec::zeros(2);
        block.accumulate_row(&a_row, &mut out);

        let mut expected = BitVec::zeros(2);
        for t in 64..96 {
            if a_row.bit(t) {
                *expected ^= source.row(t);
            }
        }
        assert_eq!(out, expected);
    }
}
