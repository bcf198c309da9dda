use super::{Device, MemoryReservation};
use crate::bitmatrix::BitMatrix;
use crate::bitvec::*;
use crate::error::M4rError;
use std::sync::atomic::Ordering;

/// A device matrix whose words can be XOR-accumulated concurrently
///
/// Every contribution is applied with an atomic `fetch_xor`, so units on different streams may
/// add partial products to the same words in any order and the final contents are always the XOR
/// of all contributions. The contents are only read back with [`AtomicBitMatrix::into_matrix`],
/// after every contributing stream has finished.
#[derive(Debug)]
pub struct AtomicBitMatrix<'d> {
    rows: usize,
    cols: usize,
    col_blocks: usize,
    data: Vec<AtomicBitBlock>,
    _memory: MemoryReservation<'d>,
}

impl<'d> AtomicBitMatrix<'d> {
    pub(crate) fn zeros(device: &'d Device, rows: usize, cols: usize) -> Result<Self, M4rError> {
        let col_blocks = min_blocks(cols);
        let num_blocks = rows * col_blocks;
        let memory = device.reserve(num_blocks * (BLOCKSIZE / 8))?;
        let mut data = Vec::new();
        data.try_reserve_exact(num_blocks)
            .map_err(|_| M4rError::ResourceExhaustion {
                requested: num_blocks * (BLOCKSIZE / 8),
                available: None,
            })?;
        data.extend((0..num_blocks).map(|_| AtomicBitBlock::new(0)));
        Ok(AtomicBitMatrix {
            rows,
            cols,
            col_blocks,
            data,
            _memory: memory,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Atomically XORs `bits` into row `row`. Zero words are skipped.
    #[inline]
    pub fn xor_row(&self, row: usize, bits: &BitRange) {
        let start = row * self.col_blocks;
        for (target, bits) in self.data[start..start + self.col_blocks]
            .iter()
            .zip(bits.block_iter())
        {
            if bits != 0 {
                target.fetch_xor(bits, Ordering::Relaxed);
            }
        }
    }

    /// Consumes the accumulator and returns its contents as an ordinary matrix
    pub fn into_matrix(self) -> Result<BitMatrix, M4rError> {
        let data: BitVec = self
            .data
            .into_iter()
            .map(AtomicBitBlock::into_inner)
            .collect();
        BitMatrix::from_bitvec(self.rows, self.cols, data)
    }
}
