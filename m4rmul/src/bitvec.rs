use crate::error::M4rError;
use rand::Rng;
use rayon::prelude::*;
use ref_cast::RefCast;
use std::ops::{BitXorAssign, Deref, DerefMut, Index, IndexMut, Range};
use std::sync::atomic::AtomicU32;

/// A block of bits. This is an alias for [`u32`], the native word of the multipliers
pub type BitBlock = u32;

/// Atomic counterpart of [`BitBlock`], used for shared accumulation targets
pub type AtomicBitBlock = AtomicU32;

/// Number of bits in a [`BitBlock`]
pub const BLOCKSIZE: usize = 32;

/// Bitwise AND with this constant to keep only the least significant bit
pub const LSB_ON: BitBlock = 1;

/// Returns the minimum number of [`BitBlock`]s required to store the given number of bits.
///
/// If `bits` is not a multiple of [`BLOCKSIZE`], the result is rounded up to ensure all bits fit.
#[inline]
pub fn min_blocks(bits: usize) -> usize {
    bits / BLOCKSIZE + if bits % BLOCKSIZE == 0 { 0 } else { 1 }
}

/// A mask selecting the lowest `len` bits of a value, for `len <= 32`
#[inline]
pub fn low_mask(len: usize) -> usize {
    if len >= BLOCKSIZE {
        BitBlock::MAX as usize
    } else {
        (1usize << len) - 1
    }
}

/// A vector of bits, stored as a vector of [`BitBlock`]s (which alias to `u32`).
///
/// Bit `i` lives in block `i / BLOCKSIZE`, at position `i % BLOCKSIZE` counted from the least
/// significant bit. This ordering is shared by every matrix in the crate, so a `k`-bit chunk
/// starting at bit `c` reads back as an integer whose bit `b` is bit `c + b` of the vector.
///
/// # Examples
///
/// ```
/// use m4rmul::bitvec::*;
///
/// // Create a BitVec of 128 bits, all set to zero
/// let mut bv = BitVec::zeros(4);
/// bv.set_bit(5, true);
/// assert!(bv.bit(5));
/// assert_eq!(bv.bits(4, 3), 0b010);
/// ```
///
/// # Note
///
/// Many methods are implemented via dereferencing to [`BitRange`], which provides
/// additional bitwise and range operations.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct BitVec(Vec<BitBlock>);

/// A range of bits, represented as a slice of [`BitBlock`]s.
///
/// Provides methods for bitwise operations, iteration, and bit access within the range.
#[derive(RefCast, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[repr(transparent)]
pub struct BitRange([BitBlock]);

impl BitRange {
    /// Returns a copy of the range as a [`BitVec`].
    #[inline]
    pub fn to_vec(&self) -> BitVec {
        self.0.to_vec().into()
    }

    /// The underlying blocks
    #[inline]
    pub fn blocks(&self) -> &[BitBlock] {
        &self.0
    }

    #[inline]
    pub fn blocks_mut(&mut self) -> &mut [BitBlock] {
        &mut self.0
    }

    /// Divides the range into mutable parallel chunks of the given size.
    ///
    /// Useful for parallel processing over disjoint bit regions.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - Number of blocks per chunk.
    #[inline]
    pub fn par_chunks_mut(
        &mut self,
        chunk_size: usize,
    ) -> impl IndexedParallelIterator<Item = &mut BitRange> {
        self.0
            .par_chunks_mut(chunk_size)
            .map(|x| BitRange::ref_cast_mut(x))
    }

    /// Returns an iterator over the [`BitBlock`]s in this range.
    #[inline]
    pub fn block_iter(&self) -> impl Iterator<Item = BitBlock> + '_ {
        self.0.iter().copied()
    }

    /// Returns `true` if every bit in the range is 0
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Computes the dot product (mod 2) of two [`BitRange`]s.
    ///
    /// Returns `true` if the number of matching 1s is odd, otherwise `false`.
    #[inline]
    pub fn dot(&self, rhs: &BitRange) -> bool {
        let mut c = 0;
        for (bits0, bits1) in self.0.iter().zip(rhs.0.iter()) {
            c ^= (*bits0 & *bits1).count_ones() & 1;
        }

        c == 1
    }

    /// Returns the value of the bit at the specified index.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range.
    #[inline]
    pub fn bit(&self, index: usize) -> bool {
        let block_index = index / BLOCKSIZE;
        let bit_index = index % BLOCKSIZE;
        (self.0[block_index] >> bit_index) & LSB_ON == LSB_ON
    }

    /// Sets the bit at the given index to the provided value.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range.
    #[inline]
    pub fn set_bit(&mut self, index: usize, value: bool) {
        let block_index = index / BLOCKSIZE;
        let mask = LSB_ON << (index % BLOCKSIZE);
        if value {
            self.0[block_index] |= mask;
        } else {
            self.0[block_index] &= !mask;
        }
    }

    /// Reads `len <= BLOCKSIZE` consecutive bits starting at bit `start` as an integer, whose
    /// bit `b` is bit `start + b` of the range. The chunk may straddle two blocks.
    ///
    /// # Panics
    ///
    /// Panics if the chunk runs past the end of the range.
    #[inline]
    pub fn bits(&self, start: usize, len: usize) -> usize {
        debug_assert!(len <= BLOCKSIZE);
        if len == 0 {
            return 0;
        }
        let block_index = start / BLOCKSIZE;
        let offset = start % BLOCKSIZE;
        let mut chunk = (self.0[block_index] >> offset) as u64;
        if offset + len > BLOCKSIZE {
            chunk |= (self.0[block_index + 1] as u64) << (BLOCKSIZE - offset);
        }
        (chunk as usize) & low_mask(len)
    }

    /// Overwrites this range with the contents of `source`, which must have the same length
    #[inline]
    pub fn copy_from(&mut self, source: &BitRange) {
        self.0.copy_from_slice(&source.0);
    }

    /// Sets every bit to 0
    #[inline]
    pub fn clear(&mut self) {
        self.0.fill(0);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Index<Range<usize>> for BitRange {
    type Output = BitRange;
    fn index(&self, index: Range<usize>) -> &Self::Output {
        BitRange::ref_cast(&self.0[index])
    }
}

impl Index<usize> for BitRange {
    type Output = BitBlock;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        self.0.index(index)
    }
}

impl IndexMut<usize> for BitRange {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        self.0.index_mut(index)
    }
}

impl IndexMut<Range<usize>> for BitRange {
    fn index_mut(&mut self, index: Range<usize>) -> &mut Self::Output {
        BitRange::ref_cast_mut(self.0.index_mut(index))
    }
}

impl BitVec {
    #[inline]
    pub fn random(rng: &mut impl Rng, num_blocks: usize) -> Self {
        (0..num_blocks).map(|_| rng.random::<BitBlock>()).collect()
    }

    #[inline]
    pub fn zeros(num_blocks: usize) -> Self {
        BitVec(vec![0; num_blocks])
    }

    /// Allocates `num_blocks` zeroed blocks, reporting allocation failure instead of aborting
    pub fn try_zeros(num_blocks: usize) -> Result<Self, M4rError> {
        let mut data = Vec::new();
        data.try_reserve_exact(num_blocks)
            .map_err(|_| M4rError::ResourceExhaustion {
                requested: num_blocks * (BLOCKSIZE / 8),
                available: None,
            })?;
        data.resize(num_blocks, 0);
        Ok(BitVec(data))
    }
}

impl BitXorAssign<&Self> for BitRange {
    #[inline]
    fn bitxor_assign(&mut self, rhs: &BitRange) {
        for (bits0, bits1) in self.0.iter_mut().zip(rhs.0.iter()) {
            *bits0 ^= bits1;
        }
    }
}

impl From<Vec<BitBlock>> for BitVec {
    fn from(value: Vec<BitBlock>) -> Self {
        BitVec(value)
    }
}

impl From<BitVec> for Vec<BitBlock> {
    fn from(value: BitVec) -> Self {
        value.0
    }
}

impl FromIterator<BitBlock> for BitVec {
    fn from_iter<T: IntoIterator<Item = BitBlock>>(iter: T) -> Self {
        Vec::from_iter(iter).into()
    }
}

impl FromIterator<bool> for BitVec {
    fn from_iter<T: IntoIterator<Item = bool>>(iter: T) -> Self {
        let mut v = vec![];
        let mut c = 0;
        let mut block: BitBlock = 0;
        for bit in iter {
            if bit {
                block |= LSB_ON << c;
            }
            c += 1;
            if c == BLOCKSIZE {
                c = 0;
                v.push(block);
                block = 0;
            }
        }

        if c != 0 {
            v.push(block);
        }

        BitVec(v)
    }
}

impl Deref for BitVec {
    type Target = BitRange;
    fn deref(&self) -> &Self::Target {
        BitRange::ref_cast(&self.0)
    }
}

impl DerefMut for BitVec {
    fn deref_mut(&mut self) -> &mut Self::Target {
        BitRange::ref_cast_mut(&mut self.0)
    }
}
