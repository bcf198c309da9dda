//! Explicit configuration shared by every multiplier

use crate::bitvec::BLOCKSIZE;
use crate::error::M4rError;

/// Largest supported subvector width. A table holds `2^k` rows, so this caps a single table at
/// 65536 rows.
pub const MAX_SUBVECTOR_WIDTH: usize = 16;

/// Default number of rows grouped into one precomputed table
pub const DEFAULT_SUBVECTOR_WIDTH: usize = 8;

/// Default number of rows of the right operand handled by one stream in the partitioned
/// strategy
pub const DEFAULT_BLOCK_SIZE: usize = 128;

/// Default upper bound on units per launch block
pub const DEFAULT_MAX_THREADS_PER_BLOCK: usize = 1024;

/// Parameters of a multiply call
///
/// A `Config` is validated once at the start of each call with [`Config::validate`] and the
/// dimension checks that go with the chosen strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// bits per storage word; must equal [`BLOCKSIZE`]
    pub word_width: usize,

    /// the subvector width `k`: rows per table, `2^k` entries per table
    pub subvector_width: usize,

    /// rows of the right operand per stream in the partitioned strategy
    pub block_size: usize,

    /// the most units a single launch block may contain
    pub max_threads_per_block: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            word_width: BLOCKSIZE,
            subvector_width: DEFAULT_SUBVECTOR_WIDTH,
            block_size: DEFAULT_BLOCK_SIZE,
            max_threads_per_block: DEFAULT_MAX_THREADS_PER_BLOCK,
        }
    }
}

impl Config {
    /// Returns a copy of this configuration with a different subvector width
    pub fn with_subvector_width(mut self, k: usize) -> Self {
        self.subvector_width = k;
        self
    }

    /// Returns a copy of this configuration with a different block size
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Returns a copy of this configuration with a different per-block thread limit
    pub fn with_max_threads_per_block(mut self, max_threads_per_block: usize) -> Self {
        self.max_threads_per_block = max_threads_per_block;
        self
    }

    /// Checks the parameters against each other, independently of any operand
    pub fn validate(&self) -> Result<(), M4rError> {
        if self.word_width != BLOCKSIZE {
            return Err(M4rError::InvalidConfig(format!(
                "word width {} does not match the storage word of {} bits",
                self.word_width, BLOCKSIZE
            )));
        }
        if self.subvector_width == 0 || self.subvector_width > MAX_SUBVECTOR_WIDTH {
            return Err(M4rError::InvalidConfig(format!(
                "subvector width {} outside 1..={}",
                self.subvector_width, MAX_SUBVECTOR_WIDTH
            )));
        }
        if self.block_size == 0 || self.block_size % self.subvector_width != 0 {
            return Err(M4rError::InvalidConfig(format!(
                "block size {} is not a positive multiple of the subvector width {}",
                self.block_size, self.subvector_width
            )));
        }
        if self.max_threads_per_block == 0 {
            return Err(M4rError::InvalidConfig(
                "max threads per block must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    /// Checks that an `n x n` problem can be run by the table-driven paths
    pub fn validate_dimension(&self, n: usize) -> Result<(), M4rError> {
        self.validate()?;
        check_word_aligned(n)?;
        if n % self.subvector_width != 0 {
            return Err(M4rError::dimension(
                format!(
                    "dimension is not a multiple of the subvector width {}",
                    self.subvector_width
                ),
                (n, n),
                (n, n),
            ));
        }
        Ok(())
    }

    /// Checks that an `n x n` problem can be partitioned into whole blocks
    pub fn validate_partitioned(&self, n: usize) -> Result<(), M4rError> {
        self.validate_dimension(n)?;
        if n % self.block_size != 0 {
            return Err(M4rError::dimension(
                format!("dimension is not a multiple of the block size {}", self.block_size),
                (n, n),
                (n, n),
            ));
        }
        Ok(())
    }

    /// Number of tables built for one block in the partitioned strategy
    #[inline]
    pub fn tables_per_block(&self) -> usize {
        self.block_size / self.subvector_width
    }
}

/// Checks that `n` is a positive multiple of the word width
pub fn check_word_aligned(n: usize) -> Result<(), M4rError> {
    if n == 0 || n % BLOCKSIZE != 0 {
        return Err(M4rError::dimension(
            format!("dimension is not a positive multiple of the word width {}", BLOCKSIZE),
            (n, n),
            (n, n),
        ));
    }
    Ok(())
}
