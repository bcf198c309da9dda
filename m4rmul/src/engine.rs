//! A configured multiplier with a choice of strategies

use crate::bitmatrix::{transpose, BitMatrix};
use crate::bitvec::{min_blocks, BLOCKSIZE};
use crate::config::Config;
use crate::device::Device;
use crate::error::M4rError;
use crate::precalc::{BlockTables, PrecalcTable};
use crate::{accel, m4r, naive};
use rand::Rng;
use std::fmt;

/// Which algorithm [`Engine::multiply`] runs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// [`naive::multiply`], the reference oracle
    Naive,
    /// [`m4r::m4r_multiply`] on the host
    M4r,
    /// [`accel::m4r_multiply`], all tables resident at once
    DeviceM4r,
    /// [`accel::direct_multiply`]
    Direct,
    /// [`accel::streamed_multiply`], one stream per block of rows
    Streamed,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Naive,
        Strategy::M4r,
        Strategy::DeviceM4r,
        Strategy::Direct,
        Strategy::Streamed,
    ];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Naive => "naive",
            Strategy::M4r => "m4r",
            Strategy::DeviceM4r => "device-m4r",
            Strategy::Direct => "direct",
            Strategy::Streamed => "streamed",
        };
        write!(f, "{}", name)
    }
}

/// A validated [`Config`] together with the [`Device`] that runs the accelerated strategies
#[derive(Debug)]
pub struct Engine {
    config: Config,
    device: Device,
}

impl Engine {
    /// An engine on a device with one worker per core and no memory limit
    pub fn new(config: Config) -> Result<Self, M4rError> {
        let device = Device::new(&config)?;
        Ok(Engine { config, device })
    }

    pub fn with_device(config: Config, device: Device) -> Result<Self, M4rError> {
        config.validate()?;
        Ok(Engine { config, device })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Bytes of device memory taken by the tables of [`Strategy::DeviceM4r`] for an `n x n`
    /// problem
    pub fn global_table_bytes(&self, n: usize) -> usize {
        let k = self.config.subvector_width;
        (n / k) * PrecalcTable::size_bytes(k, n)
    }

    /// Bytes of device memory taken by the tables of one stream of [`Strategy::Streamed`] for an
    /// `n x n` problem
    pub fn stream_table_bytes(&self, n: usize) -> usize {
        BlockTables::size_bytes(self.config.block_size, self.config.subvector_width, n)
    }

    /// Computes `a * b` with the given strategy
    pub fn multiply(
        &self,
        strategy: Strategy,
        a: &BitMatrix,
        b: &BitMatrix,
    ) -> Result<BitMatrix, M4rError> {
        match strategy {
            Strategy::Naive => naive::multiply(a, b),
            Strategy::M4r => {
                a.check_operands(b)?;
                m4r::m4r_multiply(a, &transpose(b), &self.config)
            }
            Strategy::DeviceM4r => accel::m4r_multiply(&self.device, a, b, &self.config),
            Strategy::Direct => accel::direct_multiply(&self.device, a, b, &self.config),
            Strategy::Streamed => accel::streamed_multiply(&self.device, a, b, &self.config),
        }
    }

    /// The accelerated strategy [`Engine::auto_multiply`] picks for an `n x n` problem:
    ///
    /// - [`Strategy::DeviceM4r`] if `n` is a multiple of the subvector width and all tables fit
    ///   in the available device memory next to the four `n x n` buffers the call uploads
    /// - otherwise [`Strategy::Streamed`] if `n` is a multiple of the block size
    /// - otherwise [`Strategy::Direct`], which needs no tables
    pub fn choose_strategy(&self, n: usize) -> Strategy {
        let buffers = 4 * n * min_blocks(n) * (BLOCKSIZE / 8);
        let needed = buffers.saturating_add(self.global_table_bytes(n));
        if self.config.validate_dimension(n).is_ok() && needed <= self.device.available_bytes() {
            Strategy::DeviceM4r
        } else if self.config.validate_partitioned(n).is_ok() {
            Strategy::Streamed
        } else {
            Strategy::Direct
        }
    }

    /// Computes `a * b` on the device with the strategy chosen by [`Engine::choose_strategy`]
    #[tracing::instrument(skip_all, fields(n = a.rows()))]
    pub fn auto_multiply(&self, a: &BitMatrix, b: &BitMatrix) -> Result<BitMatrix, M4rError> {
        let n = a.check_operands(b)?;
        let strategy = self.choose_strategy(n);
        tracing::debug!(
            %strategy,
            global_table_bytes = self.global_table_bytes(n),
            available = self.device.available_bytes(),
            "strategy selected"
        );
        self.multiply(strategy, a, b)
    }

    /// For every size `n` in `sizes`, multiplies two random `n x n` matrices with `strategy` and
    /// checks the product against [`naive::multiply`]. Returns whether each size passed.
    ///
    /// Errors from the strategy are returned, not counted as failures.
    pub fn verify_sizes(
        &self,
        rng: &mut impl Rng,
        sizes: &[usize],
        strategy: Strategy,
    ) -> Result<Vec<bool>, M4rError> {
        sizes
            .iter()
            .map(|&n| {
                let a = BitMatrix::random(rng, n, n);
                let b = BitMatrix::random(rng, n, n);
                let expected = naive::multiply(&a, &b)?;
                let passed = self.multiply(strategy, &a, &b)? == expected;
                tracing::debug!(n, %strategy, passed, "verified");
                Ok(passed)
            })
            .collect()
    }
}
