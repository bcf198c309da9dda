//! An in-process model of a data-parallel accelerator
//!
//! A [`Device`] owns a worker pool and a memory budget. Buffers living "on the device" hold a
//! [`MemoryReservation`] against that budget which is released when they are dropped, so every
//! early return still frees device memory. Kernels are launched over a grid of units with
//! [`Device::launch`] or [`Device::launch_rows`]; a launch returns once every unit has finished, so
//! reading results after it returns is always synchronized. Independent pipelines run on
//! [`ExecutionStream`]s, see [`Device::run_streams`].

pub mod atomic;
pub mod stream;

pub use atomic::AtomicBitMatrix;
pub use stream::ExecutionStream;

use crate::bitmatrix::{parallel::ParallelRowOps, BitMatrix};
use crate::bitvec::{min_blocks, BitRange, BLOCKSIZE};
use crate::config::Config;
use crate::error::M4rError;
use rayon::prelude::*;
use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Grid shape of a kernel launch: `grid` blocks of `block` units each
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchConfig {
    pub grid: usize,
    pub block: usize,
}

impl LaunchConfig {
    /// The smallest grid covering `units` units with blocks of at most `max_threads_per_block`
    pub fn for_units(units: usize, max_threads_per_block: usize) -> Self {
        let block = units.clamp(1, max_threads_per_block.max(1));
        LaunchConfig {
            grid: units.div_ceil(block),
            block,
        }
    }

    /// Total number of units in the grid
    #[inline]
    pub fn threads(&self) -> usize {
        self.grid * self.block
    }
}

/// Bytes of device memory held by a buffer, returned to the budget on drop
#[derive(Debug)]
pub struct MemoryReservation<'d> {
    device: &'d Device,
    bytes: usize,
}

impl MemoryReservation<'_> {
    #[inline]
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for MemoryReservation<'_> {
    fn drop(&mut self) {
        self.device.allocated.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}

/// A matrix resident on a [`Device`]
///
/// Dereferences to the underlying [`BitMatrix`] so kernels can read and write it directly.
#[derive(Debug)]
pub struct DeviceMatrix<'d> {
    matrix: BitMatrix,
    _memory: MemoryReservation<'d>,
}

impl Deref for DeviceMatrix<'_> {
    type Target = BitMatrix;
    fn deref(&self) -> &Self::Target {
        &self.matrix
    }
}

impl DerefMut for DeviceMatrix<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.matrix
    }
}

/// The accelerator: a worker pool, a memory budget and a per-block thread limit
#[derive(Debug)]
pub struct Device {
    pool: rayon::ThreadPool,
    memory_budget: usize,
    allocated: AtomicUsize,
    max_threads_per_block: usize,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "kernel panicked".to_owned()
    }
}

impl Device {
    /// A device with one worker per core and no memory limit
    pub fn new(config: &Config) -> Result<Self, M4rError> {
        Self::with_threads(config, 0, usize::MAX)
    }

    /// A device with one worker per core and a budget of `memory_budget` bytes
    pub fn with_memory_budget(config: &Config, memory_budget: usize) -> Result<Self, M4rError> {
        Self::with_threads(config, 0, memory_budget)
    }

    /// A device with `threads` workers (0 picks one per core) and a budget of `memory_budget`
    /// bytes
    pub fn with_threads(
        config: &Config,
        threads: usize,
        memory_budget: usize,
    ) -> Result<Self, M4rError> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("m4r-device-{}", i))
            .build()
            .map_err(|e| M4rError::LaunchFailure(e.to_string()))?;
        tracing::debug!(
            threads = pool.current_num_threads(),
            memory_budget,
            "device created"
        );
        Ok(Device {
            pool,
            memory_budget,
            allocated: AtomicUsize::new(0),
            max_threads_per_block: config.max_threads_per_block,
        })
    }

    #[inline]
    pub fn memory_budget(&self) -> usize {
        self.memory_budget
    }

    #[inline]
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    #[inline]
    pub fn available_bytes(&self) -> usize {
        self.memory_budget.saturating_sub(self.allocated_bytes())
    }

    #[inline]
    pub fn max_threads_per_block(&self) -> usize {
        self.max_threads_per_block
    }

    #[inline]
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Launch shape for `units` units under this device's thread limit
    #[inline]
    pub fn launch_config(&self, units: usize) -> LaunchConfig {
        LaunchConfig::for_units(units, self.max_threads_per_block)
    }

    /// Takes `bytes` out of the memory budget until the returned reservation is dropped
    pub fn reserve(&self, bytes: usize) -> Result<MemoryReservation<'_>, M4rError> {
        let mut current = self.allocated.load(Ordering::Acquire);
        loop {
            let available = self.memory_budget.saturating_sub(current);
            if bytes > available {
                return Err(M4rError::ResourceExhaustion {
                    requested: bytes,
                    available: Some(available),
                });
            }
            match self.allocated.compare_exchange_weak(
                current,
                current + bytes,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Ok(MemoryReservation {
                        device: self,
                        bytes,
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Allocates a zero-filled `rows x cols` matrix on the device
    pub fn zeros(&self, rows: usize, cols: usize) -> Result<DeviceMatrix<'_>, M4rError> {
        let memory = self.reserve(rows * min_blocks(cols) * (BLOCKSIZE / 8))?;
        Ok(DeviceMatrix {
            matrix: BitMatrix::try_zeros(rows, cols)?,
            _memory: memory,
        })
    }

    /// Copies a host matrix to the device
    pub fn upload(&self, m: &BitMatrix) -> Result<DeviceMatrix<'_>, M4rError> {
        let mut dev = self.zeros(m.rows(), m.cols())?;
        dev.data_mut().copy_from(m.data());
        Ok(dev)
    }

    /// Copies a device matrix back to the host
    pub fn download(&self, m: &DeviceMatrix<'_>) -> Result<BitMatrix, M4rError> {
        let mut host = BitMatrix::try_zeros(m.rows(), m.cols())?;
        host.data_mut().copy_from(m.data());
        Ok(host)
    }

    /// Allocates a zero-filled matrix with atomic words on the device
    pub fn atomic_zeros(&self, rows: usize, cols: usize) -> Result<AtomicBitMatrix<'_>, M4rError> {
        AtomicBitMatrix::zeros(self, rows, cols)
    }

    fn check_launch(&self, launch: LaunchConfig, units: usize) -> Result<(), M4rError> {
        if launch.block == 0 || launch.block > self.max_threads_per_block {
            return Err(M4rError::LaunchFailure(format!(
                "block of {} units outside 1..={}",
                launch.block, self.max_threads_per_block
            )));
        }
        if launch.threads() < units {
            return Err(M4rError::LaunchFailure(format!(
                "grid of {}x{} units cannot cover {} work units",
                launch.grid, launch.block, units
            )));
        }
        Ok(())
    }

    /// Runs `f` on the worker pool, turning a panic into [`M4rError::LaunchFailure`]
    fn run<T>(&self, f: impl FnOnce() -> T + Send) -> Result<T, M4rError>
    where
        T: Send,
    {
        panic::catch_unwind(AssertUnwindSafe(|| self.pool.install(f)))
            .map_err(|payload| M4rError::LaunchFailure(panic_message(payload)))
    }

    /// Runs `kernel(u)` for every unit `u < units` and waits for all of them. Units of the grid
    /// beyond `units` stay idle.
    pub fn launch(
        &self,
        launch: LaunchConfig,
        units: usize,
        kernel: impl Fn(usize) + Sync + Send,
    ) -> Result<(), M4rError> {
        self.check_launch(launch, units)?;
        tracing::trace!(grid = launch.grid, block = launch.block, units, "launch");
        self.run(|| (0..units).into_par_iter().for_each(kernel))
    }

    /// Runs `kernel(i, row)` for every row `i` of `out`, one unit per row, and waits for all of
    /// them. Each unit has exclusive access to its own row.
    pub fn launch_rows(
        &self,
        launch: LaunchConfig,
        out: &mut BitMatrix,
        kernel: impl Fn(usize, &mut BitRange) + Sync + Send,
    ) -> Result<(), M4rError> {
        let units = out.rows();
        self.check_launch(launch, units)?;
        tracing::trace!(grid = launch.grid, block = launch.block, units, "launch rows");
        self.run(|| {
            out.par_rows_mut()
                .enumerate()
                .for_each(|(i, row)| kernel(i, row))
        })
    }

    /// Runs `count` streams, each holding `stream_bytes` of device memory while it is alive, and
    /// waits for all of them.
    ///
    /// Streams are admitted in waves of as many as fit in the memory available when the call
    /// starts; streams of one wave run concurrently with no ordering between them. Results are
    /// returned in stream order.
    ///
    /// # Errors
    ///
    /// [`M4rError::ResourceExhaustion`] if not even one stream fits, before any stream runs;
    /// otherwise the first error returned by a stream.
    pub fn run_streams<T, F>(
        &self,
        count: usize,
        stream_bytes: usize,
        pipeline: F,
    ) -> Result<Vec<T>, M4rError>
    where
        T: Send,
        F: Fn(&ExecutionStream<'_>) -> Result<T, M4rError> + Sync + Send,
    {
        let available = self.available_bytes();
        let concurrent = if stream_bytes == 0 {
            count
        } else {
            available / stream_bytes
        };
        if concurrent == 0 && count > 0 {
            return Err(M4rError::ResourceExhaustion {
                requested: stream_bytes,
                available: Some(available),
            });
        }
        let concurrent = concurrent.min(count).max(1);
        tracing::debug!(
            streams = count,
            concurrent,
            waves = count.div_ceil(concurrent),
            stream_bytes,
            "running streams"
        );

        let mut results = Vec::with_capacity(count);
        for wave in (0..count).step_by(concurrent) {
            let ids = wave..(wave + concurrent).min(count);
            let wave_results = self.run(|| {
                ids.into_par_iter()
                    .map(|id| {
                        let stream = ExecutionStream::new(self, id, stream_bytes)?;
                        pipeline(&stream)
                    })
                    .collect::<Result<Vec<T>, M4rError>>()
            })??;
            results.extend(wave_results);
        }
        Ok(results)
    }
}
