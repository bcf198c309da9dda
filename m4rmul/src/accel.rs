//! Multiplication strategies running on a [`Device`]
//!
//! Every function here uploads its operands, runs one or more kernel launches and downloads the
//! result. Device buffers hold reservations against the device's memory budget, so a failing
//! call releases everything it allocated.
//!
//! - [`m4r_multiply`] builds every group table up front and then runs one consume launch with
//!   one unit per output row.
//! - [`direct_multiply`] skips the tables and sums rows of `b` directly, one unit per output row.
//! - [`streamed_multiply`] splits the rows of `b` into blocks of `config.block_size` and runs one
//!   [`ExecutionStream`] per block. Streams add their partial products into a shared output with
//!   atomic XOR, so only the tables of the live streams are resident at any time.

use crate::bitmatrix::BitMatrix;
use crate::bitvec::{min_blocks, BitVec, BLOCKSIZE};
use crate::config::Config;
use crate::device::{Device, DeviceMatrix, ExecutionStream};
use crate::error::M4rError;
use crate::precalc::{BlockTables, PrecalcTable};

/// Transposes a device matrix on the device, one unit per output row
pub fn transpose_on<'d>(
    device: &'d Device,
    b: &DeviceMatrix<'_>,
) -> Result<DeviceMatrix<'d>, M4rError> {
    let mut b_tr = device.zeros(b.cols(), b.rows())?;
    device.launch_rows(device.launch_config(b.cols()), &mut b_tr, |j, row| {
        for i in 0..b.rows() {
            if b.row(i).bit(j) {
                row.set_bit(i, true);
            }
        }
    })?;
    Ok(b_tr)
}

/// Returns the transpose of `b`, computed on `device`
#[tracing::instrument(skip_all, fields(rows = b.rows(), cols = b.cols()))]
pub fn transpose(device: &Device, b: &BitMatrix) -> Result<BitMatrix, M4rError> {
    let b_dev = device.upload(b)?;
    let b_tr = transpose_on(device, &b_dev)?;
    device.download(&b_tr)
}

/// Builds the table for rows `first_row .. first_row + k` of `source`, one unit per entry
fn build_table(
    device: &Device,
    source: &BitMatrix,
    first_row: usize,
    k: usize,
) -> Result<PrecalcTable, M4rError> {
    crate::precalc::check_source(source, first_row, k)?;
    let mut table = PrecalcTable::zeroed(k, source.cols())?;
    device.launch_rows(device.launch_config(1 << k), table.entries_mut(), |s, out| {
        PrecalcTable::entry(source, first_row, s, out)
    })?;
    Ok(table)
}

/// Computes `a * b` on `device` with one table per `k` rows of `b`, all built before any of
/// them is consumed.
///
/// The tables take `(n / k) * 2^k * n / 8` bytes of device memory on top of the operands, see
/// [`crate::engine::Engine::global_table_bytes`].
///
/// # Errors
///
/// [`M4rError::DimensionMismatch`] or [`M4rError::InvalidConfig`] as for
/// [`crate::m4r::m4r_multiply`]; [`M4rError::ResourceExhaustion`] if the operands or the tables
/// do not fit in the device budget; [`M4rError::LaunchFailure`] if a kernel fails.
#[tracing::instrument(skip_all, fields(n = a.rows(), k = config.subvector_width))]
pub fn m4r_multiply(
    device: &Device,
    a: &BitMatrix,
    b: &BitMatrix,
    config: &Config,
) -> Result<BitMatrix, M4rError> {
    let n = a.check_operands(b)?;
    config.validate_dimension(n)?;
    let k = config.subvector_width;
    let groups = n / k;

    let a_dev = device.upload(a)?;
    let b_tr = {
        let b_dev = device.upload(b)?;
        transpose_on(device, &b_dev)?
    };

    let table_memory = device.reserve(groups * PrecalcTable::size_bytes(k, n))?;
    let tables = (0..groups)
        .map(|g| {
            let stripe = b_tr.column_strip(g * k, k)?;
            build_table(device, &stripe, 0, k)
        })
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(tables = groups, bytes = table_memory.bytes(), "group tables built");

    let mut c = device.zeros(n, n)?;
    device.launch_rows(device.launch_config(n), &mut c, |i, row| {
        let a_row = a_dev.row(i);
        for (g, table) in tables.iter().enumerate() {
            table.accumulate_chunk(a_row, g * k, row);
        }
    })?;
    device.download(&c)
}

/// Computes `a * b` on `device` without tables: each unit XORs together the rows of `b` selected
/// by the set bits of its row of `a`.
#[tracing::instrument(skip_all, fields(n = a.rows()))]
pub fn direct_multiply(
    device: &Device,
    a: &BitMatrix,
    b: &BitMatrix,
    config: &Config,
) -> Result<BitMatrix, M4rError> {
    let n = a.check_operands(b)?;
    config.validate()?;

    let a_dev = device.upload(a)?;
    let b_dev = device.upload(b)?;
    let mut c = device.zeros(n, n)?;
    device.launch_rows(device.launch_config(n), &mut c, |i, row| {
        for (w, mut word) in a_dev.row(i).block_iter().enumerate() {
            while word != 0 {
                let t = w * BLOCKSIZE + word.trailing_zeros() as usize;
                *row ^= b_dev.row(t);
                word &= word - 1;
            }
        }
    })?;
    device.download(&c)
}

/// Builds the tables of the block of `block_size` rows of `source` starting at `first_row`,
/// one launch per table on `stream`
fn build_block_tables(
    stream: &ExecutionStream<'_>,
    source: &BitMatrix,
    first_row: usize,
    block_size: usize,
    k: usize,
) -> Result<BlockTables, M4rError> {
    BlockTables::check_block(source, first_row, block_size, k)?;
    let device = stream.device();
    let mut tables = Vec::with_capacity(block_size / k);
    for g in 0..block_size / k {
        let rows = first_row + g * k;
        let mut table = PrecalcTable::zeroed(k, source.cols())?;
        stream.launch_rows(device.launch_config(1 << k), table.entries_mut(), |s, out| {
            PrecalcTable::entry(source, rows, s, out)
        })?;
        tables.push(table);
    }
    Ok(BlockTables::from_tables(first_row, tables))
}

/// Bytes of row scratch used by the consume units of [`streamed_multiply`] for an `n x n`
/// problem. Every worker of `device` holds at most one row buffer at a time.
pub fn stream_scratch_bytes(device: &Device, n: usize) -> usize {
    device.num_threads() * min_blocks(n) * (BLOCKSIZE / 8)
}

/// Computes `a * b` on `device` block by block, one [`ExecutionStream`] per block of
/// `config.block_size` rows of `b`.
///
/// Each stream builds the tables of its block and then adds the partial product of `a` with that
/// block to the shared output, one unit per output row. Partial products from different streams
/// overlap on every output word and are combined with atomic XOR, so the result does not depend
/// on how the streams are scheduled. Each consume unit sums its partial row in a local buffer;
/// the buffers are reserved up front, see [`stream_scratch_bytes`]. Streams are admitted in
/// waves of as many as fit in the device memory left after the operands, the output and the
/// row scratch.
///
/// # Errors
///
/// [`M4rError::DimensionMismatch`] unless `n` is also a multiple of `config.block_size`;
/// [`M4rError::ResourceExhaustion`] if not even one stream's tables fit, before any stream runs;
/// otherwise as for [`m4r_multiply`].
#[tracing::instrument(skip_all, fields(n = a.rows(), k = config.subvector_width, block_size = config.block_size))]
pub fn streamed_multiply(
    device: &Device,
    a: &BitMatrix,
    b: &BitMatrix,
    config: &Config,
) -> Result<BitMatrix, M4rError> {
    let n = a.check_operands(b)?;
    config.validate_partitioned(n)?;
    let k = config.subvector_width;
    let block_size = config.block_size;
    let blocks = n / block_size;

    let a_dev = device.upload(a)?;
    let b_dev = device.upload(b)?;
    let c = device.atomic_zeros(n, n)?;
    let _scratch = device.reserve(stream_scratch_bytes(device, n))?;

    let stream_bytes = BlockTables::size_bytes(block_size, k, n);
    device.run_streams(blocks, stream_bytes, |stream| {
        let first_row = stream.id() * block_size;
        let tables = build_block_tables(stream, &b_dev, first_row, block_size, k)?;
        tracing::trace!(stream = stream.id(), first_row, "block tables built");
        stream.launch(device.launch_config(n), n, |i| {
            let mut partial = BitVec::zeros(a_dev.col_blocks());
            tables.accumulate_row(a_dev.row(i), &mut partial);
            c.xor_row(i, &partial);
        })
    })?;
    c.into_matrix()
}
