//! `m4rmul` is a Rust library for multiplying square matrices over the 2-element finite field
//! with the "Method of Four Russians" (M4R). Some features include:
//! - bit-packed vectors and matrices with fast row operations and dot products
//! - fast out-of-place matrix transpose using a [recursive block method](https://github.com/dsnet/matrix-transpose)
//! - precomputed tables of all `2^k` XOR-combinations of `k` rows
//! - a sequential table-driven multiplier, checked against a naive reference multiplier
//! - an in-process accelerator model with a memory budget, kernel launches and execution streams
//! - three accelerated strategies: all tables at once, no tables, and one stream per block of rows
//!
//! The main entry points are:
//! - [`BitMatrix`]: a two-dimensional matrix based on [`BitVec`]
//! - [`m4r::m4r_multiply`] and [`naive::multiply`] for host multiplication
//! - [`Engine`]: a [`Config`] and a [`Device`], running any [`Strategy`] or picking one based on
//!   the available device memory

#![allow(
    clippy::needless_range_loop,
    clippy::suspicious_arithmetic_impl,
    clippy::uninlined_format_args,
    clippy::bool_assert_comparison,
    clippy::cast_possible_truncation,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::bool_to_int_with_if
)]
pub mod accel;
pub mod bitmatrix;
pub mod bitvec;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod m4r;
pub mod naive;
pub mod precalc;

pub use bitmatrix::{parallel::ParallelRowOps, transpose, BitMatrix};
pub use bitvec::{BitBlock, BitRange, BitVec, BLOCKSIZE};
pub use config::Config;
pub use device::{AtomicBitMatrix, Device, DeviceMatrix, ExecutionStream, LaunchConfig};
pub use engine::{Engine, Strategy};
pub use error::M4rError;
pub use precalc::{BlockTables, PrecalcTable};
