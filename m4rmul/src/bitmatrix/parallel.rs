use crate::{bitmatrix::*, bitvec::*};

use rayon::prelude::*;

/// Row-parallel access to a matrix, used by kernels that give every unit its own output row
pub trait ParallelRowOps {
    /// Mutable parallel iterator over the rows, in order
    fn par_rows_mut(&mut self) -> impl IndexedParallelIterator<Item = &mut BitRange>;
}

impl ParallelRowOps for BitMatrix {
    fn par_rows_mut(&mut self) -> impl IndexedParallelIterator<Item = &mut BitRange> {
        let chunk_size = self.col_blocks().max(1);
        self.data_mut().par_chunks_mut(chunk_size)
    }
}
