use std::collections::HashMap;

use bytes::BytesMut;

/// Reusable, size-classed scratch buffers for the SGLs an aggregation
/// context drives through a stripe: `data` (`k*len*rsize`), `old_data`
/// (`k*len*rsize`), `parity` (`p*len*rsize`) and `diff` (`len*rsize` per
/// updated cell). Grounded in `stripe-update`'s `Stripe::zero`/`Block`
/// allocation pattern (one `BytesMut` split into same-sized pieces) plus
/// the "grow as needed, reuse across stripes" resource note in §5: rather
/// than allocate fresh per stripe, checked-out buffers are recycled by
/// byte size the next time a buffer of that size is requested.
///
/// Owned exclusively by a single [`crate::context::AggregationContext`];
/// never shared across threads (per §5 "Shared resources").
#[derive(Debug, Default)]
pub struct BufferPool {
    free: HashMap<usize, Vec<BytesMut>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a zeroed buffer of exactly `bytes` length, reusing a
    /// previously returned allocation of the same size if one is free.
    pub fn checkout(&mut self, bytes: usize) -> BytesMut {
        if let Some(mut buf) = self.free.get_mut(&bytes).and_then(Vec::pop) {
            buf.iter_mut().for_each(|b| *b = 0);
            buf
        } else {
            BytesMut::zeroed(bytes)
        }
    }

    /// Return a buffer to the pool for reuse by a future `checkout` of the
    /// same size.
    pub fn release(&mut self, buf: BytesMut) {
        self.free.entry(buf.len()).or_default().push(buf);
    }

    /// Check out `n` same-size [`crate::ec::Cell`]s, one buffer per cell.
    pub fn checkout_cells(&mut self, n: usize, cell_bytes: usize) -> Vec<crate::ec::Cell> {
        (0..n).map(|_| crate::ec::Cell::from(self.checkout(cell_bytes))).collect()
    }

    /// Return a set of cells checked out with [`Self::checkout_cells`].
    pub fn release_cells(&mut self, cells: Vec<crate::ec::Cell>) {
        for cell in cells {
            self.release(cell.into_inner());
        }
    }
}
