//! Erasure-coding primitives: the per-class codec table cache, the cell
//! buffer type cells are carved out of, and the scratch buffer pool a
//! stripe's working set is drawn from.

mod buffer_pool;
mod cell;
mod codec;

pub use buffer_pool::BufferPool;
pub use cell::Cell;
pub use codec::{encode, encode_update, xor, decode, CodecCache, CodecTables};
