//! Per-edge sample buffers.
//!
//! Every accepted connection owns exactly one single-producer/single-consumer
//! ring buffer. The output port holds the producer cursor, the input port the
//! consumer cursor; neither side ever blocks the other. Capacities are
//! rounded up to [`GRANULARITY`] so that requested minima from both sides of
//! a connection land on the same allocation size class.

pub use rtrb::{Consumer, Producer};

/// Allocation granule for ring-buffer capacities, in samples.
pub const GRANULARITY: usize = 64;

/// Default minimum capacity for stream connections, in samples.
pub const DEFAULT_MIN_BUFFER_SIZE: usize = 65536;

/// Default capacity for message-port connections. Messages are rare and
/// low-rate; a small ring is plenty.
pub const MESSAGE_BUFFER_SIZE: usize = 1024;

/// Round `min_size` up to the next multiple of [`GRANULARITY`].
pub fn granule_aligned(min_size: usize) -> usize {
    let size = min_size.max(1);
    size.div_ceil(GRANULARITY) * GRANULARITY
}

/// Allocate the ring buffer for one edge.
///
/// The returned pair shares one lock-free ring of at least `min_size`
/// samples; sample order is production order.
pub fn allocate<T: Send + 'static>(min_size: usize) -> (Producer<T>, Consumer<T>) {
    rtrb::RingBuffer::new(granule_aligned(min_size))
}
